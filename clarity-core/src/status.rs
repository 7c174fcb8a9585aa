//! Status definitions and the completion rule
//!
//! Each outline carries its own ordered list of [`StatusDef`]s. Moving an item
//! into an end state is gated by [`ensure_can_complete`]: open children and
//! unfinished `blocks` dependencies both prevent completion.

use crate::db::Db;
use crate::error::{Error, Result};
use crate::types::{DepType, Item, Outline, StatusDef};

/// Completion is blocked by a direct child that is still open
pub const REASON_CHILDREN: &str = "incomplete children";

/// Completion is blocked by a `blocks` dependency that is not finished
pub const REASON_DEPS: &str = "blocked by incomplete dependencies";

/// Status id treated as an end state when an outline has no definition for it
const LEGACY_DONE: &str = "done";

/// Status set given to new outlines.
pub fn default_status_defs() -> Vec<StatusDef> {
    vec![
        StatusDef::new("todo", "TODO", false),
        StatusDef::new("doing", "Doing", false),
        StatusDef::new("done", "Done", true),
    ]
}

/// Whether `status_id` is terminal in `outline`.
///
/// Unknown outlines and missing definitions fall back to the legacy rule
/// `status_id == "done"`. The empty status is never terminal.
pub fn is_end_state(outline: Option<&Outline>, status_id: &str) -> bool {
    if status_id.is_empty() {
        return false;
    }
    match outline.and_then(|o| o.status_def(status_id)) {
        Some(def) => def.is_end_state,
        None => status_id == LEGACY_DONE,
    }
}

/// Whether `item` currently sits in an end state of its own outline.
pub fn item_is_done(db: &Db, item: &Item) -> bool {
    is_end_state(db.outline(&item.outline_id), &item.status_id)
}

/// Derive a status id from a label: lowercase, whitespace runs become `-`.
///
/// Collisions with `existing` get a numeric suffix starting at `-2`.
pub fn status_id_from_label(label: &str, existing: &[StatusDef]) -> String {
    let base = label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-");
    let base = if base.is_empty() {
        "status".to_string()
    } else {
        base
    };

    let taken = |id: &str| existing.iter().any(|d| d.id == id);
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Reject a non-empty status id that the outline does not define.
pub fn validate_status(outline: &Outline, status_id: &str) -> Result<()> {
    if status_id.is_empty() || outline.status_def(status_id).is_some() {
        Ok(())
    } else {
        Err(Error::invalid(
            "statusId",
            format!("{} is not defined in outline {}", status_id, outline.id),
        ))
    }
}

/// Reasons `item` cannot enter an end state, in a fixed order.
pub fn completion_blockers(db: &Db, item: &Item) -> Vec<&'static str> {
    let mut reasons = Vec::new();

    // Children without a status never block.
    let open_child = db
        .children(&item.outline_id, Some(&item.id))
        .into_iter()
        .any(|c| !c.archived && !c.status_id.is_empty() && !item_is_done(db, c));
    if open_child {
        reasons.push(REASON_CHILDREN);
    }

    let open_dep = db
        .deps_from(&item.id)
        .into_iter()
        .filter(|d| d.dep_type == DepType::Blocks)
        .any(|d| match db.item(&d.to_item_id) {
            None => true,
            Some(target) => !target.archived && !item_is_done(db, target),
        });
    if open_dep {
        reasons.push(REASON_DEPS);
    }
    reasons
}

pub fn can_complete_item(db: &Db, item: &Item) -> bool {
    completion_blockers(db, item).is_empty()
}

/// Fail with `CompletionBlocked` unless [`can_complete_item`] holds.
pub fn ensure_can_complete(db: &Db, item: &Item) -> Result<()> {
    let reasons = completion_blockers(db, item);
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(Error::CompletionBlocked {
            reason: reasons.join("; "),
        })
    }
}
