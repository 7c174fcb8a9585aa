//! Workspace data layer
//!
//! This module provides the in-memory snapshot and its persistence:
//! - [`Db`]: the snapshot (`db.json`) with lookups by id, parent and item
//! - [`store::Store`]: atomic snapshot IO, id allocation, blobs, saved view
//! - [`events::EventLog`]: the append-only `events.jsonl` history

pub mod events;
pub mod store;

pub use events::{Event, EventKind, EventLog};
pub use store::Store;

use crate::error::{Error, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Id namespaces allocated through [`Db::next_id`].
pub mod id_kind {
    pub const ACTOR: &str = "act";
    pub const PROJECT: &str = "proj";
    pub const OUTLINE: &str = "out";
    pub const ITEM: &str = "item";
    pub const COMMENT: &str = "cmt";
    pub const WORKLOG: &str = "wl";
    pub const ATTACHMENT: &str = "att";
}

/// The whole dataset of one workspace.
///
/// Mutated only by the command engine; everything else reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Db {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_project_id: Option<String>,
    #[serde(default)]
    pub next_ids: BTreeMap<String, u64>,
    #[serde(default)]
    pub actors: Vec<Actor>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub outlines: Vec<Outline>,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(default)]
    pub deps: Vec<Dependency>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub worklog: Vec<WorklogEntry>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(flatten)]
    pub extra: Extra,
}

fn default_version() -> u32 {
    SNAPSHOT_VERSION
}

impl Default for Db {
    fn default() -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            current_actor_id: None,
            current_project_id: None,
            next_ids: BTreeMap::new(),
            actors: Vec::new(),
            projects: Vec::new(),
            outlines: Vec::new(),
            items: Vec::new(),
            deps: Vec::new(),
            comments: Vec::new(),
            worklog: Vec::new(),
            attachments: Vec::new(),
            extra: Extra::new(),
        }
    }
}

/// Sibling order: rank, then creation time, then id.
pub fn sibling_order(a: &Item, b: &Item) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

impl Db {
    /// Allocate the next id of `kind`, e.g. `item-12`.
    pub fn next_id(&mut self, kind: &str) -> String {
        let mut n = self.next_ids.get(kind).copied().unwrap_or(0);
        // Counters can lag behind ids written by older builds; skip taken ids.
        loop {
            n += 1;
            let candidate = format!("{}-{}", kind, n);
            if !self.id_taken(kind, &candidate) {
                self.next_ids.insert(kind.to_string(), n);
                return candidate;
            }
        }
    }

    fn id_taken(&self, kind: &str, id: &str) -> bool {
        match kind {
            id_kind::ACTOR => self.actor(id).is_some(),
            id_kind::PROJECT => self.project(id).is_some(),
            id_kind::OUTLINE => self.outline(id).is_some(),
            id_kind::ITEM => self.item(id).is_some(),
            id_kind::COMMENT => self.comment(id).is_some(),
            id_kind::WORKLOG => self.worklog_entry(id).is_some(),
            id_kind::ATTACHMENT => self.attachment(id).is_some(),
            _ => false,
        }
    }

    // ============================================
    // Lookups by id
    // ============================================

    pub fn actor(&self, id: &str) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn project_mut(&mut self, id: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.id == id)
    }

    pub fn outline(&self, id: &str) -> Option<&Outline> {
        self.outlines.iter().find(|o| o.id == id)
    }

    pub fn outline_mut(&mut self, id: &str) -> Option<&mut Outline> {
        self.outlines.iter_mut().find(|o| o.id == id)
    }

    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut Item> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.comments.iter().find(|c| c.id == id)
    }

    pub fn worklog_entry(&self, id: &str) -> Option<&WorklogEntry> {
        self.worklog.iter().find(|w| w.id == id)
    }

    pub fn attachment(&self, id: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id == id)
    }

    pub fn attachment_mut(&mut self, id: &str) -> Option<&mut Attachment> {
        self.attachments.iter_mut().find(|a| a.id == id)
    }

    // Required lookups that fail with NotFound

    pub fn require_project(&self, id: &str) -> Result<&Project> {
        self.project(id).ok_or_else(|| Error::not_found("project", id))
    }

    pub fn require_outline(&self, id: &str) -> Result<&Outline> {
        self.outline(id).ok_or_else(|| Error::not_found("outline", id))
    }

    pub fn require_item(&self, id: &str) -> Result<&Item> {
        self.item(id).ok_or_else(|| Error::not_found("item", id))
    }

    pub fn require_actor(&self, id: &str) -> Result<&Actor> {
        self.actor(id).ok_or_else(|| Error::not_found("actor", id))
    }

    // ============================================
    // Lookups by parent
    // ============================================

    pub fn outlines_in_project(&self, project_id: &str) -> Vec<&Outline> {
        self.outlines
            .iter()
            .filter(|o| o.project_id == project_id)
            .collect()
    }

    pub fn items_in_outline(&self, outline_id: &str) -> Vec<&Item> {
        self.items
            .iter()
            .filter(|i| i.outline_id == outline_id)
            .collect()
    }

    /// Direct children of `parent_id` (or top-level items when `None`),
    /// in sibling order. Includes archived items.
    pub fn children(&self, outline_id: &str, parent_id: Option<&str>) -> Vec<&Item> {
        let mut out: Vec<&Item> = self
            .items
            .iter()
            .filter(|i| i.outline_id == outline_id && i.parent_id.as_deref() == parent_id)
            .collect();
        out.sort_by(|a, b| sibling_order(a, b));
        out
    }

    /// Ids of every item below `item_id`, depth-first. Cycle-safe.
    pub fn descendant_ids(&self, item_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        seen.insert(item_id);
        let mut stack = vec![item_id];
        while let Some(current) = stack.pop() {
            for child in self
                .items
                .iter()
                .filter(|i| i.parent_id.as_deref() == Some(current))
            {
                if seen.insert(child.id.as_str()) {
                    out.push(child.id.clone());
                    stack.push(child.id.as_str());
                }
            }
        }
        out
    }

    /// True when `candidate` is `item_id` itself or one of its descendants.
    pub fn is_self_or_descendant(&self, item_id: &str, candidate: &str) -> bool {
        candidate == item_id || self.descendant_ids(item_id).iter().any(|d| d == candidate)
    }

    // ============================================
    // Lookups by item
    // ============================================

    pub fn comments_for_item(&self, item_id: &str) -> Vec<&Comment> {
        let mut out: Vec<&Comment> = self
            .comments
            .iter()
            .filter(|c| c.item_id == item_id)
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn worklog_for_item(&self, item_id: &str) -> Vec<&WorklogEntry> {
        let mut out: Vec<&WorklogEntry> = self
            .worklog
            .iter()
            .filter(|w| w.item_id == item_id)
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn attachments_for(&self, kind: AttachmentOwner, entity_id: &str) -> Vec<&Attachment> {
        self.attachments
            .iter()
            .filter(|a| a.entity_kind == kind && a.entity_id == entity_id)
            .collect()
    }

    /// Outgoing dependencies of an item.
    pub fn deps_from(&self, item_id: &str) -> Vec<&Dependency> {
        self.deps
            .iter()
            .filter(|d| d.from_item_id == item_id)
            .collect()
    }

    /// True when the item or any of its containers (ancestor items, outline,
    /// project) is archived.
    pub fn is_hidden_by_archive(&self, item: &Item) -> bool {
        if item.archived {
            return true;
        }
        if self.outline(&item.outline_id).is_some_and(|o| o.archived)
            || self.project(&item.project_id).is_some_and(|p| p.archived)
        {
            return true;
        }
        let mut seen: HashSet<&str> = HashSet::new();
        let mut parent = item.parent_id.as_deref();
        while let Some(pid) = parent {
            if !seen.insert(pid) {
                break;
            }
            match self.item(pid) {
                Some(p) if p.archived => return true,
                Some(p) => parent = p.parent_id.as_deref(),
                None => break,
            }
        }
        false
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for in-memory snapshots used across unit tests.

    use super::*;
    use chrono::{TimeZone, Utc};

    pub fn ts(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn default_statuses() -> Vec<StatusDef> {
        vec![
            StatusDef::new("todo", "TODO", false),
            StatusDef::new("doing", "Doing", false),
            StatusDef::new("done", "Done", true),
        ]
    }

    /// One human, one project, one outline with todo/doing/done.
    pub fn seeded_db() -> Db {
        let mut db = Db {
            current_actor_id: Some("act-1".into()),
            ..Default::default()
        };
        db.actors.push(Actor {
            id: "act-1".into(),
            kind: ActorKind::Human,
            name: "Ada".into(),
            ..Default::default()
        });
        db.projects.push(Project {
            id: "proj-1".into(),
            name: "Home".into(),
            created_by: "act-1".into(),
            created_at: ts(0),
            ..Default::default()
        });
        db.outlines.push(Outline {
            id: "out-1".into(),
            project_id: "proj-1".into(),
            name: Some("Chores".into()),
            status_defs: default_statuses(),
            created_by: "act-1".into(),
            created_at: ts(0),
            ..Default::default()
        });
        db
    }

    pub fn item(id: &str, parent: Option<&str>, rank: &str, status: &str) -> Item {
        Item {
            id: id.into(),
            project_id: "proj-1".into(),
            outline_id: "out-1".into(),
            parent_id: parent.map(str::to_string),
            rank: rank.into(),
            title: id.to_uppercase(),
            status_id: status.into(),
            owner_actor_id: "act-1".into(),
            created_by: "act-1".into(),
            created_at: ts(0),
            updated_at: ts(0),
            ..Default::default()
        }
    }
}
