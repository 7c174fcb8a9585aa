//! Item operations: create, field edits, status transitions, moves

use super::{required_text, Engine, Tx};
use crate::db::events::EventKind;
use crate::db::id_kind;
use crate::error::{Error, Result};
use crate::rank;
use crate::status::{ensure_can_complete, is_end_state, validate_status};
use crate::types::{Comment, Extra, Item, ItemDate};
use serde_json::json;

/// Fields for a new item. Unset status means the outline's first status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub outline_id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status_id: Option<String>,
    pub priority: bool,
    pub tags: Vec<String>,
    pub due: Option<ItemDate>,
    pub schedule: Option<ItemDate>,
    pub assigned_actor_id: Option<String>,
}

/// Where a moved item lands among its new siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Before(String),
    After(String),
    Start,
    End,
}

/// Trim, drop a leading `#`, skip empties and duplicates; order is kept.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        let tag = tag.strip_prefix('#').unwrap_or(tag).trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// Check a prospective parent: same outline, live, and not inside `moving`.
fn check_parent(tx: &Tx<'_>, outline_id: &str, parent_id: &str, moving: Option<&str>) -> Result<()> {
    let parent = tx.db.require_item(parent_id)?;
    if parent.outline_id != outline_id {
        return Err(Error::invalid("parentId", "parent is in a different outline"));
    }
    if parent.archived {
        return Err(Error::invalid("parentId", "parent is archived"));
    }
    if let Some(moving) = moving {
        if tx.db.is_self_or_descendant(moving, parent_id) {
            return Err(Error::invalid(
                "parentId",
                "cannot move an item under itself or a descendant",
            ));
        }
    }
    Ok(())
}

/// Rank after the last sibling under `(outline_id, parent_id)`.
fn last_rank(tx: &Tx<'_>, outline_id: &str, parent_id: Option<&str>, excluding: Option<&str>) -> String {
    let last = tx
        .db
        .children(outline_id, parent_id)
        .into_iter()
        .filter(|i| Some(i.id.as_str()) != excluding)
        .last()
        .map(|i| i.rank.clone())
        .unwrap_or_default();
    rank::after(&last)
}

fn ensure_live_outline(tx: &Tx<'_>, outline_id: &str) -> Result<()> {
    if tx.db.require_outline(outline_id)?.archived {
        return Err(Error::invalid("outlineId", "outline is archived"));
    }
    Ok(())
}

impl Engine {
    pub fn create_item(&self, new: &NewItem) -> Result<String> {
        let title = required_text("title", &new.title)?;
        let tags = normalize_tags(&new.tags);

        self.transact("item.create", true, |tx| {
            ensure_live_outline(tx, &new.outline_id)?;
            let outline = tx.db.require_outline(&new.outline_id)?;
            let project_id = outline.project_id.clone();
            let status_id = match new.status_id.as_deref() {
                Some(s) => {
                    validate_status(outline, s)?;
                    s.to_string()
                }
                None => outline.first_status_id().unwrap_or_default().to_string(),
            };

            let parent_id = new.parent_id.as_deref().filter(|p| !p.is_empty());
            if let Some(parent_id) = parent_id {
                check_parent(tx, &new.outline_id, parent_id, None)?;
            }
            if let Some(assignee) = new.assigned_actor_id.as_deref() {
                tx.db.require_actor(assignee)?;
            }

            let rank = last_rank(tx, &new.outline_id, parent_id, None);
            let id = tx.db.next_id(id_kind::ITEM);
            let item = Item {
                id: id.clone(),
                project_id: project_id.clone(),
                outline_id: new.outline_id.clone(),
                parent_id: parent_id.map(str::to_string),
                rank: rank.clone(),
                title: title.clone(),
                description: new.description.clone(),
                status_id: status_id.clone(),
                priority: new.priority,
                on_hold: false,
                due: new.due,
                schedule: new.schedule,
                tags: tags.clone(),
                archived: false,
                owner_actor_id: tx.actor.clone(),
                assigned_actor_id: new.assigned_actor_id.clone(),
                created_by: tx.actor.clone(),
                created_at: tx.now,
                updated_at: tx.now,
                extra: Extra::new(),
            };
            tx.db.items.push(item);
            tx.emit(
                EventKind::ItemCreate,
                &id,
                json!({
                    "projectId": project_id,
                    "outlineId": new.outline_id,
                    "parentId": parent_id,
                    "title": title,
                    "statusId": status_id,
                    "rank": rank,
                }),
            );
            Ok(id)
        })
    }

    pub fn set_title(&self, item_id: &str, title: &str) -> Result<()> {
        let title = required_text("title", title)?;
        self.transact("item.set_title", true, |tx| {
            let item = tx.editable_item(item_id)?;
            if item.title == title {
                return Ok(());
            }
            tx.update_item(item_id, |i| i.title = title.clone())?;
            tx.emit(EventKind::ItemSetTitle, item_id, json!({ "title": title }));
            Ok(())
        })
    }

    pub fn set_description(&self, item_id: &str, description: &str) -> Result<()> {
        self.transact("item.set_description", true, |tx| {
            let item = tx.editable_item(item_id)?;
            if item.description == description {
                return Ok(());
            }
            tx.update_item(item_id, |i| i.description = description.to_string())?;
            tx.emit(
                EventKind::ItemSetDescription,
                item_id,
                json!({ "description": description }),
            );
            Ok(())
        })
    }

    /// Move an item to `status_id` (empty clears the status).
    ///
    /// A status with `requires_note` needs a non-empty `note`; entering an end
    /// state requires the completion rule to hold. A note is also recorded as
    /// a comment on the item.
    pub fn set_status(&self, item_id: &str, status_id: &str, note: Option<&str>) -> Result<()> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        self.transact("item.set_status", true, |tx| {
            let item = tx.editable_item(item_id)?;
            let outline = tx.db.require_outline(&item.outline_id)?;
            validate_status(outline, status_id)?;

            let changing = item.status_id != status_id;
            if !changing && note.is_none() {
                return Ok(());
            }
            if let Some(def) = outline.status_def(status_id) {
                if def.requires_note && note.is_none() {
                    return Err(Error::RequiresNote {
                        status: status_id.to_string(),
                    });
                }
            }
            if changing && is_end_state(Some(outline), status_id) {
                ensure_can_complete(&tx.db, &item)?;
            }

            tx.update_item(item_id, |i| i.status_id = status_id.to_string())?;
            tx.emit(
                EventKind::ItemSetStatus,
                item_id,
                json!({ "from": item.status_id, "to": status_id, "note": note }),
            );

            if let Some(note) = note {
                let comment_id = tx.db.next_id(id_kind::COMMENT);
                tx.db.comments.push(Comment {
                    id: comment_id.clone(),
                    item_id: item_id.to_string(),
                    author_id: tx.actor.clone(),
                    body: note.to_string(),
                    reply_to_comment_id: None,
                    created_at: tx.now,
                    extra: Extra::new(),
                });
                tx.emit(
                    EventKind::CommentAdd,
                    &comment_id,
                    json!({ "itemId": item_id, "body": note }),
                );
            }
            Ok(())
        })
    }

    pub fn toggle_priority(&self, item_id: &str) -> Result<bool> {
        self.transact("item.toggle_priority", true, |tx| {
            let value = !tx.editable_item(item_id)?.priority;
            tx.update_item(item_id, |i| i.priority = value)?;
            tx.emit(EventKind::ItemTogglePriority, item_id, json!({ "priority": value }));
            Ok(value)
        })
    }

    pub fn toggle_on_hold(&self, item_id: &str) -> Result<bool> {
        self.transact("item.toggle_on_hold", true, |tx| {
            let value = !tx.editable_item(item_id)?.on_hold;
            tx.update_item(item_id, |i| i.on_hold = value)?;
            tx.emit(EventKind::ItemToggleOnHold, item_id, json!({ "onHold": value }));
            Ok(value)
        })
    }

    pub fn set_due(&self, item_id: &str, due: Option<ItemDate>) -> Result<()> {
        self.transact("item.set_due", true, |tx| {
            if tx.editable_item(item_id)?.due == due {
                return Ok(());
            }
            tx.update_item(item_id, |i| i.due = due)?;
            tx.emit(EventKind::ItemSetDue, item_id, json!({ "due": due }));
            Ok(())
        })
    }

    pub fn set_schedule(&self, item_id: &str, schedule: Option<ItemDate>) -> Result<()> {
        self.transact("item.set_schedule", true, |tx| {
            if tx.editable_item(item_id)?.schedule == schedule {
                return Ok(());
            }
            tx.update_item(item_id, |i| i.schedule = schedule)?;
            tx.emit(
                EventKind::ItemSetSchedule,
                item_id,
                json!({ "schedule": schedule }),
            );
            Ok(())
        })
    }

    pub fn set_tags(&self, item_id: &str, tags: &[String]) -> Result<Vec<String>> {
        let tags = normalize_tags(tags);
        self.transact("item.set_tags", true, |tx| {
            if tx.editable_item(item_id)?.tags == tags {
                return Ok(tags.clone());
            }
            tx.update_item(item_id, |i| i.tags = tags.clone())?;
            tx.emit(EventKind::ItemSetTags, item_id, json!({ "tags": tags }));
            Ok(tags.clone())
        })
    }

    /// Assign an item; `None` (or an empty id) unassigns.
    pub fn set_assignee(&self, item_id: &str, actor_id: Option<&str>) -> Result<()> {
        let actor_id = actor_id.map(str::trim).filter(|a| !a.is_empty());
        self.transact("item.set_assignee", true, |tx| {
            let item = tx.editable_item(item_id)?;
            if let Some(a) = actor_id {
                tx.db.require_actor(a)?;
            }
            if item.assigned_actor_id.as_deref() == actor_id {
                return Ok(());
            }
            tx.update_item(item_id, |i| i.assigned_actor_id = actor_id.map(str::to_string))?;
            tx.emit(
                EventKind::ItemSetAssignee,
                item_id,
                json!({ "assignedActorId": actor_id }),
            );
            Ok(())
        })
    }

    pub fn archive_item(&self, item_id: &str) -> Result<()> {
        self.set_item_archived(item_id, true)
    }

    pub fn unarchive_item(&self, item_id: &str) -> Result<()> {
        self.set_item_archived(item_id, false)
    }

    fn set_item_archived(&self, item_id: &str, archived: bool) -> Result<()> {
        let (name, kind) = if archived {
            ("item.archive", EventKind::ItemArchive)
        } else {
            ("item.unarchive", EventKind::ItemUnarchive)
        };
        self.transact(name, true, |tx| {
            let item = tx.editable_item(item_id)?;
            if item.archived == archived {
                return Ok(());
            }
            // The status may have been removed from the outline while the item
            // was archived; a live item cannot keep it.
            let stale_status = (!archived
                && !item.status_id.is_empty()
                && tx
                    .db
                    .outline(&item.outline_id)
                    .is_some_and(|o| o.status_def(&item.status_id).is_none()))
            .then(|| item.status_id.clone());

            tx.update_item(item_id, |i| {
                i.archived = archived;
                if stale_status.is_some() {
                    i.status_id.clear();
                }
            })?;
            let payload = match &stale_status {
                Some(status) => json!({ "clearedStatusId": status }),
                None => json!({}),
            };
            tx.emit(kind, item_id, payload);
            Ok(())
        })
    }

    /// Copy an item (not its subtree) directly after the original.
    pub fn duplicate_item(&self, item_id: &str) -> Result<String> {
        self.transact("item.duplicate", true, |tx| {
            let source = tx.editable_item(item_id)?;
            ensure_live_outline(tx, &source.outline_id)?;
            let outline = tx.db.require_outline(&source.outline_id)?;
            let status_id = if is_end_state(Some(outline), &source.status_id) {
                outline.first_status_id().unwrap_or_default().to_string()
            } else {
                source.status_id.clone()
            };

            let siblings = tx
                .db
                .children(&source.outline_id, source.parent_id.as_deref());
            let next_rank = siblings
                .iter()
                .skip_while(|s| s.id != source.id)
                .nth(1)
                .map(|s| s.rank.clone())
                .unwrap_or_default();
            let rank = rank::between(&source.rank, &next_rank);

            let id = tx.db.next_id(id_kind::ITEM);
            let copy = Item {
                id: id.clone(),
                rank,
                title: format!("{} (copy)", source.title),
                status_id,
                archived: false,
                owner_actor_id: tx.actor.clone(),
                created_by: tx.actor.clone(),
                created_at: tx.now,
                updated_at: tx.now,
                ..source.clone()
            };
            let payload = json!({ "sourceId": source.id, "title": copy.title, "rank": copy.rank });
            tx.db.items.push(copy);
            tx.emit(EventKind::ItemDuplicate, &id, payload);
            Ok(id)
        })
    }

    /// Re-parent and/or reorder an item inside its outline.
    ///
    /// Only the moved item's rank changes. Moving under itself or one of its
    /// descendants is rejected.
    ///
    /// Legacy siblings may share a rank. `Before(anchor)` when the previous
    /// sibling ranks equal to the anchor yields a rank just past that shared
    /// value, so the item sorts after the anchor; `After` is unaffected.
    pub fn move_within_outline(
        &self,
        item_id: &str,
        parent_id: Option<&str>,
        placement: &Placement,
    ) -> Result<()> {
        let parent_id = parent_id.filter(|p| !p.is_empty());
        self.transact("item.move", true, |tx| {
            let item = tx.editable_item(item_id)?;
            if let Some(parent_id) = parent_id {
                check_parent(tx, &item.outline_id, parent_id, Some(item_id))?;
            }

            let siblings: Vec<&Item> = tx
                .db
                .children(&item.outline_id, parent_id)
                .into_iter()
                .filter(|s| s.id != item_id)
                .collect();
            let position = |field: &'static str, anchor: &str| {
                siblings
                    .iter()
                    .position(|s| s.id == anchor)
                    .ok_or_else(|| Error::invalid(field, format!("{} is not a sibling at the destination", anchor)))
            };
            let rank_at = |idx: usize| siblings.get(idx).map(|s| s.rank.clone()).unwrap_or_default();

            let new_rank = match placement {
                Placement::Before(anchor) => {
                    let idx = position("beforeId", anchor.as_str())?;
                    let prev = if idx == 0 { String::new() } else { rank_at(idx - 1) };
                    rank::between(&prev, &rank_at(idx))
                }
                Placement::After(anchor) => {
                    let idx = position("afterId", anchor.as_str())?;
                    rank::between(&rank_at(idx), &rank_at(idx + 1))
                }
                Placement::Start => match siblings.first() {
                    Some(first) => rank::before(&first.rank),
                    None => rank::between("", ""),
                },
                Placement::End => match siblings.last() {
                    Some(last) => rank::after(&last.rank),
                    None => rank::between("", ""),
                },
            };

            tx.update_item(item_id, |i| {
                i.parent_id = parent_id.map(str::to_string);
                i.rank = new_rank.clone();
            })?;
            tx.emit(
                EventKind::ItemMove,
                item_id,
                json!({
                    "fromParentId": item.parent_id,
                    "parentId": parent_id,
                    "rank": new_rank,
                }),
            );
            Ok(())
        })
    }

    /// Move an item and its whole subtree to another outline.
    ///
    /// The item becomes top-level in the target, ranked last. An explicit
    /// `status_override` applies to the item itself and to any descendant
    /// whose status the target does not define; without it the item must
    /// already hold a valid status and such descendants lose theirs.
    pub fn move_to_outline(
        &self,
        item_id: &str,
        outline_id: &str,
        status_override: Option<&str>,
    ) -> Result<()> {
        let status_override = status_override.filter(|s| !s.is_empty());
        self.transact("item.move_outline", true, |tx| {
            let item = tx.editable_item(item_id)?;
            if item.outline_id == outline_id {
                return Err(Error::invalid("outlineId", "item is already in this outline"));
            }
            ensure_live_outline(tx, outline_id)?;
            let target = tx.db.require_outline(outline_id)?.clone();
            if let Some(s) = status_override {
                validate_status(&target, s)?;
            }

            let root_status = match status_override {
                Some(s) => s.to_string(),
                None if item.status_id.is_empty() || target.status_def(&item.status_id).is_some() => {
                    item.status_id.clone()
                }
                None => {
                    return Err(Error::invalid(
                        "statusId",
                        format!(
                            "{} is not defined in outline {}; supply a status override",
                            item.status_id, outline_id
                        ),
                    ))
                }
            };

            let rank = last_rank(tx, outline_id, None, Some(item_id));
            let descendants = tx.db.descendant_ids(item_id);

            tx.update_item(item_id, |i| {
                i.outline_id = target.id.clone();
                i.project_id = target.project_id.clone();
                i.parent_id = None;
                i.rank = rank.clone();
                i.status_id = root_status.clone();
            })?;
            for id in &descendants {
                tx.update_item(id, |d| {
                    d.outline_id = target.id.clone();
                    d.project_id = target.project_id.clone();
                    if !d.status_id.is_empty() && target.status_def(&d.status_id).is_none() {
                        d.status_id = status_override.unwrap_or_default().to_string();
                    }
                })?;
            }

            tx.emit(
                EventKind::ItemMoveOutline,
                item_id,
                json!({
                    "fromOutlineId": item.outline_id,
                    "outlineId": target.id,
                    "projectId": target.project_id,
                    "statusId": root_status,
                    "rank": rank,
                    "descendants": descendants.len(),
                }),
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::StatusDefEdit;
    use crate::types::ActorKind;

    fn new_item(title: &str, parent: Option<&str>) -> NewItem {
        NewItem {
            outline_id: "out-1".into(),
            parent_id: parent.map(str::to_string),
            title: title.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_defaults_and_ranks() {
        let (_dir, engine) = seeded_engine();
        let a = engine.create_item(&new_item("A", None)).unwrap();
        let b = engine.create_item(&new_item("B", None)).unwrap();
        let child = engine.create_item(&new_item("C", Some(&a))).unwrap();

        let db = engine.load().unwrap();
        let (a, b, child) = (
            db.item(&a).unwrap(),
            db.item(&b).unwrap(),
            db.item(&child).unwrap(),
        );
        assert_eq!(a.status_id, "todo");
        assert_eq!(a.rank, "h");
        assert!(b.rank > a.rank);
        assert_eq!(child.rank, "h");
        assert_eq!(child.project_id, "proj-1");
        assert_eq!(a.owner_actor_id, "act-1");
        assert_eq!(a.created_at, a.updated_at);
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let (_dir, engine) = seeded_engine();
        let mut bad_status = new_item("A", None);
        bad_status.status_id = Some("wip".into());
        assert_eq!(engine.create_item(&bad_status).unwrap_err().kind(), "invalid");

        assert_eq!(
            engine
                .create_item(&new_item("A", Some("item-404")))
                .unwrap_err()
                .kind(),
            "not_found"
        );

        engine.archive_outline("out-1").unwrap();
        assert_eq!(
            engine.create_item(&new_item("A", None)).unwrap_err().kind(),
            "invalid"
        );
    }

    #[test]
    fn test_toggle_twice_restores_fields() {
        let (_dir, engine) = seeded_engine();
        let id = engine.create_item(&new_item("A", None)).unwrap();
        let before = engine.load().unwrap().item(&id).unwrap().clone();

        assert!(engine.toggle_priority(&id).unwrap());
        assert!(!engine.toggle_priority(&id).unwrap());
        assert!(engine.toggle_on_hold(&id).unwrap());
        assert!(!engine.toggle_on_hold(&id).unwrap());

        let after = engine.load().unwrap().item(&id).unwrap().clone();
        assert_eq!(
            Item {
                updated_at: before.updated_at,
                ..after.clone()
            },
            before
        );
        assert!(after.updated_at >= before.updated_at);
    }

    #[test]
    fn test_set_status_requires_note_and_records_comment() {
        let (_dir, engine) = seeded_engine();
        engine
            .edit_status_defs(
                "out-1",
                &StatusDefEdit::ToggleRequiresNote {
                    id: "doing".into(),
                },
            )
            .unwrap();
        let id = engine.create_item(&new_item("A", None)).unwrap();

        let err = engine.set_status(&id, "doing", Some("  ")).unwrap_err();
        assert!(matches!(err, Error::RequiresNote { .. }));

        engine.set_status(&id, "doing", Some("started")).unwrap();
        let db = engine.load().unwrap();
        assert_eq!(db.item(&id).unwrap().status_id, "doing");
        assert_eq!(db.comments_for_item(&id)[0].body, "started");

        let types = event_types(&engine);
        assert_eq!(&types[types.len() - 2..], &["item.set_status", "comment.add"]);

        // Same status without a note does nothing.
        let count = types.len();
        engine.set_status(&id, "doing", None).unwrap();
        assert_eq!(event_types(&engine).len(), count);
    }

    #[test]
    fn test_completion_blocked_by_child_leaves_no_trace() {
        let (_dir, engine) = seeded_engine();
        let p = engine.create_item(&new_item("P", None)).unwrap();
        engine.create_item(&new_item("C", Some(&p))).unwrap();
        let count = event_types(&engine).len();

        match engine.set_status(&p, "done", None).unwrap_err() {
            Error::CompletionBlocked { reason } => assert_eq!(reason, "incomplete children"),
            other => panic!("expected CompletionBlocked, got {:?}", other),
        }
        assert_eq!(engine.load().unwrap().item(&p).unwrap().status_id, "todo");
        assert_eq!(event_types(&engine).len(), count);
    }

    #[test]
    fn test_permission_denied_for_foreign_agent() {
        let (dir, engine) = seeded_engine();
        engine.create_actor(ActorKind::Human, "Bob", None).unwrap();
        engine.create_actor(ActorKind::Agent, "bob-bot", Some("act-2")).unwrap();
        let id = engine.create_item(&new_item("A", None)).unwrap();

        let bot = Engine::open(dir.path()).unwrap().with_actor(Some("act-3".into()));
        // Resolves to Bob, who is neither owner, assignee nor current user.
        let err = bot.set_title(&id, "Mine").unwrap_err();
        assert_eq!(err.kind(), "permission_denied");

        engine.set_assignee(&id, Some("act-2")).unwrap();
        bot.set_title(&id, "Mine").unwrap();
        assert_eq!(engine.load().unwrap().item(&id).unwrap().title, "Mine");
    }

    #[test]
    fn test_set_tags_normalizes() {
        let (_dir, engine) = seeded_engine();
        let id = engine.create_item(&new_item("A", None)).unwrap();
        let tags = engine
            .set_tags(
                &id,
                &[" #home ".into(), "".into(), "home".into(), "#errand".into()],
            )
            .unwrap();
        assert_eq!(tags, vec!["home", "errand"]);
    }

    #[test]
    fn test_dates() {
        let (_dir, engine) = seeded_engine();
        let id = engine.create_item(&new_item("A", None)).unwrap();
        let due = ItemDate::parse("2025-06-01 09:00");
        engine.set_due(&id, due).unwrap();
        engine.set_schedule(&id, ItemDate::parse("2025-05-30")).unwrap();
        let db = engine.load().unwrap();
        let item = db.item(&id).unwrap();
        assert_eq!(item.due, due);
        assert_eq!(item.schedule.unwrap().to_string(), "2025-05-30");

        engine.set_due(&id, None).unwrap();
        assert!(engine.load().unwrap().item(&id).unwrap().due.is_none());
    }

    #[test]
    fn test_duplicate_lands_after_source() {
        let (_dir, engine) = seeded_engine();
        let a = engine.create_item(&new_item("A", None)).unwrap();
        let b = engine.create_item(&new_item("B", None)).unwrap();
        engine.set_status(&a, "done", None).unwrap();

        let copy = engine.duplicate_item(&a).unwrap();
        let db = engine.load().unwrap();
        let order: Vec<&str> = db
            .children("out-1", None)
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(order, vec![a.as_str(), copy.as_str(), b.as_str()]);

        let copy = db.item(&copy).unwrap();
        assert_eq!(copy.title, "A (copy)");
        assert_eq!(copy.status_id, "todo");
    }

    #[test]
    fn test_move_with_colliding_ranks_only_touches_moved_item() {
        let (_dir, engine) = seeded_engine();
        let a = engine.create_item(&new_item("A", None)).unwrap();
        let b = engine.create_item(&new_item("B", None)).unwrap();
        let c = engine.create_item(&new_item("C", None)).unwrap();

        // Force legacy ranks {A:h, B:h, C:t}.
        let store = engine.store();
        let mut db = store.load().unwrap();
        db.item_mut(&a).unwrap().rank = "h".into();
        db.item_mut(&b).unwrap().rank = "h".into();
        db.item_mut(&c).unwrap().rank = "t".into();
        store.save(&db).unwrap();

        engine
            .move_within_outline(&b, None, &Placement::After(a.clone()))
            .unwrap();
        let db = engine.load().unwrap();
        assert_eq!(db.item(&a).unwrap().rank, "h");
        assert_eq!(db.item(&c).unwrap().rank, "t");
        let r = &db.item(&b).unwrap().rank;
        assert!(r.as_str() > "h" && r.as_str() < "t", "{}", r);
    }

    #[test]
    fn test_before_anchor_sharing_rank_with_previous_lands_after_it() {
        let (_dir, engine) = seeded_engine();
        let a = engine.create_item(&new_item("A", None)).unwrap();
        let b = engine.create_item(&new_item("B", None)).unwrap();
        let c = engine.create_item(&new_item("C", None)).unwrap();

        let store = engine.store();
        let mut db = store.load().unwrap();
        db.item_mut(&a).unwrap().rank = "h".into();
        db.item_mut(&b).unwrap().rank = "h".into();
        db.item_mut(&c).unwrap().rank = "t".into();
        store.save(&db).unwrap();

        engine
            .move_within_outline(&c, None, &Placement::Before(b.clone()))
            .unwrap();
        let db = engine.load().unwrap();
        assert_eq!(db.item(&a).unwrap().rank, "h");
        assert_eq!(db.item(&b).unwrap().rank, "h");
        let r = &db.item(&c).unwrap().rank;
        assert!(r.as_str() > "h", "{}", r);
    }

    #[test]
    fn test_move_reparent_and_cycle_guard() {
        let (_dir, engine) = seeded_engine();
        let a = engine.create_item(&new_item("A", None)).unwrap();
        let b = engine.create_item(&new_item("B", Some(&a))).unwrap();
        let c = engine.create_item(&new_item("C", None)).unwrap();

        engine.move_within_outline(&c, Some(&a), &Placement::Start).unwrap();
        let db = engine.load().unwrap();
        let kids: Vec<&str> = db
            .children("out-1", Some(&a))
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(kids, vec![c.as_str(), b.as_str()]);

        let err = engine
            .move_within_outline(&a, Some(&b), &Placement::End)
            .unwrap_err();
        assert!(matches!(err, Error::Invalid { field: "parentId", .. }));

        let err = engine
            .move_within_outline(&b, None, &Placement::Before(c.clone()))
            .unwrap_err();
        assert!(matches!(err, Error::Invalid { field: "beforeId", .. }));
    }

    #[test]
    fn test_move_to_outline_requires_override_for_unknown_status() {
        let (_dir, engine) = seeded_engine();
        let other = engine.create_outline("proj-1", Some("Other")).unwrap();
        engine
            .edit_status_defs(&other, &StatusDefEdit::Remove { id: "doing".into() })
            .unwrap();
        let p = engine.create_item(&new_item("P", None)).unwrap();
        let c = engine.create_item(&new_item("C", Some(&p))).unwrap();
        engine.set_status(&p, "doing", None).unwrap();
        engine.set_status(&c, "doing", None).unwrap();

        let err = engine.move_to_outline(&p, &other, None).unwrap_err();
        assert!(matches!(err, Error::Invalid { field: "statusId", .. }));

        engine.move_to_outline(&p, &other, Some("todo")).unwrap();
        let db = engine.load().unwrap();
        let (p, c) = (db.item(&p).unwrap(), db.item(&c).unwrap());
        assert_eq!(p.outline_id, other);
        assert_eq!(c.outline_id, other);
        assert_eq!(c.parent_id.as_deref(), Some(p.id.as_str()));
        assert_eq!(p.status_id, "todo");
        assert_eq!(c.status_id, "todo");
        assert_eq!(event_types(&engine).last().unwrap(), "item.move_outline");
    }

    #[test]
    fn test_unarchive_clears_status_removed_meanwhile() {
        let (_dir, engine) = seeded_engine();
        let item = engine.create_item(&new_item("Paint fence", None)).unwrap();
        engine.set_status(&item, "doing", None).unwrap();
        engine.archive_item(&item).unwrap();
        engine
            .edit_status_defs("out-1", &StatusDefEdit::Remove { id: "doing".into() })
            .unwrap();

        engine.unarchive_item(&item).unwrap();

        let db = engine.load().unwrap();
        let restored = db.item(&item).unwrap();
        assert!(!restored.archived);
        assert_eq!(restored.status_id, "");
        let last = engine.history(&item, 1).unwrap().pop().unwrap();
        assert_eq!(last.kind, "item.unarchive");
        assert_eq!(last.payload["clearedStatusId"], "doing");
    }

    #[test]
    fn test_unarchive_keeps_defined_status() {
        let (_dir, engine) = seeded_engine();
        let item = engine.create_item(&new_item("Paint fence", None)).unwrap();
        engine.set_status(&item, "doing", None).unwrap();
        engine.archive_item(&item).unwrap();
        engine.unarchive_item(&item).unwrap();

        assert_eq!(engine.load().unwrap().item(&item).unwrap().status_id, "doing");
        let last = engine.history(&item, 1).unwrap().pop().unwrap();
        assert!(last.payload.get("clearedStatusId").is_none());
    }
}
