//! Comments, worklog entries, attachments and dependencies

use super::{required_text, Engine, Tx};
use crate::db::events::EventKind;
use crate::db::id_kind;
use crate::db::Store;
use crate::error::{Error, Result};
use crate::identity::ensure_can_edit;
use crate::types::{Attachment, AttachmentOwner, Comment, DepType, Dependency, Extra, WorklogEntry};
use serde_json::json;
use std::path::{Path, PathBuf};

/// A file to attach together with a new comment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttachmentDraft {
    pub path: PathBuf,
    pub title: String,
    pub alt: String,
}

fn push_comment(tx: &mut Tx<'_>, item_id: &str, body: &str, reply_to: Option<&str>) -> Result<String> {
    if tx.db.require_item(item_id)?.archived {
        return Err(Error::invalid("itemId", "item is archived"));
    }
    if let Some(parent) = reply_to {
        let parent = tx
            .db
            .comment(parent)
            .ok_or_else(|| Error::not_found("comment", parent))?;
        if parent.item_id != item_id {
            return Err(Error::invalid(
                "replyToCommentId",
                "reply must be on the same item",
            ));
        }
    }

    let id = tx.db.next_id(id_kind::COMMENT);
    tx.db.comments.push(Comment {
        id: id.clone(),
        item_id: item_id.to_string(),
        author_id: tx.actor.clone(),
        body: body.to_string(),
        reply_to_comment_id: reply_to.map(str::to_string),
        created_at: tx.now,
        extra: Extra::new(),
    });
    tx.emit(
        EventKind::CommentAdd,
        &id,
        json!({ "itemId": item_id, "body": body, "replyToCommentId": reply_to }),
    );
    Ok(id)
}

fn push_attachment(
    tx: &mut Tx<'_>,
    kind: AttachmentOwner,
    entity_id: &str,
    source: &Path,
    title: &str,
    alt: &str,
) -> Result<String> {
    let id = tx.db.next_id(id_kind::ATTACHMENT);
    let blob = tx.stage_blob(&id, source)?;
    let attachment = Attachment {
        id: id.clone(),
        entity_kind: kind,
        entity_id: entity_id.to_string(),
        path: Store::blob_rel_path(&id, &blob.original_name),
        original_name: blob.original_name.clone(),
        title: title.trim().to_string(),
        alt: alt.trim().to_string(),
        size_bytes: blob.size_bytes,
        created_by: tx.actor.clone(),
        created_at: tx.now,
        extra: Extra::new(),
    };
    let payload = json!({
        "entityKind": kind.as_str(),
        "entityId": entity_id,
        "path": attachment.path,
        "originalName": attachment.original_name,
        "sizeBytes": attachment.size_bytes,
        "title": attachment.title,
    });
    tx.db.attachments.push(attachment);
    tx.emit(EventKind::AttachmentAdd, &id, payload);
    Ok(id)
}

impl Engine {
    /// Comment on an item, optionally replying to another comment on it.
    pub fn add_comment(&self, item_id: &str, body: &str, reply_to: Option<&str>) -> Result<String> {
        let body = required_text("body", body)?;
        let reply_to = reply_to.filter(|r| !r.is_empty());
        self.transact("comment.add", true, |tx| push_comment(tx, item_id, &body, reply_to))
    }

    /// Comment with files attached in order. Every file is validated before
    /// anything is written.
    pub fn add_comment_with_attachments(
        &self,
        item_id: &str,
        body: &str,
        drafts: &[AttachmentDraft],
    ) -> Result<(String, Vec<String>)> {
        let body = required_text("body", body)?;
        self.transact("comment.add", true, |tx| {
            for draft in drafts {
                tx.check_blob(&draft.path)?;
            }
            let comment_id = push_comment(tx, item_id, &body, None)?;
            let mut attachment_ids = Vec::with_capacity(drafts.len());
            for draft in drafts {
                attachment_ids.push(push_attachment(
                    tx,
                    AttachmentOwner::Comment,
                    &comment_id,
                    &draft.path,
                    &draft.title,
                    &draft.alt,
                )?);
            }
            Ok((comment_id, attachment_ids))
        })
    }

    pub fn add_worklog(&self, item_id: &str, body: &str) -> Result<String> {
        let body = required_text("body", body)?;
        self.transact("worklog.add", true, |tx| {
            if tx.db.require_item(item_id)?.archived {
                return Err(Error::invalid("itemId", "item is archived"));
            }
            let id = tx.db.next_id(id_kind::WORKLOG);
            tx.db.worklog.push(WorklogEntry {
                id: id.clone(),
                item_id: item_id.to_string(),
                author_id: tx.actor.clone(),
                body: body.clone(),
                created_at: tx.now,
                extra: Extra::new(),
            });
            tx.emit(
                EventKind::WorklogAdd,
                &id,
                json!({ "itemId": item_id, "body": body }),
            );
            Ok(id)
        })
    }

    /// Copy `source` into the blob store and attach it to a live item or
    /// comment.
    pub fn add_attachment(
        &self,
        kind: AttachmentOwner,
        entity_id: &str,
        source: &Path,
        title: &str,
        alt: &str,
    ) -> Result<String> {
        self.transact("attachment.add", true, |tx| {
            match kind {
                AttachmentOwner::Item => {
                    let item = tx.editable_item(entity_id)?;
                    if item.archived {
                        return Err(Error::invalid("entityId", "item is archived"));
                    }
                }
                AttachmentOwner::Comment => {
                    let comment = tx
                        .db
                        .comment(entity_id)
                        .ok_or_else(|| Error::not_found("comment", entity_id))?;
                    if tx.db.item(&comment.item_id).map_or(true, |i| i.archived) {
                        return Err(Error::invalid("entityId", "comment's item is missing or archived"));
                    }
                }
            }
            push_attachment(tx, kind, entity_id, source, title, alt)
        })
    }

    /// Change an attachment's title and/or alt text; `None` keeps a field.
    pub fn update_attachment(&self, attachment_id: &str, title: Option<&str>, alt: Option<&str>) -> Result<()> {
        let title = title.map(|t| t.trim().to_string());
        let alt = alt.map(|a| a.trim().to_string());
        self.transact("attachment.update", true, |tx| {
            let attachment = tx
                .db
                .attachment_mut(attachment_id)
                .ok_or_else(|| Error::not_found("attachment", attachment_id))?;
            let mut changed = false;
            if let Some(title) = &title {
                changed |= attachment.title != *title;
                attachment.title = title.clone();
            }
            if let Some(alt) = &alt {
                changed |= attachment.alt != *alt;
                attachment.alt = alt.clone();
            }
            if !changed {
                return Ok(());
            }
            let payload = json!({ "title": attachment.title, "alt": attachment.alt });
            tx.emit(EventKind::AttachmentUpdate, attachment_id, payload);
            Ok(())
        })
    }

    /// Link two items. Adding an existing link is a no-op.
    pub fn add_dep(&self, from: &str, to: &str, dep_type: DepType) -> Result<()> {
        self.transact("dep.add", true, |tx| {
            let item = tx.db.require_item(from)?;
            ensure_can_edit(&tx.db, &tx.actor, item)?;
            tx.db.require_item(to)?;
            if from == to {
                return Err(Error::invalid("toItemId", "an item cannot depend on itself"));
            }
            let exists = tx
                .db
                .deps
                .iter()
                .any(|d| d.from_item_id == from && d.to_item_id == to && d.dep_type == dep_type);
            if exists {
                return Ok(());
            }
            tx.db.deps.push(Dependency {
                from_item_id: from.to_string(),
                to_item_id: to.to_string(),
                dep_type,
                extra: Extra::new(),
            });
            tx.emit(
                EventKind::DepAdd,
                from,
                json!({ "toItemId": to, "type": dep_type.as_str() }),
            );
            Ok(())
        })
    }

    pub fn remove_dep(&self, from: &str, to: &str, dep_type: DepType) -> Result<()> {
        self.transact("dep.remove", true, |tx| {
            // The source may already be gone; only check permission when it exists.
            if let Some(item) = tx.db.item(from) {
                ensure_can_edit(&tx.db, &tx.actor, item)?;
            }
            let before = tx.db.deps.len();
            tx.db
                .deps
                .retain(|d| !(d.from_item_id == from && d.to_item_id == to && d.dep_type == dep_type));
            if tx.db.deps.len() == before {
                return Err(Error::not_found(
                    "dependency",
                    format!("{} -{}-> {}", from, dep_type.as_str(), to),
                ));
            }
            tx.emit(
                EventKind::DepRemove,
                from,
                json!({ "toItemId": to, "type": dep_type.as_str() }),
            );
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::NewItem;
    use std::fs;

    fn item(engine: &Engine, title: &str) -> String {
        engine
            .create_item(&NewItem {
                outline_id: "out-1".into(),
                title: title.into(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_comment_reply_must_stay_on_item() {
        let (_dir, engine) = seeded_engine();
        let a = item(&engine, "A");
        let b = item(&engine, "B");
        let root = engine.add_comment(&a, "first", None).unwrap();
        let reply = engine.add_comment(&a, "second", Some(&root)).unwrap();

        let db = engine.load().unwrap();
        assert_eq!(
            db.comment(&reply).unwrap().reply_to_comment_id.as_deref(),
            Some(root.as_str())
        );
        assert_eq!(
            engine.add_comment(&b, "x", Some(&root)).unwrap_err().kind(),
            "invalid"
        );
        assert_eq!(engine.add_comment(&a, " ", None).unwrap_err().kind(), "invalid");
    }

    #[test]
    fn test_worklog() {
        let (_dir, engine) = seeded_engine();
        let a = item(&engine, "A");
        let id = engine.add_worklog(&a, "45m on the gutters").unwrap();
        assert_eq!(id, "wl-1");
        let last = engine.recent_events(1).unwrap().remove(0);
        assert_eq!(last.kind, "worklog.add");
        assert_eq!(last.payload["itemId"], a.as_str());
    }

    #[test]
    fn test_attachment_is_copied_and_updatable() {
        let (dir, engine) = seeded_engine();
        let a = item(&engine, "A");
        let src = dir.path().join("receipt.txt");
        fs::write(&src, b"paid").unwrap();

        let id = engine
            .add_attachment(AttachmentOwner::Item, &a, &src, "Receipt", "")
            .unwrap();
        let db = engine.load().unwrap();
        let att = db.attachment(&id).unwrap();
        assert_eq!(att.path, format!("{}/receipt.txt", id));
        assert_eq!(att.size_bytes, 4);
        assert_eq!(fs::read(engine.store().blob_path(att)).unwrap(), b"paid");

        engine
            .update_attachment(&id, None, Some("scan of a receipt"))
            .unwrap();
        let db = engine.load().unwrap();
        let att = db.attachment(&id).unwrap();
        assert_eq!(att.title, "Receipt");
        assert_eq!(att.alt, "scan of a receipt");
        assert_eq!(event_types(&engine).last().unwrap(), "attachment.update");
    }

    #[test]
    fn test_oversize_attachment_copies_nothing() {
        let (dir, engine) = seeded_engine();
        let engine = engine.with_max_attachment_bytes(3);
        let a = item(&engine, "A");
        let src = dir.path().join("big.bin");
        fs::write(&src, b"0123456789").unwrap();

        let err = engine
            .add_attachment(AttachmentOwner::Item, &a, &src, "", "")
            .unwrap_err();
        assert_eq!(err.kind(), "attachment_too_large");
        assert!(!engine.store().blobs_dir().exists());
        assert!(engine.load().unwrap().attachments.is_empty());
    }

    #[test]
    fn test_comment_with_attachments_is_all_or_nothing() {
        let (dir, engine) = seeded_engine();
        let a = item(&engine, "A");
        let good = dir.path().join("one.txt");
        fs::write(&good, b"1").unwrap();
        let drafts = vec![
            AttachmentDraft {
                path: good.clone(),
                title: "one".into(),
                alt: String::new(),
            },
            AttachmentDraft {
                path: dir.path().join("missing.txt"),
                ..Default::default()
            },
        ];

        let err = engine
            .add_comment_with_attachments(&a, "see files", &drafts)
            .unwrap_err();
        assert_eq!(err.kind(), "attachment_io");
        assert!(engine.load().unwrap().comments.is_empty());

        let (comment, atts) = engine
            .add_comment_with_attachments(&a, "see files", &drafts[..1])
            .unwrap();
        let db = engine.load().unwrap();
        assert_eq!(atts.len(), 1);
        let att = db.attachment(&atts[0]).unwrap();
        assert_eq!(att.entity_kind, AttachmentOwner::Comment);
        assert_eq!(att.entity_id, comment);
    }

    #[test]
    fn test_dependencies() {
        let (_dir, engine) = seeded_engine();
        let a = item(&engine, "A");
        let b = item(&engine, "B");

        engine.add_dep(&a, &b, DepType::Blocks).unwrap();
        engine.add_dep(&a, &b, DepType::Blocks).unwrap();
        assert_eq!(engine.load().unwrap().deps.len(), 1);

        match engine.set_status(&a, "done", None).unwrap_err() {
            Error::CompletionBlocked { reason } => {
                assert_eq!(reason, "blocked by incomplete dependencies")
            }
            other => panic!("expected CompletionBlocked, got {:?}", other),
        }

        engine.set_status(&b, "done", None).unwrap();
        engine.set_status(&a, "done", None).unwrap();

        engine.remove_dep(&a, &b, DepType::Blocks).unwrap();
        assert_eq!(
            engine.remove_dep(&a, &b, DepType::Blocks).unwrap_err().kind(),
            "not_found"
        );
        assert_eq!(
            engine.add_dep(&a, &a, DepType::Related).unwrap_err().kind(),
            "invalid"
        );
    }
}
