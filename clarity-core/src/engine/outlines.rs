//! Outline operations and status definition editing

use super::{required_text, Engine, Tx};
use crate::db::events::EventKind;
use crate::db::id_kind;
use crate::error::{Error, Result};
use crate::status::{default_status_defs, status_id_from_label};
use crate::types::{Extra, Outline, StatusDef};
use serde_json::json;
use std::collections::HashSet;

/// One change to an outline's status definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusDefEdit {
    Add {
        label: String,
        is_end_state: bool,
        requires_note: bool,
    },
    /// The id stays; only the label changes
    Rename { id: String, label: String },
    /// New display order; must list every existing id exactly once
    Reorder(Vec<String>),
    Remove { id: String },
    ToggleEndState { id: String },
    ToggleRequiresNote { id: String },
}

fn outline_mut<'t>(tx: &'t mut Tx<'_>, outline_id: &str) -> Result<&'t mut Outline> {
    tx.db
        .outline_mut(outline_id)
        .ok_or_else(|| Error::not_found("outline", outline_id))
}

fn def_index(outline: &Outline, status_id: &str) -> Result<usize> {
    outline
        .status_defs
        .iter()
        .position(|d| d.id == status_id)
        .ok_or_else(|| Error::not_found("status", status_id))
}

impl Engine {
    /// Create an outline with the default status set.
    pub fn create_outline(&self, project_id: &str, name: Option<&str>) -> Result<String> {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        self.transact("outline.create", true, |tx| {
            if tx.db.require_project(project_id)?.archived {
                return Err(Error::invalid("projectId", "project is archived"));
            }
            let id = tx.db.next_id(id_kind::OUTLINE);
            tx.db.outlines.push(Outline {
                id: id.clone(),
                project_id: project_id.to_string(),
                name: name.clone(),
                description: String::new(),
                status_defs: default_status_defs(),
                created_by: tx.actor.clone(),
                created_at: tx.now,
                archived: false,
                extra: Extra::new(),
            });
            tx.emit(
                EventKind::OutlineCreate,
                &id,
                json!({ "projectId": project_id, "name": name }),
            );
            Ok(id)
        })
    }

    /// Rename an outline; an empty name clears it.
    pub fn rename_outline(&self, outline_id: &str, name: Option<&str>) -> Result<()> {
        let name = name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        self.transact("outline.rename", true, |tx| {
            let outline = outline_mut(tx, outline_id)?;
            if outline.name == name {
                return Ok(());
            }
            outline.name = name.clone();
            tx.emit(EventKind::OutlineRename, outline_id, json!({ "name": name }));
            Ok(())
        })
    }

    pub fn set_outline_description(&self, outline_id: &str, description: &str) -> Result<()> {
        self.transact("outline.set_description", true, |tx| {
            let outline = outline_mut(tx, outline_id)?;
            if outline.description == description {
                return Ok(());
            }
            outline.description = description.to_string();
            tx.emit(
                EventKind::OutlineSetDescription,
                outline_id,
                json!({ "description": description }),
            );
            Ok(())
        })
    }

    pub fn archive_outline(&self, outline_id: &str) -> Result<()> {
        self.set_outline_archived(outline_id, true)
    }

    pub fn unarchive_outline(&self, outline_id: &str) -> Result<()> {
        self.set_outline_archived(outline_id, false)
    }

    fn set_outline_archived(&self, outline_id: &str, archived: bool) -> Result<()> {
        let (name, kind) = if archived {
            ("outline.archive", EventKind::OutlineArchive)
        } else {
            ("outline.unarchive", EventKind::OutlineUnarchive)
        };
        self.transact(name, true, |tx| {
            let outline = outline_mut(tx, outline_id)?;
            if outline.archived == archived {
                return Ok(());
            }
            outline.archived = archived;
            tx.emit(kind, outline_id, json!({}));
            Ok(())
        })
    }

    /// Apply one status definition edit; returns the affected status id
    /// (empty for a reorder).
    pub fn edit_status_defs(&self, outline_id: &str, edit: &StatusDefEdit) -> Result<String> {
        self.transact("outline.status_defs", true, |tx| {
            let in_use = |status_id: &str| {
                tx.db
                    .items
                    .iter()
                    .filter(|i| i.outline_id == outline_id && !i.archived && i.status_id == status_id)
                    .count()
            };

            match edit {
                StatusDefEdit::Remove { id } => {
                    def_index(tx.db.require_outline(outline_id)?, id)?;
                    let count = in_use(id);
                    if count > 0 {
                        return Err(Error::StatusInUse {
                            status: id.clone(),
                            count,
                        });
                    }
                }
                StatusDefEdit::Add { label, .. } | StatusDefEdit::Rename { label, .. } => {
                    required_text("label", label)?;
                }
                _ => {}
            }

            let outline = outline_mut(tx, outline_id)?;
            let (kind, status_id, payload) = match edit {
                StatusDefEdit::Add {
                    label,
                    is_end_state,
                    requires_note,
                } => {
                    let label = label.trim().to_string();
                    let id = status_id_from_label(&label, &outline.status_defs);
                    outline.status_defs.push(StatusDef {
                        id: id.clone(),
                        label: label.clone(),
                        is_end_state: *is_end_state,
                        requires_note: *requires_note,
                        extra: Extra::new(),
                    });
                    let payload = json!({
                        "statusId": id,
                        "label": label,
                        "isEndState": is_end_state,
                        "requiresNote": requires_note,
                    });
                    (EventKind::StatusDefAdd, id, payload)
                }
                StatusDefEdit::Rename { id, label } => {
                    let idx = def_index(outline, id)?;
                    let label = label.trim().to_string();
                    outline.status_defs[idx].label = label.clone();
                    (
                        EventKind::StatusDefRename,
                        id.clone(),
                        json!({ "statusId": id, "label": label }),
                    )
                }
                StatusDefEdit::Reorder(order) => {
                    let current: HashSet<&str> =
                        outline.status_defs.iter().map(|d| d.id.as_str()).collect();
                    let requested: HashSet<&str> = order.iter().map(String::as_str).collect();
                    if order.len() != outline.status_defs.len() || current != requested {
                        return Err(Error::invalid(
                            "statusDefs",
                            "reorder must list every status id exactly once",
                        ));
                    }
                    let mut defs = std::mem::take(&mut outline.status_defs);
                    defs.sort_by_key(|d| order.iter().position(|o| *o == d.id));
                    outline.status_defs = defs;
                    (
                        EventKind::StatusDefReorder,
                        String::new(),
                        json!({ "order": order }),
                    )
                }
                StatusDefEdit::Remove { id } => {
                    let idx = def_index(outline, id)?;
                    outline.status_defs.remove(idx);
                    (
                        EventKind::StatusDefRemove,
                        id.clone(),
                        json!({ "statusId": id }),
                    )
                }
                StatusDefEdit::ToggleEndState { id } => {
                    let idx = def_index(outline, id)?;
                    let def = &mut outline.status_defs[idx];
                    def.is_end_state = !def.is_end_state;
                    let payload = json!({ "statusId": id, "isEndState": def.is_end_state });
                    (EventKind::StatusDefToggleEndState, id.clone(), payload)
                }
                StatusDefEdit::ToggleRequiresNote { id } => {
                    let idx = def_index(outline, id)?;
                    let def = &mut outline.status_defs[idx];
                    def.requires_note = !def.requires_note;
                    let payload = json!({ "statusId": id, "requiresNote": def.requires_note });
                    (EventKind::StatusDefToggleRequiresNote, id.clone(), payload)
                }
            };
            tx.emit(kind, outline_id, payload);
            Ok(status_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::*;
    use crate::engine::NewItem;

    fn add(label: &str) -> StatusDefEdit {
        StatusDefEdit::Add {
            label: label.into(),
            is_end_state: false,
            requires_note: false,
        }
    }

    fn ids(engine: &Engine) -> Vec<String> {
        engine
            .load()
            .unwrap()
            .outline("out-1")
            .unwrap()
            .status_defs
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    #[test]
    fn test_create_outline_defaults() {
        let (_dir, engine) = seeded_engine();
        let db = engine.load().unwrap();
        let outline = db.outline("out-1").unwrap();
        assert_eq!(outline.name.as_deref(), Some("Chores"));
        assert_eq!(outline.first_status_id(), Some("todo"));
        assert!(outline.status_def("done").unwrap().is_end_state);

        assert_eq!(
            engine.create_outline("proj-9", None).unwrap_err().kind(),
            "not_found"
        );
        engine.archive_project("proj-1").unwrap();
        assert_eq!(
            engine.create_outline("proj-1", None).unwrap_err().kind(),
            "invalid"
        );
    }

    #[test]
    fn test_rename_and_describe() {
        let (_dir, engine) = seeded_engine();
        engine.rename_outline("out-1", Some("  ")).unwrap();
        engine.set_outline_description("out-1", "Weekly").unwrap();
        let db = engine.load().unwrap();
        let outline = db.outline("out-1").unwrap();
        assert_eq!(outline.name, None);
        assert_eq!(outline.display_name(), "out-1");
        assert_eq!(outline.description, "Weekly");
    }

    #[test]
    fn test_add_rename_toggle_reorder() {
        let (_dir, engine) = seeded_engine();
        let id = engine.edit_status_defs("out-1", &add("In Review")).unwrap();
        assert_eq!(id, "in-review");

        engine
            .edit_status_defs(
                "out-1",
                &StatusDefEdit::Rename {
                    id: id.clone(),
                    label: "Reviewing".into(),
                },
            )
            .unwrap();
        engine
            .edit_status_defs("out-1", &StatusDefEdit::ToggleRequiresNote { id: id.clone() })
            .unwrap();
        engine
            .edit_status_defs("out-1", &StatusDefEdit::ToggleEndState { id: "done".into() })
            .unwrap();

        let db = engine.load().unwrap();
        let outline = db.outline("out-1").unwrap();
        let def = outline.status_def("in-review").unwrap();
        assert_eq!(def.label, "Reviewing");
        assert!(def.requires_note);
        assert!(!outline.status_def("done").unwrap().is_end_state);

        let order: Vec<String> = ["done", "in-review", "doing", "todo"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        engine
            .edit_status_defs("out-1", &StatusDefEdit::Reorder(order.clone()))
            .unwrap();
        assert_eq!(ids(&engine), order);

        let err = engine
            .edit_status_defs("out-1", &StatusDefEdit::Reorder(vec!["todo".into()]))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid");
    }

    #[test]
    fn test_remove_in_use_status_is_rejected() {
        let (_dir, engine) = seeded_engine();
        let item = engine
            .create_item(&NewItem {
                outline_id: "out-1".into(),
                title: "Sweep".into(),
                status_id: Some("doing".into()),
                ..Default::default()
            })
            .unwrap();

        let err = engine
            .edit_status_defs("out-1", &StatusDefEdit::Remove { id: "doing".into() })
            .unwrap_err();
        match err {
            Error::StatusInUse { status, count } => {
                assert_eq!(status, "doing");
                assert_eq!(count, 1);
            }
            other => panic!("expected StatusInUse, got {:?}", other),
        }

        // Archived items do not pin a status.
        engine.archive_item(&item).unwrap();
        engine
            .edit_status_defs("out-1", &StatusDefEdit::Remove { id: "doing".into() })
            .unwrap();
        assert_eq!(ids(&engine), vec!["todo", "done"]);

        let err = engine
            .edit_status_defs("out-1", &StatusDefEdit::Remove { id: "doing".into() })
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
