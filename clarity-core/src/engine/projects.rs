//! Project operations

use super::{required_text, Engine};
use crate::db::events::EventKind;
use crate::db::id_kind;
use crate::error::{Error, Result};
use crate::types::{Extra, Project};
use serde_json::json;

impl Engine {
    /// Create a project. The first project becomes the current one.
    pub fn create_project(&self, name: &str) -> Result<String> {
        let name = required_text("name", name)?;
        self.transact("project.create", true, |tx| {
            let id = tx.db.next_id(id_kind::PROJECT);
            tx.db.projects.push(Project {
                id: id.clone(),
                name: name.clone(),
                created_by: tx.actor.clone(),
                created_at: tx.now,
                archived: false,
                extra: Extra::new(),
            });
            if tx.db.current_project_id.is_none() {
                tx.db.current_project_id = Some(id.clone());
            }
            tx.emit(EventKind::ProjectCreate, &id, json!({ "name": name }));
            Ok(id)
        })
    }

    pub fn rename_project(&self, project_id: &str, name: &str) -> Result<()> {
        let name = required_text("name", name)?;
        self.transact("project.rename", true, |tx| {
            let project = tx
                .db
                .project_mut(project_id)
                .ok_or_else(|| Error::not_found("project", project_id))?;
            if project.name == name {
                return Ok(());
            }
            let from = std::mem::replace(&mut project.name, name.clone());
            tx.emit(
                EventKind::ProjectRename,
                project_id,
                json!({ "from": from, "name": name }),
            );
            Ok(())
        })
    }

    pub fn archive_project(&self, project_id: &str) -> Result<()> {
        self.set_project_archived(project_id, true)
    }

    pub fn unarchive_project(&self, project_id: &str) -> Result<()> {
        self.set_project_archived(project_id, false)
    }

    fn set_project_archived(&self, project_id: &str, archived: bool) -> Result<()> {
        let (name, kind) = if archived {
            ("project.archive", EventKind::ProjectArchive)
        } else {
            ("project.unarchive", EventKind::ProjectUnarchive)
        };
        self.transact(name, true, |tx| {
            let project = tx
                .db
                .project_mut(project_id)
                .ok_or_else(|| Error::not_found("project", project_id))?;
            if project.archived == archived {
                return Ok(());
            }
            project.archived = archived;
            tx.emit(kind, project_id, json!({}));
            Ok(())
        })
    }

    /// Remember `project_id` as the workspace's current project.
    pub fn use_project(&self, project_id: &str) -> Result<()> {
        self.transact("project.use", true, |tx| {
            tx.db.require_project(project_id)?;
            if tx.db.current_project_id.as_deref() == Some(project_id) {
                return Ok(());
            }
            tx.db.current_project_id = Some(project_id.to_string());
            tx.emit(EventKind::ProjectUse, project_id, json!({}));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::test_support::*;

    #[test]
    fn test_create_and_rename() {
        let (_dir, engine) = seeded_engine();
        let id = engine.create_project("Work").unwrap();
        assert_eq!(id, "proj-2");

        engine.rename_project(&id, "Day job").unwrap();
        let db = engine.load().unwrap();
        assert_eq!(db.project(&id).unwrap().name, "Day job");
        assert_eq!(db.current_project_id.as_deref(), Some("proj-1"));

        let last = engine.recent_events(1).unwrap().remove(0);
        assert_eq!(last.kind, "project.rename");
        assert_eq!(last.payload["from"], "Work");

        assert_eq!(
            engine.rename_project("proj-9", "x").unwrap_err().kind(),
            "not_found"
        );
    }

    #[test]
    fn test_archive_is_flag_only_and_idempotent() {
        let (_dir, engine) = seeded_engine();
        engine.archive_project("proj-1").unwrap();
        engine.archive_project("proj-1").unwrap();

        let db = engine.load().unwrap();
        assert!(db.project("proj-1").unwrap().archived);
        // Outlines keep their own flag.
        assert!(!db.outline("out-1").unwrap().archived);

        engine.unarchive_project("proj-1").unwrap();
        let types = event_types(&engine);
        assert_eq!(
            &types[types.len() - 2..],
            &["project.archive", "project.unarchive"]
        );
    }
}
