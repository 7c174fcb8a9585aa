//! Actor registration and selection

use super::{required_text, Engine};
use crate::db::events::EventKind;
use crate::db::id_kind;
use crate::error::{Error, Result};
use crate::types::{Actor, ActorKind, Extra};
use serde_json::json;

impl Engine {
    /// Register a human or agent. Agents may be linked to an existing human.
    ///
    /// The first actor created in a workspace becomes its current actor.
    pub fn create_actor(&self, kind: ActorKind, name: &str, user_id: Option<&str>) -> Result<String> {
        let name = required_text("name", name)?;
        let user_id = user_id.map(str::trim).filter(|u| !u.is_empty());

        self.transact("actor.create", false, |tx| {
            if let Some(uid) = user_id {
                if kind == ActorKind::Human {
                    return Err(Error::invalid("userId", "only agents can be linked to a human"));
                }
                let human = tx.db.require_actor(uid)?;
                if human.kind != ActorKind::Human {
                    return Err(Error::invalid("userId", format!("{} is not a human", uid)));
                }
            }

            let id = tx.db.next_id(id_kind::ACTOR);
            tx.db.actors.push(Actor {
                id: id.clone(),
                kind,
                name: name.clone(),
                user_id: user_id.map(str::to_string),
                extra: Extra::new(),
            });
            if tx.db.current_actor_id.is_none() {
                tx.db.current_actor_id = Some(id.clone());
            }
            if tx.actor.is_empty() {
                // Bootstrap: the first actor records its own creation.
                tx.actor = id.clone();
            }
            tx.emit(
                EventKind::ActorCreate,
                &id,
                json!({ "kind": kind.as_str(), "name": name, "userId": user_id }),
            );
            Ok(id)
        })
    }

    /// Make `actor_id` the workspace's current actor.
    pub fn use_actor(&self, actor_id: &str) -> Result<()> {
        self.transact("actor.use", false, |tx| {
            tx.db.require_actor(actor_id)?;
            if tx.db.current_actor_id.as_deref() == Some(actor_id) {
                return Ok(());
            }
            let previous = tx.db.current_actor_id.replace(actor_id.to_string());
            if tx.actor.is_empty() {
                tx.actor = actor_id.to_string();
            }
            tx.emit(
                EventKind::ActorUse,
                actor_id,
                json!({ "previousActorId": previous }),
            );
            Ok(())
        })
    }
}
