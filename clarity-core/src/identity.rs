//! Actor resolution and edit permissions
//!
//! Users run the CLI and the interactive session interchangeably, sometimes
//! under an agent identity. Writes are attributed to the human an agent acts
//! for; only an unlinked agent writes under its own id.

use crate::db::Db;
use crate::error::{Error, Result};
use crate::types::{Actor, ActorKind, Item};
use std::collections::BTreeSet;

/// Resolve the actor recorded on events and entities.
///
/// An override wins over the snapshot's current actor. Either way, an agent
/// linked to a known human resolves to that human.
pub fn resolve_write_actor(db: &Db, override_id: Option<&str>) -> Result<String> {
    let candidate = override_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(db.current_actor_id.as_deref().filter(|s| !s.is_empty()))
        .ok_or(Error::NoIdentity)?;

    if let Some(actor) = db.actor(candidate) {
        if actor.kind == ActorKind::Agent {
            if let Some(human) = actor.user_id.as_deref().and_then(|h| db.actor(h)) {
                return Ok(human.id.clone());
            }
        }
    }
    Ok(candidate.to_string())
}

/// The human behind an actor: agents map to their `user_id`, humans to
/// themselves, unknown ids to `None`.
pub fn human_for(db: &Db, actor_id: &str) -> Option<String> {
    let actor = db.actor(actor_id)?;
    match actor.kind {
        ActorKind::Human => Some(actor.id.clone()),
        ActorKind::Agent => actor.user_id.clone(),
    }
}

/// Whether `actor_id` may edit `item`.
///
/// Editors are the owner, the assignee, the current human user, and any agent
/// linked to that human.
pub fn can_edit(db: &Db, actor_id: &str, item: &Item) -> bool {
    if item.owner_actor_id == actor_id || item.assigned_actor_id.as_deref() == Some(actor_id) {
        return true;
    }
    let current_human = db
        .current_actor_id
        .as_deref()
        .and_then(|id| human_for(db, id));
    match current_human {
        Some(human) => {
            actor_id == human || human_for(db, actor_id).as_deref() == Some(human.as_str())
        }
        None => false,
    }
}

/// Fail with `PermissionDenied` unless [`can_edit`] holds.
pub fn ensure_can_edit(db: &Db, actor_id: &str, item: &Item) -> Result<()> {
    if can_edit(db, actor_id, item) {
        Ok(())
    } else {
        Err(Error::PermissionDenied {
            actor: actor_id.to_string(),
            target: item.id.clone(),
        })
    }
}

/// One entry in an assignee picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssigneeOption {
    /// Actor written to `assigned_actor_id` when picked
    pub actor_id: String,
    pub label: String,
}

/// Collapsed assignee choices: one per human, one "agent (of <human>)" per
/// human with linked agents, plus the current assignee if it would otherwise
/// be folded away.
pub fn assignee_options(actors: &[Actor], current_assignee: Option<&str>) -> Vec<AssigneeOption> {
    let mut humans: Vec<&Actor> = actors
        .iter()
        .filter(|a| a.kind == ActorKind::Human)
        .collect();
    humans.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for human in humans {
        if seen.insert(human.id.clone()) {
            out.push(AssigneeOption {
                actor_id: human.id.clone(),
                label: human.name.clone(),
            });
        }
        let mut agents: Vec<&Actor> = actors
            .iter()
            .filter(|a| a.kind == ActorKind::Agent && a.user_id.as_deref() == Some(human.id.as_str()))
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(first) = agents.first() {
            if seen.insert(first.id.clone()) {
                out.push(AssigneeOption {
                    actor_id: first.id.clone(),
                    label: format!("agent (of {})", human.name),
                });
            }
        }
    }

    if let Some(current) = current_assignee.filter(|c| !c.is_empty()) {
        if !seen.contains(current) {
            let label = actors
                .iter()
                .find(|a| a.id == current)
                .map(|a| a.name.clone())
                .unwrap_or_else(|| current.to_string());
            out.push(AssigneeOption {
                actor_id: current.to_string(),
                label,
            });
        }
    }
    out
}
