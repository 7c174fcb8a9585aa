//! Command engine: every mutation of a workspace goes through here
//!
//! Each operation runs as one transaction:
//!
//! 1. load a fresh snapshot and remember its mtime and length
//! 2. resolve the write actor
//! 3. check permission and preconditions, then mutate the in-memory [`Db`]
//! 4. re-check the snapshot mtime and length; on an external change, re-run once
//! 5. copy attachment blobs, append all staged events, save the snapshot
//! 6. notify the [`ChangeNotifier`] (the git auto-committer)
//!
//! Nothing is written when any step before 5 fails, so a failed operation
//! leaves neither events nor snapshot changes behind.

mod activity;
mod actors;
mod items;
mod outlines;
mod projects;

pub use activity::AttachmentDraft;
pub use items::{normalize_tags, NewItem, Placement};
pub use outlines::StatusDefEdit;

use crate::db::events::{EventKind, PendingEvent};
use crate::db::store::{BlobSource, DEFAULT_MAX_ATTACHMENT_BYTES};
use crate::db::{Db, Event, EventLog, Store};
use crate::error::{Error, Result};
use crate::identity::{ensure_can_edit, resolve_write_actor};
use crate::types::Item;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

/// Receives a signal after every successful write.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, actor_id: &str);
}

/// Mutation entry point for one workspace directory.
pub struct Engine {
    store: Store,
    events: EventLog,
    actor_override: Option<String>,
    max_attachment_bytes: u64,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dir", &self.store.dir())
            .field("actor_override", &self.actor_override)
            .field("max_attachment_bytes", &self.max_attachment_bytes)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl Engine {
    /// Open the workspace at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let store = Store::open(dir.as_ref())?;
        let events = EventLog::new(store.events_path());
        Ok(Self {
            store,
            events,
            actor_override: None,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            notifier: None,
        })
    }

    /// Act as `actor` instead of the snapshot's current actor.
    pub fn with_actor(mut self, actor: Option<String>) -> Self {
        self.actor_override = actor.filter(|a| !a.trim().is_empty());
        self
    }

    pub fn with_max_attachment_bytes(mut self, max: u64) -> Self {
        self.max_attachment_bytes = max;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn event_log(&self) -> &EventLog {
        &self.events
    }

    pub fn dir(&self) -> &Path {
        self.store.dir()
    }

    /// Read-only snapshot load.
    pub fn load(&self) -> Result<Db> {
        self.store.load()
    }

    /// The actor writes would be attributed to right now.
    pub fn write_actor(&self) -> Result<String> {
        resolve_write_actor(&self.store.load()?, self.actor_override.as_deref())
    }

    pub fn recent_events(&self, n: usize) -> Result<Vec<Event>> {
        self.events.tail(n)
    }

    pub fn history(&self, entity_id: &str, n: usize) -> Result<Vec<Event>> {
        self.events.for_entity(entity_id, n)
    }

    /// Run `op` as one transaction.
    ///
    /// `op` may run twice when the snapshot changes on disk underneath it, so
    /// it must only touch the [`Tx`] it is given.
    fn transact<T>(
        &self,
        name: &'static str,
        require_identity: bool,
        mut op: impl FnMut(&mut Tx<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut retried = false;
        loop {
            let (db, loaded) = self.store.load_with_stamp()?;
            let actor = match resolve_write_actor(&db, self.actor_override.as_deref()) {
                Ok(actor) => actor,
                Err(Error::NoIdentity) if !require_identity => String::new(),
                Err(e) => return Err(e),
            };

            let mut tx = Tx {
                db,
                actor,
                now: Utc::now(),
                store: &self.store,
                max_attachment_bytes: self.max_attachment_bytes,
                events: Vec::new(),
                blobs: Vec::new(),
            };
            let out = op(&mut tx)?;

            if tx.events.is_empty() {
                tracing::debug!(op = name, "No changes");
                return Ok(out);
            }

            if self.store.snapshot_stamp() != loaded {
                if retried {
                    tracing::warn!(op = name, "Snapshot changed twice during operation");
                    return Err(Error::ConflictOnReload);
                }
                tracing::info!(op = name, "Snapshot changed on disk, re-running operation");
                retried = true;
                continue;
            }

            for (attachment_id, blob) in &tx.blobs {
                self.store.store_blob(attachment_id, blob)?;
            }
            self.events.append_all(&tx.actor, &tx.events)?;
            self.store.save(&tx.db)?;

            tracing::info!(
                op = name,
                actor = %tx.actor,
                events = tx.events.len(),
                "Operation committed"
            );
            if let Some(notifier) = &self.notifier {
                notifier.notify(&tx.actor);
            }
            return Ok(out);
        }
    }
}

/// State of one in-flight operation.
pub(crate) struct Tx<'a> {
    pub db: Db,
    /// Resolved write actor; empty only for bootstrap operations
    pub actor: String,
    pub now: DateTime<Utc>,
    store: &'a Store,
    max_attachment_bytes: u64,
    events: Vec<PendingEvent>,
    blobs: Vec<(String, BlobSource)>,
}

impl Tx<'_> {
    /// Stage an event; it is written only if the whole operation succeeds.
    pub fn emit(&mut self, kind: EventKind, entity_id: &str, payload: serde_json::Value) {
        self.events.push(PendingEvent {
            kind,
            entity_id: entity_id.to_string(),
            payload,
        });
    }

    /// Clone of an item the write actor is allowed to edit.
    pub fn editable_item(&self, id: &str) -> Result<Item> {
        let item = self.db.require_item(id)?;
        ensure_can_edit(&self.db, &self.actor, item)?;
        Ok(item.clone())
    }

    /// Mutate an item in place and bump its `updated_at`.
    pub fn update_item(&mut self, id: &str, f: impl FnOnce(&mut Item)) -> Result<()> {
        let now = self.now;
        let item = self
            .db
            .item_mut(id)
            .ok_or_else(|| Error::not_found("item", id))?;
        f(item);
        item.updated_at = now;
        Ok(())
    }

    /// Validate an attachment source and queue its copy for commit time.
    pub fn stage_blob(&mut self, attachment_id: &str, source: &Path) -> Result<BlobSource> {
        let blob = self
            .store
            .check_blob_source(source, self.max_attachment_bytes)?;
        self.blobs.push((attachment_id.to_string(), blob.clone()));
        Ok(blob)
    }

    pub fn check_blob(&self, source: &Path) -> Result<BlobSource> {
        self.store.check_blob_source(source, self.max_attachment_bytes)
    }
}

/// Trimmed, non-empty text or `Invalid{field}`.
pub(crate) fn required_text(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::invalid(field, "must not be empty"))
    } else {
        Ok(trimmed.to_string())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::store::FileStamp;
    use crate::types::ActorKind;
    use tempfile::TempDir;

    #[test]
    fn test_ops_without_identity_fail() {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path()).unwrap();
        assert!(matches!(
            engine.create_project("Home"),
            Err(Error::NoIdentity)
        ));
        assert!(engine.recent_events(10).unwrap().is_empty());
        assert!(!engine.store().snapshot_path().exists());
    }

    #[test]
    fn test_failed_op_writes_nothing() {
        let (_dir, engine) = seeded_engine();
        let before = std::fs::read(engine.store().snapshot_path()).unwrap();
        let events_before = engine.recent_events(usize::MAX).unwrap().len();

        let err = engine
            .create_item(&NewItem {
                outline_id: "out-1".into(),
                title: "   ".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), "invalid");

        assert_eq!(std::fs::read(engine.store().snapshot_path()).unwrap(), before);
        assert_eq!(engine.recent_events(usize::MAX).unwrap().len(), events_before);
    }

    #[test]
    fn test_actor_override_is_recorded_on_events() {
        let (dir, engine) = seeded_engine();
        engine
            .create_actor(ActorKind::Agent, "helper", Some("act-1"))
            .unwrap();
        engine.create_actor(ActorKind::Agent, "stray", None).unwrap();

        let as_linked = Engine::open(dir.path())
            .unwrap()
            .with_actor(Some("act-2".into()));
        let as_stray = Engine::open(dir.path())
            .unwrap()
            .with_actor(Some("act-3".into()));
        as_linked.create_project("Linked").unwrap();
        as_stray.create_project("Stray").unwrap();

        let events = engine.recent_events(2).unwrap();
        assert_eq!(events[0].actor_id, "act-1");
        assert_eq!(events[1].actor_id, "act-3");
        assert_eq!(as_stray.write_actor().unwrap(), "act-3");
    }

    struct Counter(std::sync::atomic::AtomicUsize);

    impl ChangeNotifier for Counter {
        fn notify(&self, _actor_id: &str) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notifier_fires_only_on_commit() {
        let (dir, _) = seeded_engine();
        let counter = Arc::new(Counter(Default::default()));
        let engine = Engine::open(dir.path())
            .unwrap()
            .with_notifier(counter.clone());

        engine.create_project("Work").unwrap();
        assert!(engine.create_project("").is_err());
        engine.use_project("proj-2").unwrap();
        // Selecting the already-current project changes nothing.
        engine.use_project("proj-2").unwrap();

        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_rewrite_within_one_mtime_tick_reruns_op() {
        let (_dir, engine) = seeded_engine();
        let path = engine.store().snapshot_path();
        let mut runs = 0;

        engine
            .transact("test.touch", true, |tx| {
                runs += 1;
                if runs == 1 {
                    // Another writer lands a longer snapshot with the same mtime.
                    let stamp = FileStamp::of(&path);
                    let mut bytes = std::fs::read(&path)?;
                    bytes.extend_from_slice(b"\n");
                    std::fs::write(&path, &bytes)?;
                    let file = std::fs::File::options().write(true).open(&path)?;
                    if let Some(mtime) = stamp.mtime {
                        file.set_modified(mtime)?;
                    }
                }
                tx.emit(EventKind::ProjectRename, "proj-1", serde_json::json!({}));
                Ok(())
            })
            .unwrap();

        assert_eq!(runs, 2);
    }

    #[test]
    fn test_seeded_engine_events() {
        let (_dir, engine) = seeded_engine();
        assert_eq!(
            event_types(&engine),
            vec!["actor.create", "project.create", "outline.create"]
        );
    }
}
