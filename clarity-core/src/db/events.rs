//! Append-only event log (`events.jsonl`)
//!
//! One JSON object per line. The log is the source of truth for history; the
//! snapshot is a cache of current state and is never rebuilt from it.
//!
//! Other processes may append concurrently. Readers treat the file as a stream
//! of whole lines: a trailing line without a newline is an append in flight
//! and is skipped, as are lines that fail to parse.

use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

/// A single history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub ts: DateTime<Utc>,
    pub actor_id: String,
    /// `domain.verb`, see [`EventKind`]
    #[serde(rename = "type")]
    pub kind: String,
    pub entity_id: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The catalog of event types this engine writes.
///
/// Readers must accept unknown types, so [`Event::kind`] stays a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ActorCreate,
    ActorUse,
    ProjectCreate,
    ProjectRename,
    ProjectArchive,
    ProjectUnarchive,
    ProjectUse,
    OutlineCreate,
    OutlineRename,
    OutlineSetDescription,
    OutlineArchive,
    OutlineUnarchive,
    StatusDefAdd,
    StatusDefRename,
    StatusDefReorder,
    StatusDefRemove,
    StatusDefToggleEndState,
    StatusDefToggleRequiresNote,
    ItemCreate,
    ItemSetTitle,
    ItemSetDescription,
    ItemSetStatus,
    ItemTogglePriority,
    ItemToggleOnHold,
    ItemSetDue,
    ItemSetSchedule,
    ItemSetTags,
    ItemSetAssignee,
    ItemArchive,
    ItemUnarchive,
    ItemDuplicate,
    ItemMove,
    ItemMoveOutline,
    CommentAdd,
    WorklogAdd,
    AttachmentAdd,
    AttachmentUpdate,
    DepAdd,
    DepRemove,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        EventKind::ActorCreate,
        EventKind::ActorUse,
        EventKind::ProjectCreate,
        EventKind::ProjectRename,
        EventKind::ProjectArchive,
        EventKind::ProjectUnarchive,
        EventKind::ProjectUse,
        EventKind::OutlineCreate,
        EventKind::OutlineRename,
        EventKind::OutlineSetDescription,
        EventKind::OutlineArchive,
        EventKind::OutlineUnarchive,
        EventKind::StatusDefAdd,
        EventKind::StatusDefRename,
        EventKind::StatusDefReorder,
        EventKind::StatusDefRemove,
        EventKind::StatusDefToggleEndState,
        EventKind::StatusDefToggleRequiresNote,
        EventKind::ItemCreate,
        EventKind::ItemSetTitle,
        EventKind::ItemSetDescription,
        EventKind::ItemSetStatus,
        EventKind::ItemTogglePriority,
        EventKind::ItemToggleOnHold,
        EventKind::ItemSetDue,
        EventKind::ItemSetSchedule,
        EventKind::ItemSetTags,
        EventKind::ItemSetAssignee,
        EventKind::ItemArchive,
        EventKind::ItemUnarchive,
        EventKind::ItemDuplicate,
        EventKind::ItemMove,
        EventKind::ItemMoveOutline,
        EventKind::CommentAdd,
        EventKind::WorklogAdd,
        EventKind::AttachmentAdd,
        EventKind::AttachmentUpdate,
        EventKind::DepAdd,
        EventKind::DepRemove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ActorCreate => "actor.create",
            EventKind::ActorUse => "actor.use",
            EventKind::ProjectCreate => "project.create",
            EventKind::ProjectRename => "project.rename",
            EventKind::ProjectArchive => "project.archive",
            EventKind::ProjectUnarchive => "project.unarchive",
            EventKind::ProjectUse => "project.use",
            EventKind::OutlineCreate => "outline.create",
            EventKind::OutlineRename => "outline.rename",
            EventKind::OutlineSetDescription => "outline.set_description",
            EventKind::OutlineArchive => "outline.archive",
            EventKind::OutlineUnarchive => "outline.unarchive",
            EventKind::StatusDefAdd => "outline.status_defs.add",
            EventKind::StatusDefRename => "outline.status_defs.rename",
            EventKind::StatusDefReorder => "outline.status_defs.reorder",
            EventKind::StatusDefRemove => "outline.status_defs.remove",
            EventKind::StatusDefToggleEndState => "outline.status_defs.toggle_end_state",
            EventKind::StatusDefToggleRequiresNote => "outline.status_defs.toggle_requires_note",
            EventKind::ItemCreate => "item.create",
            EventKind::ItemSetTitle => "item.set_title",
            EventKind::ItemSetDescription => "item.set_description",
            EventKind::ItemSetStatus => "item.set_status",
            EventKind::ItemTogglePriority => "item.toggle_priority",
            EventKind::ItemToggleOnHold => "item.toggle_on_hold",
            EventKind::ItemSetDue => "item.set_due",
            EventKind::ItemSetSchedule => "item.set_schedule",
            EventKind::ItemSetTags => "item.set_tags",
            EventKind::ItemSetAssignee => "item.set_assignee",
            EventKind::ItemArchive => "item.archive",
            EventKind::ItemUnarchive => "item.unarchive",
            EventKind::ItemDuplicate => "item.duplicate",
            EventKind::ItemMove => "item.move",
            EventKind::ItemMoveOutline => "item.move_outline",
            EventKind::CommentAdd => "comment.add",
            EventKind::WorklogAdd => "worklog.add",
            EventKind::AttachmentAdd => "attachment.add",
            EventKind::AttachmentUpdate => "attachment.update",
            EventKind::DepAdd => "dep.add",
            EventKind::DepRemove => "dep.remove",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event type: {}", s))
    }
}

/// An event staged by an operation, stamped on append.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    pub kind: EventKind,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

/// Last timestamp handed out in this process, in microseconds.
static LAST_TS_MICROS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Current UTC time, strictly increasing within the process.
pub fn monotonic_now() -> DateTime<Utc> {
    let now = Utc::now().timestamp_micros();
    let mut prev = LAST_TS_MICROS.load(Ordering::SeqCst);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match LAST_TS_MICROS.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => {
                return Utc
                    .timestamp_micros(next)
                    .single()
                    .unwrap_or_else(Utc::now)
            }
            Err(actual) => prev = actual,
        }
    }
}

/// Handle on a workspace's `events.jsonl`.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    pub fn append(
        &self,
        actor_id: &str,
        kind: EventKind,
        entity_id: &str,
        payload: serde_json::Value,
    ) -> Result<Event> {
        let pending = PendingEvent {
            kind,
            entity_id: entity_id.to_string(),
            payload,
        };
        let mut written = self.append_all(actor_id, std::slice::from_ref(&pending))?;
        Ok(written.remove(0))
    }

    /// Append a batch with a single write and a single sync.
    ///
    /// Either every event reaches the file or the call fails.
    pub fn append_all(&self, actor_id: &str, pending: &[PendingEvent]) -> Result<Vec<Event>> {
        let events: Vec<Event> = pending
            .iter()
            .map(|p| Event {
                id: uuid::Uuid::new_v4().to_string(),
                ts: monotonic_now(),
                actor_id: actor_id.to_string(),
                kind: p.kind.as_str().to_string(),
                entity_id: p.entity_id.clone(),
                payload: p.payload.clone(),
            })
            .collect();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut buf = Vec::new();
        // A writer that died mid-append leaves an unterminated fragment; close
        // it off so the first new event starts on its own line.
        if !ends_with_newline(&mut file)? {
            tracing::warn!(path = %self.path.display(), "Terminating partial event line");
            buf.push(b'\n');
        }
        for event in &events {
            serde_json::to_writer(&mut buf, event)?;
            buf.push(b'\n');
        }
        file.write_all(&buf)?;
        file.sync_data()?;

        tracing::debug!(
            count = events.len(),
            actor_id,
            first = %events.first().map(|e| e.kind.as_str()).unwrap_or(""),
            "Events appended"
        );
        Ok(events)
    }

    /// Every complete event in append order.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_lines(&bytes))
    }

    /// The last `n` events (all of them when fewer exist), in append order.
    pub fn tail(&self, n: usize) -> Result<Vec<Event>> {
        let mut all = self.read_all()?;
        let skip = all.len().saturating_sub(n);
        Ok(all.split_off(skip))
    }

    /// The last `n` events whose entity id is `entity_id`, in append order.
    pub fn for_entity(&self, entity_id: &str, n: usize) -> Result<Vec<Event>> {
        let mut matching: Vec<Event> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.entity_id == entity_id)
            .collect();
        let skip = matching.len().saturating_sub(n);
        Ok(matching.split_off(skip))
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut fs::File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn parse_lines(bytes: &[u8]) -> Vec<Event> {
    // Only newline-terminated lines are complete.
    let complete = match bytes.iter().rposition(|b| *b == b'\n') {
        Some(last_nl) => &bytes[..last_nl],
        None => return Vec::new(),
    };

    let mut events = Vec::new();
    for (lineno, line) in complete.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<Event>(line) {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "Skipping malformed event line");
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> EventLog {
        EventLog::new(dir.path().join("events.jsonl"))
    }

    #[test]
    fn test_event_kind_catalog_round_trips() {
        for kind in EventKind::ALL {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
        assert!("item.explode".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_tail_returns_last_n_in_append_order() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        assert!(log.tail(5).unwrap().is_empty());

        for i in 0..5 {
            log.append("act-1", EventKind::ItemCreate, &format!("item-{}", i), json!({}))
                .unwrap();
        }

        let tail = log.tail(3).unwrap();
        let ids: Vec<&str> = tail.iter().map(|e| e.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["item-2", "item-3", "item-4"]);
        assert_eq!(log.tail(50).unwrap().len(), 5);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        let batch: Vec<PendingEvent> = (0..20)
            .map(|i| PendingEvent {
                kind: EventKind::WorklogAdd,
                entity_id: format!("wl-{}", i),
                payload: json!({}),
            })
            .collect();
        let written = log.append_all("act-1", &batch).unwrap();
        for pair in written.windows(2) {
            assert!(pair[0].ts < pair[1].ts);
        }
    }

    #[test]
    fn test_for_entity_filters() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.append("act-1", EventKind::ItemCreate, "item-1", json!({"title": "A"}))
            .unwrap();
        log.append("act-1", EventKind::ItemCreate, "item-2", json!({"title": "B"}))
            .unwrap();
        log.append("act-1", EventKind::ItemSetTitle, "item-1", json!({"title": "A2"}))
            .unwrap();

        let history = log.for_entity("item-1", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].kind, "item.set_title");
        assert_eq!(history[1].payload["title"], "A2");
        assert_eq!(log.for_entity("item-1", 1).unwrap()[0].kind, "item.set_title");
    }

    #[test]
    fn test_partial_trailing_line_and_garbage_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.append("act-1", EventKind::ProjectCreate, "proj-1", json!({}))
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"this is not json\n").unwrap();
        file.write_all(br#"{"id":"x","ts":"2025-01-01T00:00:00Z","actorId":"a","#)
            .unwrap();

        let events = log.read_all().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_id, "proj-1");
    }

    #[test]
    fn test_append_after_crashed_writer_keeps_new_event() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        fs::write(log.path(), br#"{"id":"x","ts":"2025-01-01T00:00:00Z","#).unwrap();

        log.append("act-1", EventKind::ProjectCreate, "proj-1", json!({}))
            .unwrap();
        log.append("act-1", EventKind::ProjectRename, "proj-1", json!({}))
            .unwrap();

        let kinds: Vec<String> = log.read_all().unwrap().into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec!["project.create", "project.rename"]);
    }

    #[test]
    fn test_foreign_event_types_are_kept() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        fs::write(
            log.path(),
            "{\"id\":\"e1\",\"ts\":\"2025-01-01T00:00:00Z\",\"actorId\":\"act-9\",\"type\":\"plugin.thing\",\"entityId\":\"x\",\"payload\":{}}\n",
        )
        .unwrap();
        let events = log.tail(1).unwrap();
        assert_eq!(events[0].kind, "plugin.thing");
    }
}
