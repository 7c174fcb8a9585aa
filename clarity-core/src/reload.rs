//! Keeping an interactive session in step with the files on disk
//!
//! [`ReloadWatcher`] probes the snapshot and event log every tick and hands
//! back a fresh [`Refresh`] when either changed, whether the change came
//! from this process or from another writer (a second CLI, a git pull).
//!
//! [`Session`] is the UI-agnostic state of an outline screen: the snapshot,
//! the derived rows, the selection and scroll position. Applying a refresh
//! re-derives the rows and keeps the selection on the same entity, or on
//! its nearest surviving neighbour when it disappeared. Reloads and
//! selection moves queue a debounced preview of the selected item on the
//! session's [`PreviewScheduler`].

use crate::db::store::FileStamp;
use crate::db::{Db, Event, EventLog, Store};
use crate::error::Result;
use crate::types::{SavedView, ViewKind};
use crate::views::{
    activity_rows, outline_rows, toggle_collapse_all, ActivityRow, CollapseSet, CollapseState,
    OutlineRow, RowKey,
};
use std::path::Path;
use std::time::{Duration, Instant};

/// Tick interval of the watch loop
pub const RELOAD_INTERVAL: Duration = Duration::from_millis(750);

/// Delay before a requested preview is computed
pub const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(150);

/// Events kept in a refresh for the activity pane
pub const EVENTS_TAIL: usize = 50;

// ============================================
// Watcher
// ============================================

/// A reloaded snapshot.
#[derive(Debug, Clone)]
pub struct Refresh {
    /// Monotonic per watcher; a lower number than one already applied is stale
    pub seq: u64,
    pub db: Db,
    pub recent_events: Vec<Event>,
}

#[derive(Debug)]
pub struct ReloadWatcher {
    store: Store,
    events: EventLog,
    snapshot: FileStamp,
    log: FileStamp,
    seq: u64,
}

impl ReloadWatcher {
    /// Start watching; the current state of the files counts as seen.
    pub fn new(store: Store) -> Self {
        let events = EventLog::new(store.events_path());
        let snapshot = store.snapshot_stamp();
        let log = FileStamp::of(events.path());
        Self {
            store,
            events,
            snapshot,
            log,
            seq: 0,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reload if either file moved since the last probe.
    pub fn poll(&mut self) -> Result<Option<Refresh>> {
        let snapshot = self.store.snapshot_stamp();
        let log = FileStamp::of(self.events.path());
        if snapshot == self.snapshot && log == self.log {
            return Ok(None);
        }
        tracing::debug!(
            snapshot_changed = snapshot != self.snapshot,
            log_changed = log != self.log,
            "Workspace changed on disk"
        );
        self.snapshot = snapshot;
        self.log = log;
        self.load().map(Some)
    }

    /// Reload unconditionally.
    pub fn force(&mut self) -> Result<Refresh> {
        self.snapshot = self.store.snapshot_stamp();
        self.log = FileStamp::of(self.events.path());
        self.load()
    }

    fn load(&mut self) -> Result<Refresh> {
        self.seq += 1;
        Ok(Refresh {
            seq: self.seq,
            db: self.store.load()?,
            recent_events: self.events.tail(EVENTS_TAIL)?,
        })
    }
}

// ============================================
// Preview scheduling
// ============================================

/// A right-pane render to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRequest {
    pub seq: u64,
    pub item_id: String,
    pub width: u16,
    pub height: u16,
}

/// Debounced, latest-wins preview requests.
///
/// Only the newest request is ever handed out, and only once it has been
/// quiet for the debounce period. A finished render whose sequence number
/// is no longer current is dropped by the caller via [`is_current`].
///
/// [`is_current`]: PreviewScheduler::is_current
#[derive(Debug)]
pub struct PreviewScheduler {
    debounce: Duration,
    seq: u64,
    pending: Option<(PreviewRequest, Instant)>,
}

impl PreviewScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            seq: 0,
            pending: None,
        }
    }

    /// Queue a render, superseding anything queued or in flight.
    pub fn request(&mut self, item_id: &str, width: u16, height: u16, now: Instant) -> u64 {
        self.seq += 1;
        self.pending = Some((
            PreviewRequest {
                seq: self.seq,
                item_id: item_id.to_string(),
                width,
                height,
            },
            now,
        ));
        self.seq
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The pending request once its debounce has elapsed.
    pub fn due(&mut self, now: Instant) -> Option<PreviewRequest> {
        match &self.pending {
            Some((_, at)) if now.duration_since(*at) >= self.debounce => {
                self.pending.take().map(|(req, _)| req)
            }
            _ => None,
        }
    }

    pub fn is_current(&self, seq: u64) -> bool {
        seq == self.seq
    }
}

// ============================================
// Session
// ============================================

/// One row of the outline screen.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionRow {
    Item(OutlineRow),
    Activity(ActivityRow),
}

impl SessionRow {
    pub fn key(&self) -> RowKey {
        match self {
            SessionRow::Item(row) => RowKey::Item(row.item.id.clone()),
            SessionRow::Activity(row) => row.key.clone(),
        }
    }
}

/// Interactive state of one outline screen.
#[derive(Debug)]
pub struct Session {
    watcher: ReloadWatcher,
    db: Db,
    recent_events: Vec<Event>,
    applied_seq: u64,
    outline_id: String,
    /// Item whose activity sub-tree is shown under it
    open_item: Option<String>,
    collapse: CollapseSet,
    expanded: CollapseSet,
    rows: Vec<SessionRow>,
    selected: Option<RowKey>,
    scroll: usize,
    viewport: usize,
    preview: PreviewScheduler,
    /// Width and height handed to preview requests
    preview_size: (u16, u16),
}

impl Session {
    pub fn open(store: Store, outline_id: &str) -> Result<Self> {
        let mut watcher = ReloadWatcher::new(store);
        let refresh = watcher.force()?;
        refresh.db.require_outline(outline_id)?;
        let mut session = Self {
            watcher,
            db: Db::default(),
            recent_events: Vec::new(),
            applied_seq: 0,
            outline_id: outline_id.to_string(),
            open_item: None,
            collapse: CollapseSet::new(),
            expanded: CollapseSet::new(),
            rows: Vec::new(),
            selected: None,
            scroll: 0,
            viewport: 20,
            preview: PreviewScheduler::new(PREVIEW_DEBOUNCE),
            preview_size: (80, 24),
        };
        session.apply(refresh);
        Ok(session)
    }

    /// Open the outline recorded in the saved view, if it still exists.
    pub fn restore(store: Store) -> Result<Option<Self>> {
        let Some(view) = store.load_view()? else {
            return Ok(None);
        };
        let Some(outline_id) = view.selected_outline_id.clone() else {
            return Ok(None);
        };
        if store.load()?.outline(&outline_id).is_none() {
            return Ok(None);
        }
        let mut session = Self::open(store, &outline_id)?;
        if let Some(item_id) = view.open_item_id {
            session.open_item(&item_id);
        }
        Ok(Some(session))
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn rows(&self) -> &[SessionRow] {
        &self.rows
    }

    pub fn recent_events(&self) -> &[Event] {
        &self.recent_events
    }

    pub fn outline_id(&self) -> &str {
        &self.outline_id
    }

    pub fn selected(&self) -> Option<&RowKey> {
        self.selected.as_ref()
    }

    pub fn selected_index(&self) -> Option<usize> {
        let key = self.selected.as_ref()?;
        self.rows.iter().position(|r| &r.key() == key)
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Rows currently inside the viewport.
    pub fn visible_rows(&self) -> &[SessionRow] {
        let start = self.scroll.min(self.rows.len());
        let end = (start + self.viewport).min(self.rows.len());
        &self.rows[start..end]
    }

    pub fn preview(&mut self) -> &mut PreviewScheduler {
        &mut self.preview
    }

    pub fn set_preview_size(&mut self, width: u16, height: u16) {
        self.preview_size = (width, height);
    }

    /// Item the preview pane shows: the selected item, or the open item
    /// while an activity row is selected.
    pub fn preview_item(&self) -> Option<&str> {
        match &self.selected {
            Some(RowKey::Item(id)) => Some(id.as_str()),
            Some(_) => self.open_item.as_deref(),
            None => None,
        }
    }

    fn request_preview(&mut self) {
        let Some(item_id) = self.preview_item().map(str::to_string) else {
            return;
        };
        let (width, height) = self.preview_size;
        self.preview.request(&item_id, width, height, Instant::now());
    }

    /// One reload tick. Returns the applied sequence number when the rows
    /// were refreshed.
    pub fn tick(&mut self) -> Result<Option<u64>> {
        match self.watcher.poll()? {
            Some(refresh) => Ok(self.apply(refresh)),
            None => Ok(None),
        }
    }

    /// Install a refresh unless a newer one was applied already.
    pub fn apply(&mut self, refresh: Refresh) -> Option<u64> {
        if refresh.seq <= self.applied_seq {
            tracing::debug!(seq = refresh.seq, applied = self.applied_seq, "Dropping stale refresh");
            return None;
        }
        self.applied_seq = refresh.seq;
        self.db = refresh.db;
        self.recent_events = refresh.recent_events;
        if self
            .open_item
            .as_deref()
            .is_some_and(|id| self.db.item(id).is_none())
        {
            self.open_item = None;
        }
        self.rebuild();
        self.request_preview();
        Some(refresh.seq)
    }

    pub fn set_viewport(&mut self, height: usize) {
        self.viewport = height.max(1);
        self.clamp_scroll();
    }

    pub fn select(&mut self, key: RowKey) -> bool {
        if self.rows.iter().any(|r| r.key() == key) {
            self.selected = Some(key);
            self.clamp_scroll();
            self.request_preview();
            true
        } else {
            false
        }
    }

    pub fn select_next(&mut self) {
        self.move_selection(1);
    }

    pub fn select_prev(&mut self) {
        self.move_selection(-1);
    }

    fn move_selection(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let idx = self.selected_index().unwrap_or(0) as isize + delta;
        let idx = idx.clamp(0, self.rows.len() as isize - 1) as usize;
        let key = self.rows[idx].key();
        if self.selected.as_ref() == Some(&key) {
            return;
        }
        self.selected = Some(key);
        self.clamp_scroll();
        self.request_preview();
    }

    /// Collapse or expand the selected row.
    ///
    /// Items and section headers toggle in the collapse set; single
    /// comments and worklog entries toggle their body. On a body line the
    /// owning entry closes and takes the selection.
    pub fn toggle_selected(&mut self) {
        let Some(key) = self.selected.clone() else {
            return;
        };
        match key {
            RowKey::Comment(_) | RowKey::Worklog(_) => {
                self.expanded.toggle(key);
            }
            RowKey::CommentBody(..) | RowKey::WorklogBody(..) => {
                if let Some(owner) = key.body_owner() {
                    self.expanded.set(owner.clone(), false);
                    self.selected = Some(owner);
                }
            }
            _ => {
                self.collapse.toggle(key);
            }
        }
        self.rebuild();
    }

    /// Three-state collapse cycle over the outline, or over the selected
    /// item's subtree when `scoped`.
    pub fn toggle_collapse_all(&mut self, scoped: bool) -> CollapseState {
        let scope = match (&self.selected, scoped) {
            (Some(RowKey::Item(id)), true) => Some(id.clone()),
            _ => None,
        };
        let state =
            toggle_collapse_all(&self.db, &self.outline_id, scope.as_deref(), &mut self.collapse);
        self.rebuild();
        state
    }

    /// Show an item's comments and worklog under it.
    pub fn open_item(&mut self, item_id: &str) {
        if self.db.item(item_id).is_some() {
            self.open_item = Some(item_id.to_string());
            self.rebuild();
        }
    }

    pub fn close_item(&mut self) {
        self.open_item = None;
        self.rebuild();
    }

    /// Breadcrumb for the next launch.
    pub fn saved_view(&self) -> SavedView {
        let project_id = self
            .db
            .outline(&self.outline_id)
            .map(|o| o.project_id.clone());
        SavedView {
            view: if self.open_item.is_some() {
                ViewKind::Item
            } else {
                ViewKind::Outline
            },
            selected_project_id: project_id,
            selected_outline_id: Some(self.outline_id.clone()),
            open_item_id: self.open_item.clone(),
            return_view: self.open_item.as_ref().map(|_| ViewKind::Outline),
        }
    }

    pub fn save_view(&self) -> Result<()> {
        self.watcher.store().save_view(&self.saved_view())
    }

    /// Re-derive rows and put the selection back.
    fn rebuild(&mut self) {
        let old_keys: Vec<RowKey> = self.rows.iter().map(SessionRow::key).collect();
        let old_index = self
            .selected
            .as_ref()
            .and_then(|k| old_keys.iter().position(|o| o == k));

        let mut rows = Vec::new();
        for row in outline_rows(&self.db, &self.outline_id, &self.collapse) {
            let is_open = self.open_item.as_deref() == Some(row.item.id.as_str());
            let depth = row.depth;
            let id = row.item.id.clone();
            rows.push(SessionRow::Item(row));
            if is_open {
                rows.extend(
                    activity_rows(&self.db, &id, depth + 1, &self.collapse, &self.expanded)
                        .into_iter()
                        .map(SessionRow::Activity),
                );
            }
        }
        self.rows = rows;

        self.selected = self.restore_selection(&old_keys, old_index);
        self.clamp_scroll();
    }

    fn restore_selection(&self, old_keys: &[RowKey], old_index: Option<usize>) -> Option<RowKey> {
        let present = |k: &RowKey| self.rows.iter().any(|r| &r.key() == k);
        if let Some(key) = &self.selected {
            if present(key) {
                return Some(key.clone());
            }
        }
        if let Some(idx) = old_index {
            // Nearest survivor, looking forward first at each distance.
            for d in 1..=old_keys.len() {
                if let Some(k) = old_keys.get(idx + d).filter(|k| present(k)) {
                    return Some(k.clone());
                }
                if let Some(k) = idx
                    .checked_sub(d)
                    .and_then(|i| old_keys.get(i))
                    .filter(|k| present(k))
                {
                    return Some(k.clone());
                }
            }
        }
        self.rows.first().map(SessionRow::key)
    }

    fn clamp_scroll(&mut self) {
        let max = self.rows.len().saturating_sub(1);
        self.scroll = self.scroll.min(max);
        if let Some(idx) = self.selected_index() {
            if idx < self.scroll {
                self.scroll = idx;
            } else if idx >= self.scroll + self.viewport {
                self.scroll = idx + 1 - self.viewport;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, NewItem};
    use crate::types::ActorKind;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Engine) {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(dir.path()).unwrap();
        engine.create_actor(ActorKind::Human, "Ada", None).unwrap();
        engine.create_project("Home").unwrap();
        engine.create_outline("proj-1", Some("Chores")).unwrap();
        (dir, engine)
    }

    fn add(engine: &Engine, title: &str, parent: Option<&str>) -> String {
        engine
            .create_item(&NewItem {
                outline_id: "out-1".into(),
                parent_id: parent.map(str::to_string),
                title: title.into(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_poll_sees_nothing_until_a_write() {
        let (dir, engine) = setup();
        let mut watcher = ReloadWatcher::new(Store::open(dir.path()).unwrap());
        assert!(watcher.poll().unwrap().is_none());

        add(&engine, "Sweep", None);
        let refresh = watcher.poll().unwrap().unwrap();
        assert_eq!(refresh.seq, 1);
        assert_eq!(refresh.db.items.len(), 1);
        assert_eq!(refresh.recent_events.last().unwrap().kind, "item.create");
        assert!(watcher.poll().unwrap().is_none());
    }

    #[test]
    fn test_external_write_keeps_selection() {
        let (dir, engine) = setup();
        let first = add(&engine, "First", None);
        let second = add(&engine, "Second", None);

        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        assert!(session.select(RowKey::Item(second.clone())));

        // A second writer on the same directory.
        let other = Engine::open(dir.path()).unwrap();
        let third = add(&other, "Third", None);

        assert!(session.tick().unwrap().is_some());
        let keys: Vec<RowKey> = session.rows().iter().map(SessionRow::key).collect();
        assert_eq!(
            keys,
            vec![RowKey::Item(first), RowKey::Item(second.clone()), RowKey::Item(third)]
        );
        assert_eq!(session.selected(), Some(&RowKey::Item(second)));
    }

    #[test]
    fn test_removed_selection_moves_to_neighbour() {
        let (dir, engine) = setup();
        let first = add(&engine, "First", None);
        let second = add(&engine, "Second", None);
        let third = add(&engine, "Third", None);

        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        session.select(RowKey::Item(second.clone()));
        engine.archive_item(&second).unwrap();
        session.tick().unwrap();
        assert_eq!(session.selected(), Some(&RowKey::Item(third.clone())));

        engine.archive_item(&third).unwrap();
        session.tick().unwrap();
        assert_eq!(session.selected(), Some(&RowKey::Item(first)));
    }

    #[test]
    fn test_stale_refresh_is_dropped() {
        let (dir, engine) = setup();
        add(&engine, "First", None);
        let store = Store::open(dir.path()).unwrap();
        let mut session = Session::open(store.clone(), "out-1").unwrap();

        let stale = Refresh {
            seq: 0,
            db: Db::default(),
            recent_events: Vec::new(),
        };
        assert!(session.apply(stale).is_none());
        assert_eq!(session.rows().len(), 1);
    }

    #[test]
    fn test_open_item_shows_activity() {
        let (dir, engine) = setup();
        let item = add(&engine, "Sweep", None);
        engine.add_comment(&item, "dusty", None).unwrap();

        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        session.open_item(&item);
        let keys: Vec<RowKey> = session.rows().iter().map(SessionRow::key).collect();
        assert_eq!(keys[1], RowKey::CommentsRoot(item.clone()));
        assert_eq!(keys.len(), 3);

        session.select(RowKey::CommentsRoot(item.clone()));
        session.toggle_selected();
        assert_eq!(session.rows().len(), 2);

        let view = session.saved_view();
        assert_eq!(view.view, ViewKind::Item);
        assert_eq!(view.open_item_id.as_deref(), Some(item.as_str()));
        session.save_view().unwrap();
        let restored = Session::restore(Store::open(dir.path()).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(restored.outline_id(), "out-1");
    }

    #[test]
    fn test_scroll_follows_selection() {
        let (dir, engine) = setup();
        for i in 0..10 {
            add(&engine, &format!("Item {}", i), None);
        }
        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        session.set_viewport(3);
        for _ in 0..5 {
            session.select_next();
        }
        assert_eq!(session.selected_index(), Some(5));
        assert_eq!(session.scroll(), 3);
        assert_eq!(session.visible_rows().len(), 3);
        for _ in 0..5 {
            session.select_prev();
        }
        assert_eq!(session.scroll(), 0);
    }

    #[test]
    fn test_selection_walks_past_expanded_comment() {
        let (dir, engine) = setup();
        let item = add(&engine, "Sweep", None);
        let comment = engine.add_comment(&item, "dusty\nvery dusty", None).unwrap();
        engine.add_worklog(&item, "20m").unwrap();

        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        session.open_item(&item);
        assert!(session.select(RowKey::Comment(comment.clone())));
        session.toggle_selected();

        let expected = [
            RowKey::CommentBody(comment.clone(), 0),
            RowKey::CommentBody(comment.clone(), 1),
            RowKey::WorklogRoot(item.clone()),
        ];
        for key in &expected {
            session.select_next();
            assert_eq!(session.selected(), Some(key));
        }
        session.select_next();
        assert!(matches!(session.selected(), Some(RowKey::Worklog(_))));
        assert_eq!(session.selected_index(), Some(session.rows().len() - 1));

        session.select_prev();
        session.select_prev();
        assert_eq!(session.selected(), Some(&RowKey::CommentBody(comment.clone(), 1)));
        session.toggle_selected();
        assert_eq!(session.selected(), Some(&RowKey::Comment(comment)));
        assert!(!session
            .rows()
            .iter()
            .any(|r| matches!(r.key(), RowKey::CommentBody(..))));
    }

    #[test]
    fn test_reload_requests_preview_of_selection() {
        let (dir, engine) = setup();
        let item = add(&engine, "Sweep", None);
        let mut session = Session::open(Store::open(dir.path()).unwrap(), "out-1").unwrap();
        session.set_preview_size(60, 10);
        let far = Instant::now() + Duration::from_secs(10);
        assert!(session.preview().due(far).is_some());
        assert!(session.preview().due(far).is_none());

        let other = Engine::open(dir.path()).unwrap();
        other.set_title(&item, "Sweep porch").unwrap();
        let seq = session.tick().unwrap();
        assert!(seq.is_some());

        let far = Instant::now() + Duration::from_secs(10);
        let req = session.preview().due(far).unwrap();
        assert_eq!(req.item_id, item);
        assert_eq!((req.width, req.height), (60, 10));
        assert!(session.preview().is_current(req.seq));
    }

    #[test]
    fn test_preview_latest_wins() {
        let mut preview = PreviewScheduler::new(Duration::from_millis(100));
        let t0 = Instant::now();
        let first = preview.request("item-1", 80, 24, t0);
        let second = preview.request("item-2", 80, 24, t0 + Duration::from_millis(50));

        assert!(preview.due(t0 + Duration::from_millis(120)).is_none());
        let req = preview.due(t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(req.item_id, "item-2");
        assert_eq!(req.seq, second);
        assert!(!preview.is_current(first));
        assert!(preview.due(t0 + Duration::from_millis(400)).is_none());
    }
}
