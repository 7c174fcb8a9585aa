//! Read-only projections from a snapshot to display rows
//!
//! Everything here is a pure function of a [`Db`](crate::db::Db) plus the
//! session's collapse state. Nothing mutates the snapshot.
//!
//! - [`outline`]: the flattened item tree of one outline
//! - [`collapse`]: the three-state "collapse all" cycle
//! - [`board`]: status columns
//! - [`agenda`]: open work across the whole workspace
//! - [`archived`]: archived projects, outlines and items
//! - [`activity`]: comment threads and worklog under an item

pub mod activity;
pub mod agenda;
pub mod archived;
pub mod board;
pub mod collapse;
pub mod outline;

pub use activity::{activity_rows, ActivityLine, ActivityRow};
pub use agenda::{agenda, AgendaGroup};
pub use archived::{archived, ArchivedView};
pub use board::{board_columns, BoardColumn};
pub use collapse::{collapse_state, toggle_collapse_all, CollapseState};
pub use outline::{outline_rows, OutlineRow, OutlineTree};

use std::collections::BTreeSet;

/// Identity of a displayed row.
///
/// Activity rows get their own variants instead of pseudo item ids, so a
/// selection always maps back to the entity it shows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    Item(String),
    /// Comments header under an item (holds the item id)
    CommentsRoot(String),
    Comment(String),
    /// Worklog header under an item (holds the item id)
    WorklogRoot(String),
    Worklog(String),
    /// Line `n` of an expanded comment body (holds the comment id)
    CommentBody(String, usize),
    /// Line `n` of an expanded worklog body (holds the entry id)
    WorklogBody(String, usize),
}

impl RowKey {
    /// Id of the entity the row stands for. Body lines resolve to their
    /// comment or worklog entry.
    pub fn entity_id(&self) -> &str {
        match self {
            RowKey::Item(id)
            | RowKey::CommentsRoot(id)
            | RowKey::Comment(id)
            | RowKey::WorklogRoot(id)
            | RowKey::Worklog(id)
            | RowKey::CommentBody(id, _)
            | RowKey::WorklogBody(id, _) => id,
        }
    }

    /// The comment or worklog row a body line belongs to.
    pub fn body_owner(&self) -> Option<RowKey> {
        match self {
            RowKey::CommentBody(id, _) => Some(RowKey::Comment(id.clone())),
            RowKey::WorklogBody(id, _) => Some(RowKey::Worklog(id.clone())),
            _ => None,
        }
    }
}

/// Set of collapsed rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapseSet {
    collapsed: BTreeSet<RowKey>,
}

impl CollapseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_collapsed(&self, key: &RowKey) -> bool {
        self.collapsed.contains(key)
    }

    pub fn is_item_collapsed(&self, item_id: &str) -> bool {
        self.collapsed.contains(&RowKey::Item(item_id.to_string()))
    }

    pub fn set(&mut self, key: RowKey, collapsed: bool) {
        if collapsed {
            self.collapsed.insert(key);
        } else {
            self.collapsed.remove(&key);
        }
    }

    /// Flip one row; returns the new collapsed state.
    pub fn toggle(&mut self, key: RowKey) -> bool {
        if self.collapsed.remove(&key) {
            false
        } else {
            self.collapsed.insert(key);
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &RowKey> {
        self.collapsed.iter()
    }
}
