//! Core domain types for clarity
//!
//! These types are the canonical data model persisted in a workspace's
//! `db.json` snapshot.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Workspace** | A directory holding one dataset (snapshot, event log, blobs, saved view) |
//! | **Project** | A top-level container for outlines |
//! | **Outline** | An ordered tree of items with its own status definitions |
//! | **Item** | A unit of work inside an outline; items nest via `parent_id` |
//! | **Actor** | A human or an agent; agents act on behalf of one human |
//! | **Rank** | A short string ordering siblings lexicographically |
//!
//! Relationships are expressed with ids only. Lookups by id, parent or item
//! live on [`crate::db::Db`].
//!
//! Every persisted struct keeps fields it does not know about in `extra`, so a
//! snapshot written by a newer build survives a load/save cycle unchanged.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unknown fields preserved across a load/save round-trip.
pub type Extra = BTreeMap<String, serde_json::Value>;

// ============================================
// Actors
// ============================================

/// Whether an actor is a person or an automated agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    #[default]
    Human,
    Agent,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Human => "human",
            ActorKind::Agent => "agent",
        }
    }
}

impl std::str::FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(ActorKind::Human),
            "agent" => Ok(ActorKind::Agent),
            _ => Err(format!("unknown actor kind: {}", s)),
        }
    }
}

/// A human or agent identity.
///
/// Agents carry `user_id`, the human they act on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub kind: ActorKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ============================================
// Projects and outlines
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

/// A named stage an item can occupy within an outline.
///
/// `id` is derived from the label when the definition is created and never
/// changes afterwards, even when the label is renamed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDef {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub is_end_state: bool,
    #[serde(default)]
    pub requires_note: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl StatusDef {
    pub fn new(id: &str, label: &str, is_end_state: bool) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            is_end_state,
            requires_note: false,
            extra: Extra::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Display order is definition order
    #[serde(default)]
    pub status_defs: Vec<StatusDef>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
    #[serde(flatten)]
    pub extra: Extra,
}

impl Outline {
    /// Name for display; unnamed outlines fall back to their id.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.id,
        }
    }

    pub fn status_def(&self, status_id: &str) -> Option<&StatusDef> {
        self.status_defs.iter().find(|d| d.id == status_id)
    }

    /// First status in definition order, used as the default for new items.
    pub fn first_status_id(&self) -> Option<&str> {
        self.status_defs.first().map(|d| d.id.as_str())
    }
}

// ============================================
// Items
// ============================================

/// A calendar date with an optional time of day, used for due and schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemDate {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "hhmm")]
    pub time: Option<NaiveTime>,
}

impl ItemDate {
    /// Parse `YYYY-MM-DD`, optionally followed by a space or `T` and `HH:MM`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (date_part, time_part) = match s.split_once(|c: char| c == ' ' || c == 'T') {
            Some((d, t)) => (d, Some(t.trim())),
            None => (s, None),
        };
        let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
        let time = match time_part {
            Some(t) if !t.is_empty() => Some(NaiveTime::parse_from_str(t, "%H:%M").ok()?),
            _ => None,
        };
        Some(Self { date, time })
    }
}

impl std::fmt::Display for ItemDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.time {
            Some(t) => write!(f, "{} {}", self.date.format("%Y-%m-%d"), t.format("%H:%M")),
            None => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.format("%H:%M").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveTime::parse_from_str(s, "%H:%M")
                .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// A unit of work inside an outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub project_id: String,
    pub outline_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub rank: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Empty means "no status"
    #[serde(default)]
    pub status_id: String,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub on_hold: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<ItemDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ItemDate>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub archived: bool,
    pub owner_actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_actor_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Kind of relationship between two items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepType {
    /// `from` cannot complete until `to` is in an end state
    #[default]
    Blocks,
    /// Informational link
    Related,
}

impl DepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepType::Blocks => "blocks",
            DepType::Related => "related",
        }
    }
}

impl std::str::FromStr for DepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(DepType::Blocks),
            "related" => Ok(DepType::Related),
            _ => Err(format!("unknown dependency type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub from_item_id: String,
    pub to_item_id: String,
    #[serde(rename = "type")]
    pub dep_type: DepType,
    #[serde(flatten)]
    pub extra: Extra,
}

// ============================================
// Activity
// ============================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub item_id: String,
    pub author_id: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_comment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorklogEntry {
    pub id: String,
    pub item_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

/// Entity an attachment hangs off
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentOwner {
    #[default]
    Item,
    Comment,
}

impl AttachmentOwner {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentOwner::Item => "item",
            AttachmentOwner::Comment => "comment",
        }
    }
}

impl std::str::FromStr for AttachmentOwner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item" => Ok(AttachmentOwner::Item),
            "comment" => Ok(AttachmentOwner::Comment),
            _ => Err(format!("unknown attachment owner kind: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub entity_kind: AttachmentOwner,
    pub entity_id: String,
    /// Relative to the workspace blob root
    pub path: String,
    pub original_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub alt: String,
    pub size_bytes: u64,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: Extra,
}

// ============================================
// Saved view
// ============================================

/// Screen a session was showing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    Projects,
    Outlines,
    Outline,
    Board,
    Item,
    Agenda,
    Archived,
}

/// Breadcrumb restored on the next launch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedView {
    #[serde(default)]
    pub view: ViewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_outline_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_view: Option<ViewKind>,
}
