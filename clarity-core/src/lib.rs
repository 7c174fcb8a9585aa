//! # clarity-core
//!
//! Workspace data engine for the clarity terminal outliner.
//!
//! This library provides:
//! - Domain types for actors, projects, outlines, items and their activity
//! - The snapshot + append-only event log persistence of a workspace
//! - The command engine that validates, mutates, logs and saves in one step
//! - Read-only view projections (outline tree, board, agenda, archived)
//! - A reload loop for interactive sessions and optional git sync
//! - Configuration, capture templates and logging
//!
//! ## Architecture
//!
//! A workspace is a directory:
//! - **`db.json`:** the canonical snapshot, replaced atomically
//! - **`events.jsonl`:** append-only history, one JSON event per line
//! - **`blobs/`:** immutable attachment copies
//!
//! Every write goes through [`Engine`]; everything else only reads.
//!
//! ## Example
//!
//! ```rust,no_run
//! use clarity_core::{ActorKind, Config, Engine, NewItem};
//!
//! let dir = Config::workspace_dir("default");
//! let engine = Engine::open(&dir).expect("failed to open workspace");
//! engine.create_actor(ActorKind::Human, "Ada", None).expect("actor");
//! let project = engine.create_project("Home").expect("project");
//! let outline = engine.create_outline(&project, Some("Chores")).expect("outline");
//! engine
//!     .create_item(&NewItem {
//!         outline_id: outline,
//!         title: "Water the plants".into(),
//!         ..Default::default()
//!     })
//!     .expect("item");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::{Db, Event, EventLog, Store};
pub use engine::{AttachmentDraft, ChangeNotifier, Engine, NewItem, Placement, StatusDefEdit};
pub use error::{Error, Result};
pub use types::*;

// Public modules
pub mod capture;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod format;
pub mod git;
pub mod identity;
pub mod logging;
pub mod rank;
pub mod reload;
pub mod status;
pub mod types;
pub mod views;
pub mod workspace;
