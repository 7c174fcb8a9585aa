//! Error types for clarity-core

use thiserror::Error;

/// Main error type for the clarity-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity is missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Actor may not edit the target
    #[error("permission denied: {actor} may not edit {target}")]
    PermissionDenied { actor: String, target: String },

    /// No resolvable write actor
    #[error("no identity: set a current actor or pass an actor override")]
    NoIdentity,

    /// Value fails a domain constraint
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Status definition still referenced by live items
    #[error("status {status} is used by {count} item(s)")]
    StatusInUse { status: String, count: usize },

    /// Transition to an end state is forbidden
    #[error("cannot complete item: {reason}")]
    CompletionBlocked { reason: String },

    /// Target status requires a note
    #[error("status {status} requires a note")]
    RequiresNote { status: String },

    /// Attachment exceeds the configured byte cap
    #[error("attachment too large: {size} bytes (max {max})")]
    AttachmentTooLarge { size: u64, max: u64 },

    /// Attachment source could not be read or stored
    #[error("attachment error: {0}")]
    AttachmentIo(String),

    /// Repository has unmerged paths, an operation in progress, or dirty tracked files
    #[error("git busy: {0}")]
    GitBusy(String),

    /// Push rejected after the retry
    #[error("git push rejected (non-fast-forward): {0}")]
    GitNonFastForward(String),

    /// Any other git failure, including timeouts
    #[error("git error: {0}")]
    Git(String),

    /// Snapshot changed on disk between load and save
    #[error("workspace changed on disk while saving; retry the operation")]
    ConflictOnReload,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable snake_case name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::PermissionDenied { .. } => "permission_denied",
            Error::NoIdentity => "no_identity",
            Error::Invalid { .. } => "invalid",
            Error::StatusInUse { .. } => "status_in_use",
            Error::CompletionBlocked { .. } => "completion_blocked",
            Error::RequiresNote { .. } => "requires_note",
            Error::AttachmentTooLarge { .. } => "attachment_too_large",
            Error::AttachmentIo(_) => "attachment_io",
            Error::GitBusy(_) => "git_busy",
            Error::GitNonFastForward(_) => "git_non_fast_forward",
            Error::Git(_) => "git_io",
            Error::ConflictOnReload => "conflict_on_reload",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Config(_) => "config",
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias for clarity-core
pub type Result<T> = std::result::Result<T, Error>;
