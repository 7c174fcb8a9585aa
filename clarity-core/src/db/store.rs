//! Snapshot persistence for a workspace directory
//!
//! On-disk layout:
//!
//! ```text
//! db.json              snapshot (written via temp file + fsync + rename)
//! events.jsonl         append-only event log (see `events`)
//! tui_state.json       saved view breadcrumb
//! blobs/<attId>/<name> attachment copies, never mutated after creation
//! ```
//!
//! There is no file locking. A single process writes; readers in other
//! processes always observe either the old or the new snapshot thanks to the
//! atomic rename.

use super::Db;
use crate::error::{Error, Result};
use crate::types::{Attachment, SavedView};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const SNAPSHOT_FILE: &str = "db.json";
pub const EVENTS_FILE: &str = "events.jsonl";
pub const VIEW_FILE: &str = "tui_state.json";
pub const BLOBS_DIR: &str = "blobs";

/// Default attachment size cap (50 MiB)
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 50 * 1024 * 1024;

/// A validated attachment source, ready to be copied into the blob tree.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobSource {
    pub source: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
}

/// File-backed storage for one workspace.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (and create if needed) the workspace directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn events_path(&self) -> PathBuf {
        self.dir.join(EVENTS_FILE)
    }

    pub fn view_path(&self) -> PathBuf {
        self.dir.join(VIEW_FILE)
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.dir.join(BLOBS_DIR)
    }

    // ============================================
    // Snapshot
    // ============================================

    /// Load the snapshot. A missing or empty file yields an empty [`Db`].
    pub fn load(&self) -> Result<Db> {
        let path = self.snapshot_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Db::default()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            tracing::debug!(path = %path.display(), "Empty snapshot, starting fresh");
            return Ok(Db::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load the snapshot together with the stamp observed just before reading.
    pub fn load_with_stamp(&self) -> Result<(Db, FileStamp)> {
        let stamp = self.snapshot_stamp();
        let db = self.load()?;
        Ok((db, stamp))
    }

    /// Atomically replace the snapshot.
    pub fn save(&self, db: &Db) -> Result<()> {
        let json = serde_json::to_vec_pretty(db)?;
        write_atomic(&self.dir, &self.snapshot_path(), ".db.json.", &json)?;
        tracing::debug!(
            items = db.items.len(),
            path = %self.snapshot_path().display(),
            "Snapshot saved"
        );
        Ok(())
    }

    pub fn snapshot_stamp(&self) -> FileStamp {
        FileStamp::of(&self.snapshot_path())
    }

    pub fn events_stamp(&self) -> FileStamp {
        FileStamp::of(&self.events_path())
    }

    // ============================================
    // Attachments
    // ============================================

    /// Validate an attachment source file against the size cap.
    pub fn check_blob_source(&self, source: &Path, max_bytes: u64) -> Result<BlobSource> {
        let meta = fs::metadata(source)
            .map_err(|e| Error::AttachmentIo(format!("{}: {}", source.display(), e)))?;
        if !meta.is_file() {
            return Err(Error::AttachmentIo(format!(
                "{}: not a regular file",
                source.display()
            )));
        }
        if meta.len() > max_bytes {
            return Err(Error::AttachmentTooLarge {
                size: meta.len(),
                max: max_bytes,
            });
        }
        Ok(BlobSource {
            source: source.to_path_buf(),
            original_name: sanitize_file_name(source),
            size_bytes: meta.len(),
        })
    }

    /// Relative blob path for an attachment id.
    pub fn blob_rel_path(attachment_id: &str, original_name: &str) -> String {
        format!("{}/{}", attachment_id, original_name)
    }

    /// Copy a validated source into `blobs/<attId>/<originalName>`.
    pub fn store_blob(&self, attachment_id: &str, blob: &BlobSource) -> Result<()> {
        let dest_dir = self.blobs_dir().join(attachment_id);
        fs::create_dir_all(&dest_dir).map_err(|e| Error::AttachmentIo(e.to_string()))?;
        let dest = dest_dir.join(&blob.original_name);
        fs::copy(&blob.source, &dest)
            .map_err(|e| Error::AttachmentIo(format!("{}: {}", blob.source.display(), e)))?;
        tracing::debug!(attachment_id, dest = %dest.display(), "Blob stored");
        Ok(())
    }

    /// Absolute path of an attachment's blob.
    pub fn blob_path(&self, attachment: &Attachment) -> PathBuf {
        self.blobs_dir().join(&attachment.path)
    }

    // ============================================
    // Saved view
    // ============================================

    /// Read the saved view; a missing or unreadable breadcrumb is `None`.
    pub fn load_view(&self) -> Result<Option<SavedView>> {
        let path = self.view_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(view) => Ok(Some(view)),
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Ignoring malformed saved view");
                Ok(None)
            }
        }
    }

    pub fn save_view(&self, view: &SavedView) -> Result<()> {
        let json = serde_json::to_vec(view)?;
        write_atomic(&self.dir, &self.view_path(), ".tui_state.json.", &json)
    }
}

/// What a metadata probe saw of one file. Length is tracked alongside
/// mtime so two writes inside one mtime tick are still told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStamp {
    pub mtime: Option<SystemTime>,
    pub len: Option<u64>,
}

impl FileStamp {
    pub fn of(path: &Path) -> Self {
        match fs::metadata(path) {
            Ok(meta) => Self {
                mtime: meta.modified().ok(),
                len: Some(meta.len()),
            },
            Err(_) => Self {
                mtime: None,
                len: None,
            },
        }
    }

    pub fn exists(&self) -> bool {
        self.len.is_some()
    }
}

/// Write to a sibling temp file, fsync, then rename over `dest`.
fn write_atomic(dir: &Path, dest: &Path, prefix: &str, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| Error::Io(e.error))?;
    // Persist the rename itself; not every platform allows syncing a directory.
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
    Ok(())
}

fn sanitize_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "attachment".to_string(),
        s => s.to_string(),
    }
}
