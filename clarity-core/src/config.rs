//! Configuration loading and management
//!
//! The global configuration is loaded from `<config_dir>/config.toml`, where
//! `config_dir` is `$CLARITY_CONFIG_DIR` when set and otherwise follows the
//! XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/clarity/` (~/.config/clarity/)
//! - Workspaces: `<config_dir>/workspaces/<name>/`
//! - State/Logs: `$XDG_STATE_HOME/clarity/` (~/.local/state/clarity/)

use crate::db::store::DEFAULT_MAX_ATTACHMENT_BYTES;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Overrides the whole config root
pub const ENV_CONFIG_DIR: &str = "CLARITY_CONFIG_DIR";
pub const ENV_AUTOCOMMIT: &str = "CLARITY_AUTOCOMMIT";
pub const ENV_GIT_AUTOCOMMIT: &str = "CLARITY_GIT_AUTOCOMMIT";
pub const ENV_AUTOPUSH: &str = "CLARITY_AUTOPUSH";
/// Write-actor override for the CLI
pub const ENV_ACTOR: &str = "CLARITY_ACTOR";

/// Name of the workspace used when none is configured
pub const DEFAULT_WORKSPACE: &str = "default";

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Workspace selection
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Attachment limits
    #[serde(default)]
    pub attachments: AttachmentsConfig,

    /// Git auto-commit tuning
    #[serde(default)]
    pub git: GitConfig,

    /// Capture templates, matched by key sequence
    #[serde(default)]
    pub capture_templates: Vec<CaptureTemplate>,

    /// Labels for key prefixes that have no template of their own
    #[serde(default)]
    pub capture_template_groups: Vec<CaptureTemplateGroup>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    /// Workspace opened when no `--workspace` is given
    #[serde(default = "default_workspace_name")]
    pub default: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            default: default_workspace_name(),
        }
    }
}

fn default_workspace_name() -> String {
    DEFAULT_WORKSPACE.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AttachmentsConfig {
    /// Largest accepted attachment in bytes
    #[serde(default = "default_max_attachment_bytes")]
    pub max_bytes: u64,
}

impl Default for AttachmentsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_attachment_bytes(),
        }
    }
}

fn default_max_attachment_bytes() -> u64 {
    DEFAULT_MAX_ATTACHMENT_BYTES
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    /// Quiet period before a burst of edits is committed
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    2000
}

/// A capture template: a key sequence that files a new item into an outline.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CaptureTemplate {
    pub name: String,
    /// One entry per keypress, e.g. `["w", "i"]`
    pub keys: Vec<String>,
    pub target: CaptureTarget,
    #[serde(default)]
    pub defaults: CaptureDefaults,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CaptureTarget {
    /// Workspace name; empty means the current workspace
    #[serde(default)]
    pub workspace: String,
    pub outline_id: String,
}

/// Initial draft values; may contain `{{token}}` placeholders.
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CaptureDefaults {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct CaptureTemplateGroup {
    pub name: String,
    pub keys: Vec<String>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject capture templates with empty or duplicate key sequences.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for t in &self.capture_templates {
            if t.keys.is_empty() || t.keys.iter().any(|k| k.is_empty()) {
                return Err(Error::Config(format!(
                    "capture template {:?} needs a non-empty key sequence",
                    t.name
                )));
            }
            if !seen.insert(t.keys.clone()) {
                return Err(Error::Config(format!(
                    "capture template {:?} reuses keys {:?}",
                    t.name,
                    t.keys.join("")
                )));
            }
            if t.target.outline_id.trim().is_empty() {
                return Err(Error::Config(format!(
                    "capture template {:?} has no target.outline_id",
                    t.name
                )));
            }
        }
        if self.attachments.max_bytes == 0 {
            return Err(Error::Config(
                "attachments.max_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Root of all clarity configuration and workspaces
    ///
    /// `$CLARITY_CONFIG_DIR`, else `$XDG_CONFIG_HOME/clarity/`
    pub fn config_dir() -> PathBuf {
        match std::env::var_os(ENV_CONFIG_DIR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => xdg_config_home().join("clarity"),
        }
    }

    /// Returns the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Returns the directory holding named workspaces
    pub fn workspaces_dir() -> PathBuf {
        Self::config_dir().join("workspaces")
    }

    /// Directory of the workspace called `name`
    pub fn workspace_dir(name: &str) -> PathBuf {
        Self::workspaces_dir().join(name)
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/clarity/` (~/.local/state/clarity/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("clarity")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/clarity/clarity.log` (~/.local/state/clarity/clarity.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("clarity.log")
    }

    /// Whether debounced auto-commit is on (`CLARITY_AUTOCOMMIT` or
    /// `CLARITY_GIT_AUTOCOMMIT`, default on).
    pub fn autocommit_enabled() -> bool {
        let raw = std::env::var(ENV_AUTOCOMMIT)
            .ok()
            .or_else(|| std::env::var(ENV_GIT_AUTOCOMMIT).ok());
        parse_flag(raw.as_deref(), true)
    }

    /// Whether auto-commit also pushes (`CLARITY_AUTOPUSH`, default on).
    pub fn autopush_enabled() -> bool {
        parse_flag(std::env::var(ENV_AUTOPUSH).ok().as_deref(), true)
    }
}

/// Interpret an on/off environment value; `0`, `false`, `off` and `no` disable.
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|s| s.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) => !matches!(v.as_str(), "0" | "false" | "off" | "no"),
    }
}
