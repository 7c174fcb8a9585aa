//! Quick capture: key-sequence templates that file a new item, possibly into
//! another workspace
//!
//! A capture runs in three steps:
//!
//! 1. [`TemplateTree`] walks the configured key sequences one press at a time
//! 2. [`CaptureDraft::open`] resolves the target and expands the template's
//!    defaults (`{{date}}`, `{{clipboard}}`, ...)
//! 3. [`CaptureDraft::commit`] creates the item through the target
//!    workspace's [`Engine`]

use crate::config::{CaptureTemplate, CaptureTemplateGroup};
use crate::db::Store;
use crate::engine::{normalize_tags, Engine, NewItem};
use crate::error::{Error, Result};
use crate::workspace::{WorkspaceRef, Workspaces};
use chrono::{DateTime, FixedOffset, Local};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

pub const ENV_CLIPBOARD: &str = "CLARITY_CAPTURE_CLIPBOARD";
pub const ENV_SELECTION: &str = "CLARITY_CAPTURE_SELECTION";
pub const ENV_URL: &str = "CLARITY_CAPTURE_URL";

// ============================================
// Template tree
// ============================================

/// A choice offered at the current prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOption {
    pub key: String,
    pub name: String,
    /// True when pressing the key reaches a template with nothing below it
    pub is_leaf: bool,
}

/// Result of one key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Press {
    /// Descended; more keys (or ENTER) needed
    Pending,
    /// Reached a template with no longer sequences below it
    Selected(CaptureTemplate),
    /// No template continues with this key; the prefix is unchanged
    NoMatch,
}

#[derive(Debug, Clone)]
pub struct TemplateTree {
    templates: Vec<CaptureTemplate>,
    groups: Vec<CaptureTemplateGroup>,
    prefix: Vec<String>,
}

impl TemplateTree {
    pub fn new(templates: Vec<CaptureTemplate>, groups: Vec<CaptureTemplateGroup>) -> Result<Self> {
        let mut seen = HashSet::new();
        for t in &templates {
            if t.keys.is_empty() || t.keys.iter().any(|k| k.is_empty()) {
                return Err(Error::invalid(
                    "captureTemplates",
                    format!("template {:?} has an empty key", t.name),
                ));
            }
            if !seen.insert(t.keys.clone()) {
                return Err(Error::invalid(
                    "captureTemplates",
                    format!("key sequence {:?} is used twice", t.keys.join("")),
                ));
            }
        }
        Ok(Self {
            templates,
            groups,
            prefix: Vec::new(),
        })
    }

    pub fn prefix(&self) -> &[String] {
        &self.prefix
    }

    fn under<'a>(&'a self, prefix: &'a [String]) -> impl Iterator<Item = &'a CaptureTemplate> + 'a {
        self.templates
            .iter()
            .filter(move |t| t.keys.len() >= prefix.len() && t.keys[..prefix.len()] == *prefix)
    }

    fn exact(&self, keys: &[String]) -> Option<&CaptureTemplate> {
        self.templates.iter().find(|t| t.keys == keys)
    }

    /// Next-key choices in configuration order.
    pub fn options(&self) -> Vec<CaptureOption> {
        let depth = self.prefix.len();
        let mut out: Vec<CaptureOption> = Vec::new();
        for t in self.under(&self.prefix) {
            let Some(key) = t.keys.get(depth) else {
                continue;
            };
            if out.iter().any(|o| &o.key == key) {
                continue;
            }
            let mut path = self.prefix.clone();
            path.push(key.clone());
            let has_deeper = self.under(&path).any(|t| t.keys.len() > path.len());
            let name = match self.exact(&path) {
                Some(t) => t.name.clone(),
                None => self
                    .groups
                    .iter()
                    .find(|g| g.keys == path)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| format!("{}...", key)),
            };
            out.push(CaptureOption {
                key: key.clone(),
                name,
                is_leaf: self.exact(&path).is_some() && !has_deeper,
            });
        }
        out
    }

    pub fn press(&mut self, key: &str) -> Press {
        let mut path = self.prefix.clone();
        path.push(key.to_string());
        if self.under(&path).next().is_none() {
            return Press::NoMatch;
        }
        let has_deeper = self.under(&path).any(|t| t.keys.len() > path.len());
        let exact = self.exact(&path).cloned();
        self.prefix = path;
        match exact {
            Some(template) if !has_deeper => {
                tracing::debug!(template = %template.name, "Capture template selected");
                Press::Selected(template)
            }
            _ => Press::Pending,
        }
    }

    /// Select the template sitting exactly at the current prefix.
    pub fn enter(&self) -> Option<CaptureTemplate> {
        self.exact(&self.prefix).cloned()
    }

    /// Drop the last key; false at the top.
    pub fn back(&mut self) -> bool {
        self.prefix.pop().is_some()
    }
}

// ============================================
// Expansion
// ============================================

/// Values available to `{{token}}` placeholders.
#[derive(Debug, Clone)]
pub struct ExpandContext {
    pub now: DateTime<FixedOffset>,
    pub workspace: String,
    pub outline: String,
    pub clipboard: String,
    pub selection: String,
    pub url: String,
    /// Caller-supplied values; these win over the built-ins
    pub vars: BTreeMap<String, String>,
}

impl ExpandContext {
    pub fn new(workspace: &str, outline: &str) -> Self {
        Self {
            now: Local::now().fixed_offset(),
            workspace: workspace.to_string(),
            outline: outline.to_string(),
            clipboard: String::new(),
            selection: String::new(),
            url: String::new(),
            vars: BTreeMap::new(),
        }
    }

    /// Fill clipboard, selection and url from `CLARITY_CAPTURE_*`.
    pub fn with_env(mut self) -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        self.clipboard = var(ENV_CLIPBOARD);
        self.selection = var(ENV_SELECTION);
        self.url = var(ENV_URL);
        self
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(v) = self.vars.get(name) {
            return Some(v.clone());
        }
        let v = match name {
            "now" => self.now.to_rfc3339(),
            "date" => self.now.format("%Y-%m-%d").to_string(),
            "time" => self.now.format("%H:%M").to_string(),
            "workspace" => self.workspace.clone(),
            "outline" => self.outline.clone(),
            "clipboard" => self.clipboard.clone(),
            "selection" => self.selection.clone(),
            "url" => self.url.clone(),
            _ => return None,
        };
        Some(v)
    }
}

/// Replace `{{ name }}` placeholders. Unknown names and unclosed braces are
/// left as written.
pub fn expand(template: &str, ctx: &ExpandContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        match ctx.lookup(after[..end].trim()) {
            Some(value) => out.push_str(&value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

// ============================================
// Draft and commit
// ============================================

/// An item about to be captured.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureDraft {
    pub template_name: String,
    pub workspace: String,
    pub dir: PathBuf,
    pub outline_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status_id: String,
}

/// Where a capture landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    pub workspace: String,
    pub dir: PathBuf,
    pub item_id: String,
}

impl CaptureDraft {
    /// Resolve the template's target and pre-fill the draft.
    ///
    /// An empty `target.workspace` means `current`.
    pub fn open(
        template: &CaptureTemplate,
        workspaces: &Workspaces,
        current: &WorkspaceRef,
        ctx: &ExpandContext,
    ) -> Result<Self> {
        let target = if template.target.workspace.trim().is_empty() {
            current.clone()
        } else {
            workspaces.get(&template.target.workspace)?
        };

        let db = Store::open(&target.dir)?.load()?;
        let outline = db.require_outline(&template.target.outline_id)?;
        let mut ctx = ctx.clone();
        ctx.workspace = target.name.clone();
        ctx.outline = outline.display_name().to_string();

        let defaults = &template.defaults;
        let tags: Vec<String> = defaults
            .tags
            .iter()
            .flatten()
            .map(|t| expand(t, &ctx))
            .collect();
        Ok(Self {
            template_name: template.name.clone(),
            workspace: target.name,
            dir: target.dir,
            outline_id: outline.id.clone(),
            title: expand(defaults.title.as_deref().unwrap_or_default(), &ctx),
            description: expand(defaults.description.as_deref().unwrap_or_default(), &ctx),
            tags: normalize_tags(&tags),
            status_id: outline.first_status_id().unwrap_or_default().to_string(),
        })
    }

    /// Retarget to another outline of the same workspace. The status resets
    /// to the new outline's first status unless it is valid there too.
    pub fn set_outline(&mut self, outline_id: &str) -> Result<()> {
        let db = Store::open(&self.dir)?.load()?;
        let outline = db.require_outline(outline_id)?;
        if outline.status_def(&self.status_id).is_none() {
            self.status_id = outline.first_status_id().unwrap_or_default().to_string();
        }
        self.outline_id = outline.id.clone();
        Ok(())
    }

    /// Create the item. `engine` must be opened on the draft's directory.
    pub fn commit(&self, engine: &Engine) -> Result<CaptureResult> {
        if engine.dir() != self.dir.as_path() {
            return Err(Error::invalid(
                "workspace",
                format!(
                    "engine is open on {} but the draft targets {}",
                    engine.dir().display(),
                    self.dir.display()
                ),
            ));
        }
        let item_id = engine.create_item(&NewItem {
            outline_id: self.outline_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            status_id: Some(self.status_id.clone()).filter(|s| !s.is_empty()),
            tags: self.tags.clone(),
            ..Default::default()
        })?;
        tracing::info!(
            workspace = %self.workspace,
            item = %item_id,
            template = %self.template_name,
            "Captured item"
        );
        Ok(CaptureResult {
            workspace: self.workspace.clone(),
            dir: self.dir.clone(),
            item_id,
        })
    }
}
