//! Named workspaces under the config directory

use crate::config::Config;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// A resolved workspace: a display name and the directory holding its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    pub name: String,
    pub dir: PathBuf,
}

impl WorkspaceRef {
    /// Workspace at an explicit directory, named after its last component.
    pub fn at_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        Self { name, dir }
    }
}

/// Workspace names may not escape the workspaces root.
pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid("workspace", "name must not be empty"));
    }
    if trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']) {
        return Err(Error::invalid(
            "workspace",
            format!("{:?} is not a valid workspace name", name),
        ));
    }
    Ok(())
}

/// The directory holding every named workspace.
#[derive(Debug, Clone)]
pub struct Workspaces {
    root: PathBuf,
}

impl Workspaces {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<config dir>/workspaces`
    pub fn from_env() -> Self {
        Self::new(Config::workspaces_dir())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, name: &str) -> Result<WorkspaceRef> {
        validate_name(name)?;
        let name = name.trim().to_string();
        Ok(WorkspaceRef {
            dir: self.root.join(&name),
            name,
        })
    }

    /// Names of existing workspaces, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Pick the workspace for this invocation: an explicit directory wins, then
/// an explicit name, then the configured default.
pub fn resolve(
    config: &Config,
    workspaces: &Workspaces,
    name: Option<&str>,
    dir: Option<&Path>,
) -> Result<WorkspaceRef> {
    if let Some(dir) = dir {
        return Ok(WorkspaceRef::at_dir(dir));
    }
    let name = name.unwrap_or(&config.workspace.default);
    workspaces.get(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_order() {
        let tmp = TempDir::new().unwrap();
        let workspaces = Workspaces::new(tmp.path());
        let config = Config::default();

        let default = resolve(&config, &workspaces, None, None).unwrap();
        assert_eq!(default.name, "default");
        assert_eq!(default.dir, tmp.path().join("default"));

        let named = resolve(&config, &workspaces, Some("work"), None).unwrap();
        assert_eq!(named.dir, tmp.path().join("work"));

        let explicit = resolve(&config, &workspaces, Some("work"), Some(Path::new("/srv/notes"))).unwrap();
        assert_eq!(explicit.name, "notes");
        assert_eq!(explicit.dir, PathBuf::from("/srv/notes"));
    }

    #[test]
    fn test_bad_names() {
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("inbox").is_ok());
    }

    #[test]
    fn test_list() {
        let tmp = TempDir::new().unwrap();
        let workspaces = Workspaces::new(tmp.path().join("ws"));
        assert!(workspaces.list().unwrap().is_empty());
        fs::create_dir_all(tmp.path().join("ws/b")).unwrap();
        fs::create_dir_all(tmp.path().join("ws/a")).unwrap();
        fs::write(tmp.path().join("ws/stray.txt"), "x").unwrap();
        assert_eq!(workspaces.list().unwrap(), vec!["a", "b"]);
    }
}
