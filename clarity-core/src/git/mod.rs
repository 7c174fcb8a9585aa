//! Git synchronisation of a workspace directory
//!
//! Everything shells out to the `git` executable through `tokio::process`
//! with a hard timeout per call: [`PROBE_TIMEOUT`] for the status probe and
//! [`OP_TIMEOUT`] for pull, push and setup. [`GitSync`] wraps the async
//! [`GitRepo`] in blocking methods for the CLI, and [`AutoCommitter`]
//! debounces commits after engine writes.

mod commit;

pub use commit::{AutoCommitter, CommitFn};

use crate::db::store::{BLOBS_DIR, EVENTS_FILE, SNAPSHOT_FILE, VIEW_FILE};
use crate::error::{Error, Result};
use chrono::{SecondsFormat, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
pub const OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Lines setup keeps in the workspace `.gitignore`
pub const GITIGNORE_ENTRIES: &[&str] = &["*.tmp", ".db.json.*", ".tui_state.json.*", ".clarity-private/"];

/// Marker paths inside the git dir while an operation is half done
const IN_PROGRESS_MARKERS: &[&str] = &[
    "rebase-merge",
    "rebase-apply",
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
];

/// Repository state as seen by the status probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub is_repo: bool,
    /// `None` on a detached HEAD
    pub branch: Option<String>,
    pub upstream: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub dirty_tracked: bool,
    pub unmerged: bool,
    pub in_progress: bool,
    /// Error of the last failed operation, kept until one succeeds
    pub last_error: Option<String>,
}

impl GitStatus {
    /// Pull-rebase would be refused in this state.
    pub fn is_busy(&self) -> bool {
        self.unmerged || self.in_progress || self.dirty_tracked
    }
}

/// Parse `git status --porcelain=v2 --branch`.
pub fn parse_porcelain_v2(output: &str) -> GitStatus {
    let mut status = GitStatus {
        is_repo: true,
        ..Default::default()
    };
    for line in output.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            let (key, value) = header.split_once(' ').unwrap_or((header, ""));
            match key {
                "branch.head" if value != "(detached)" => status.branch = Some(value.to_string()),
                "branch.upstream" => status.upstream = Some(value.to_string()),
                "branch.ab" => {
                    for part in value.split_whitespace() {
                        if let Some(n) = part.strip_prefix('+') {
                            status.ahead = n.parse().unwrap_or(0);
                        } else if let Some(n) = part.strip_prefix('-') {
                            status.behind = n.parse().unwrap_or(0);
                        }
                    }
                }
                _ => {}
            }
            continue;
        }
        match line.split(' ').next() {
            Some("1") | Some("2") => status.dirty_tracked = true,
            Some("u") => status.unmerged = true,
            _ => {}
        }
    }
    status
}

/// Push stderr that calls for a rebase before retrying.
pub fn is_non_fast_forward(stderr: &str) -> bool {
    ["non-fast-forward", "[rejected]", "fetch first"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

pub fn commit_message(actor: &str) -> String {
    format!(
        "clarity: {} update ({})",
        actor,
        Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Add any missing [`GITIGNORE_ENTRIES`]; returns whether the file changed.
pub fn ensure_gitignore(dir: &Path) -> Result<bool> {
    let path = dir.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !existing.lines().any(|l| l.trim() == *entry))
        .collect();
    if missing.is_empty() {
        return Ok(false);
    }
    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in missing {
        content.push_str(entry);
        content.push('\n');
    }
    fs::write(&path, content)?;
    Ok(true)
}

/// Whether a `git` executable can be run at all.
pub fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// ============================================
// Async repository handle
// ============================================

#[derive(Debug)]
struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn error_text(&self) -> String {
        let text = self.stderr.trim();
        if text.is_empty() {
            self.stdout.trim().to_string()
        } else {
            text.to_string()
        }
    }
}

/// Git operations on the repository containing a workspace directory.
#[derive(Debug, Clone)]
pub struct GitRepo {
    dir: PathBuf,
}

impl GitRepo {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn run(&self, args: &[&str], limit: Duration) -> Result<GitOutput> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::debug!(args = ?args, dir = %self.dir.display(), "Running git");
        let output = match timeout(limit, cmd.output()).await {
            Ok(output) => output.map_err(|e| Error::Git(format!("failed to run git: {}", e)))?,
            Err(_) => {
                return Err(Error::Git(format!(
                    "git {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    limit.as_secs()
                )))
            }
        };
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn run_ok(&self, args: &[&str], limit: Duration) -> Result<GitOutput> {
        let out = self.run(args, limit).await?;
        if out.success {
            Ok(out)
        } else {
            Err(Error::Git(out.error_text()))
        }
    }

    /// Status probe; never fails, errors land in `last_error`.
    pub async fn status(&self) -> GitStatus {
        match timeout(PROBE_TIMEOUT, self.probe()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => GitStatus {
                last_error: Some(e.to_string()),
                ..Default::default()
            },
            Err(_) => GitStatus {
                last_error: Some(format!("git status timed out after {}s", PROBE_TIMEOUT.as_secs())),
                ..Default::default()
            },
        }
    }

    async fn probe(&self) -> Result<GitStatus> {
        let inside = self
            .run(&["rev-parse", "--is-inside-work-tree"], PROBE_TIMEOUT)
            .await?;
        if !inside.success || inside.stdout.trim() != "true" {
            return Ok(GitStatus::default());
        }
        let out = self
            .run_ok(
                &["status", "--porcelain=v2", "--branch", "--untracked-files=no"],
                PROBE_TIMEOUT,
            )
            .await?;
        let mut status = parse_porcelain_v2(&out.stdout);

        let git_dir = self
            .run_ok(&["rev-parse", "--absolute-git-dir"], PROBE_TIMEOUT)
            .await?;
        let git_dir = PathBuf::from(git_dir.stdout.trim());
        status.in_progress = IN_PROGRESS_MARKERS.iter().any(|m| git_dir.join(m).exists());
        Ok(status)
    }

    async fn require_repo(&self) -> Result<GitStatus> {
        let status = self.probe().await?;
        if !status.is_repo {
            return Err(Error::Git(format!(
                "{} is not inside a git repository",
                self.dir.display()
            )));
        }
        Ok(status)
    }

    /// Workspace files that exist and belong in history.
    fn canonical_paths(&self) -> Vec<&'static str> {
        [SNAPSHOT_FILE, EVENTS_FILE, VIEW_FILE, BLOBS_DIR, ".gitignore"]
            .into_iter()
            .filter(|p| self.dir.join(p).exists())
            .collect()
    }

    /// Stage and commit the canonical files. Returns false when there was
    /// nothing to commit.
    pub async fn commit_canonical(&self, message: &str) -> Result<bool> {
        self.require_repo().await?;
        let paths = self.canonical_paths();
        if paths.is_empty() {
            return Ok(false);
        }

        let mut add = vec!["add", "-A", "--"];
        add.extend(&paths);
        self.run_ok(&add, OP_TIMEOUT).await?;

        let mut diff = vec!["diff", "--cached", "--quiet", "--"];
        diff.extend(&paths);
        if self.run(&diff, OP_TIMEOUT).await?.success {
            tracing::debug!("Nothing to commit");
            return Ok(false);
        }

        let mut commit = vec!["commit", "--no-verify", "-m", message, "--"];
        commit.extend(&paths);
        self.run_ok(&commit, OP_TIMEOUT).await?;
        tracing::info!(dir = %self.dir.display(), msg = message, "Committed workspace");
        Ok(true)
    }

    pub async fn pull_rebase(&self) -> Result<()> {
        let status = self.require_repo().await?;
        if status.unmerged {
            return Err(Error::GitBusy("repository has unmerged paths".to_string()));
        }
        if status.in_progress {
            return Err(Error::GitBusy(
                "a rebase, merge or cherry-pick is in progress".to_string(),
            ));
        }
        if status.dirty_tracked {
            return Err(Error::GitBusy(
                "tracked files have uncommitted changes".to_string(),
            ));
        }
        if status.upstream.is_none() {
            return Err(Error::Git("current branch has no upstream".to_string()));
        }
        self.run_ok(&["pull", "--rebase"], OP_TIMEOUT).await?;
        tracing::info!(dir = %self.dir.display(), "Pulled with rebase");
        Ok(())
    }

    async fn push_once(&self, status: &GitStatus) -> Result<GitOutput> {
        if status.upstream.is_some() {
            return self.run(&["push"], OP_TIMEOUT).await;
        }
        let Some(branch) = status.branch.as_deref() else {
            return Err(Error::Git("cannot push a detached HEAD".to_string()));
        };
        self.run(&["push", "--set-upstream", "origin", branch], OP_TIMEOUT)
            .await
    }

    /// Commit, best-effort pre-pull, push; one rebase-and-retry on a
    /// non-fast-forward rejection.
    pub async fn push(&self, actor: &str) -> Result<()> {
        self.commit_canonical(&commit_message(actor)).await?;
        let status = self.require_repo().await?;
        if status.upstream.is_some() && !status.is_busy() {
            if let Err(e) = self.pull_rebase().await {
                tracing::warn!(error = %e, "Pre-push pull failed, pushing anyway");
            }
        }

        let first = self.push_once(&status).await?;
        if first.success {
            tracing::info!(dir = %self.dir.display(), "Pushed");
            return Ok(());
        }
        if !is_non_fast_forward(&first.stderr) {
            return Err(Error::Git(first.error_text()));
        }

        tracing::info!("Push rejected as non-fast-forward, rebasing and retrying once");
        self.pull_rebase().await?;
        let second = self.push_once(&status).await?;
        if second.success {
            tracing::info!(dir = %self.dir.display(), "Pushed after rebase");
            Ok(())
        } else if is_non_fast_forward(&second.stderr) {
            Err(Error::GitNonFastForward(second.error_text()))
        } else {
            Err(Error::Git(second.error_text()))
        }
    }

    /// Make the workspace a synced repository: ignore transient files,
    /// `git init` when needed, commit, and push to `remote` with tracking.
    pub async fn setup(&self, remote: Option<&str>, actor: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        ensure_gitignore(&self.dir)?;

        if !self.probe().await?.is_repo {
            self.run_ok(&["init"], OP_TIMEOUT).await?;
            tracing::info!(dir = %self.dir.display(), "Initialised git repository");
        }
        self.commit_canonical(&commit_message(actor)).await?;

        if let Some(url) = remote {
            let current = self.run(&["remote", "get-url", "origin"], OP_TIMEOUT).await?;
            if !current.success {
                self.run_ok(&["remote", "add", "origin", url], OP_TIMEOUT)
                    .await?;
            } else if current.stdout.trim() != url {
                self.run_ok(&["remote", "set-url", "origin", url], OP_TIMEOUT)
                    .await?;
            }
            self.run_ok(&["push", "--set-upstream", "origin", "HEAD"], OP_TIMEOUT)
                .await?;
            tracing::info!(remote = url, "Pushed with upstream tracking");
        }
        Ok(())
    }
}

// ============================================
// Blocking facade
// ============================================

/// Blocking git operations for synchronous callers.
///
/// Owns a private current-thread runtime; do not use from inside another
/// runtime.
#[derive(Debug)]
pub struct GitSync {
    repo: GitRepo,
    runtime: tokio::runtime::Runtime,
    last_error: Mutex<Option<String>>,
}

impl GitSync {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Git(format!("failed to create runtime: {}", e)))?;
        Ok(Self {
            repo: GitRepo::new(dir),
            runtime,
            last_error: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        self.repo.dir()
    }

    fn record<T>(&self, result: Result<T>) -> Result<T> {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = result.as_ref().err().map(|e| e.to_string());
        }
        result
    }

    pub fn status(&self) -> GitStatus {
        let mut status = self.runtime.block_on(self.repo.status());
        if status.last_error.is_none() {
            status.last_error = self.last_error.lock().ok().and_then(|e| e.clone());
        }
        status
    }

    pub fn commit(&self, actor: &str) -> Result<bool> {
        self.record(
            self.runtime
                .block_on(self.repo.commit_canonical(&commit_message(actor))),
        )
    }

    pub fn pull(&self) -> Result<()> {
        self.record(self.runtime.block_on(self.repo.pull_rebase()))
    }

    pub fn push(&self, actor: &str) -> Result<()> {
        self.record(self.runtime.block_on(self.repo.push(actor)))
    }

    pub fn setup(&self, remote: Option<&str>, actor: &str) -> Result<()> {
        self.record(self.runtime.block_on(self.repo.setup(remote, actor)))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::Path;
    use std::process::Command;

    pub fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
            .unwrap();
        assert!(
            out.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    /// `git init` with a local identity so commits work anywhere.
    pub fn init_repo(dir: &Path) {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "-q"]);
        git(dir, &["config", "user.name", "Test"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "commit.gpgsign", "false"]);
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::engine::Engine;
    use crate::types::ActorKind;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# branch.oid 2f1c0e9d
# branch.head main
# branch.upstream origin/main
# branch.ab +2 -1
1 .M N... 100644 100644 100644 aaa bbb db.json
? scratch.txt
";

    #[test]
    fn test_parse_porcelain() {
        let status = parse_porcelain_v2(SAMPLE);
        assert!(status.is_repo);
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.upstream.as_deref(), Some("origin/main"));
        assert_eq!((status.ahead, status.behind), (2, 1));
        assert!(status.dirty_tracked);
        assert!(!status.unmerged);
        assert!(status.is_busy());
    }

    #[test]
    fn test_parse_detached_and_unmerged() {
        let status = parse_porcelain_v2(
            "# branch.oid abc\n# branch.head (detached)\nu UU N... 1 2 3 4 a b c events.jsonl\n",
        );
        assert_eq!(status.branch, None);
        assert_eq!(status.upstream, None);
        assert!(status.unmerged);
        assert!(!status.dirty_tracked);
    }

    #[test]
    fn test_non_fast_forward_detection() {
        assert!(is_non_fast_forward(
            " ! [rejected]        main -> main (fetch first)"
        ));
        assert!(is_non_fast_forward("hint: Updates were rejected (non-fast-forward)"));
        assert!(!is_non_fast_forward("fatal: could not read from remote repository"));
    }

    #[test]
    fn test_commit_message() {
        let msg = commit_message("act-1");
        assert!(msg.starts_with("clarity: act-1 update ("));
        assert!(msg.ends_with("Z)"));
    }

    #[test]
    fn test_gitignore_is_idempotent() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".gitignore"), "target").unwrap();
        assert!(ensure_gitignore(dir.path()).unwrap());
        assert!(!ensure_gitignore(dir.path()).unwrap());
        let content = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(content.starts_with("target\n"));
        assert_eq!(content.matches(".db.json.*").count(), 1);
    }

    #[test]
    fn test_status_outside_repo() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        let sync = GitSync::open(dir.path()).unwrap();
        let status = sync.status();
        assert!(!status.is_repo);
        assert_eq!(sync.pull().unwrap_err().kind(), "git_io");
        assert!(sync.status().last_error.is_some());
    }

    fn workspace_with_item(dir: &Path) -> Engine {
        let engine = Engine::open(dir).unwrap();
        engine.create_actor(ActorKind::Human, "Ada", None).unwrap();
        engine.create_project("Home").unwrap();
        engine
    }

    #[test]
    fn test_commit_only_when_changed() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let engine = workspace_with_item(dir.path());
        let sync = GitSync::open(dir.path()).unwrap();

        assert!(sync.commit("act-1").unwrap());
        assert!(!sync.commit("act-1").unwrap());
        let status = sync.status();
        assert!(status.is_repo);
        assert!(!status.dirty_tracked);

        engine.create_project("Work").unwrap();
        assert!(sync.status().dirty_tracked);
        // Pull refuses with dirty tracked files.
        assert_eq!(sync.pull().unwrap_err().kind(), "git_busy");
        assert!(sync.commit("act-1").unwrap());
        let log = git(dir.path(), &["log", "--format=%s"]);
        assert_eq!(log.lines().count(), 2);
        assert!(log.lines().all(|l| l.starts_with("clarity: act-1 update (")));
    }

    #[test]
    fn test_push_integrates_remote_changes() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let remote = tmp.path().join("remote.git");
        std::fs::create_dir_all(&remote).unwrap();
        git(&remote, &["init", "-q", "--bare"]);

        let local = tmp.path().join("local");
        init_repo(&local);
        let engine = workspace_with_item(&local);
        let sync = GitSync::open(&local).unwrap();
        sync.setup(Some(remote.to_str().unwrap()), "act-1").unwrap();
        let status = sync.status();
        assert!(status.upstream.is_some());
        assert!(fs::read_to_string(local.join(".gitignore"))
            .unwrap()
            .contains(".clarity-private/"));

        // Someone else pushes an unrelated file.
        let branch = status.branch.clone().unwrap();
        let other = tmp.path().join("other");
        git(
            tmp.path(),
            &["clone", "-q", "-b", &branch, remote.to_str().unwrap(), "other"],
        );
        git(&other, &["config", "user.name", "Other"]);
        git(&other, &["config", "user.email", "other@example.com"]);
        git(&other, &["config", "commit.gpgsign", "false"]);
        fs::write(other.join("notes.txt"), "hello").unwrap();
        git(&other, &["add", "notes.txt"]);
        git(&other, &["commit", "-q", "-m", "notes"]);
        git(&other, &["push", "-q"]);

        engine.create_project("Work").unwrap();
        sync.push("act-1").unwrap();

        let status = sync.status();
        assert_eq!((status.ahead, status.behind), (0, 0));
        assert!(local.join("notes.txt").exists());
    }
}
