//! Debounced auto-commit after engine writes

use super::GitSync;
use crate::engine::ChangeNotifier;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;

/// Performs one commit on behalf of an actor. Runs on a blocking thread.
pub type CommitFn = Arc<dyn Fn(&str) -> Result<()> + Send + Sync>;

enum Signal {
    Changed(String),
    Shutdown,
}

/// Coalesces bursts of writes into one commit.
///
/// Every [`notify`](ChangeNotifier::notify) restarts the debounce timer; the
/// commit runs once the workspace has been quiet for the debounce period.
/// Pending work is committed on [`shutdown`](AutoCommitter::shutdown) or drop.
pub struct AutoCommitter {
    tx: mpsc::UnboundedSender<Signal>,
    worker: Mutex<Option<JoinHandle<Option<String>>>>,
}

impl std::fmt::Debug for AutoCommitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoCommitter")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl AutoCommitter {
    pub fn spawn(debounce: Duration, commit: CommitFn) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Git(format!("failed to create runtime: {}", e)))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = std::thread::Builder::new()
            .name("clarity-autocommit".to_string())
            .spawn(move || runtime.block_on(run(rx, debounce, commit)))?;
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Committer for a workspace directory. With `push`, commits are pushed
    /// whenever the branch has an upstream.
    pub fn for_workspace(dir: impl Into<PathBuf>, debounce: Duration, push: bool) -> Result<Self> {
        let dir = dir.into();
        let commit: CommitFn = Arc::new(move |actor: &str| -> Result<()> {
            // A fresh facade per commit keeps its runtime off the async worker.
            let git = GitSync::open(dir.clone())?;
            let status = git.status();
            if !status.is_repo {
                tracing::debug!(dir = %dir.display(), "Not a git repository, skipping auto-commit");
                return Ok(());
            }
            if push && status.upstream.is_some() {
                git.push(actor)
            } else {
                git.commit(actor).map(|_| ())
            }
        });
        Self::spawn(debounce, commit)
    }

    pub fn notify_change(&self, actor_id: &str) {
        if self.tx.send(Signal::Changed(actor_id.to_string())).is_err() {
            tracing::warn!("Auto-commit worker is gone, change not committed");
        }
    }

    /// Flush pending work and stop the worker. Returns the error of the last
    /// commit attempt, if it failed.
    pub fn shutdown(&self) -> Option<String> {
        let handle = self.worker.lock().ok().and_then(|mut w| w.take())?;
        let _ = self.tx.send(Signal::Shutdown);
        match handle.join() {
            Ok(last_error) => last_error,
            Err(_) => Some("auto-commit worker panicked".to_string()),
        }
    }
}

impl ChangeNotifier for AutoCommitter {
    fn notify(&self, actor_id: &str) {
        self.notify_change(actor_id);
    }
}

impl Drop for AutoCommitter {
    fn drop(&mut self) {
        if let Some(err) = self.shutdown() {
            tracing::warn!(error = %err, "Auto-commit failed");
        }
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Signal>,
    debounce: Duration,
    commit: CommitFn,
) -> Option<String> {
    let mut pending: Option<String> = None;
    let mut last_error = None;
    loop {
        let signal = if pending.is_some() {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(signal) => signal,
                Err(_) => {
                    flush(&mut pending, &commit, &mut last_error).await;
                    continue;
                }
            }
        } else {
            rx.recv().await
        };
        match signal {
            Some(Signal::Changed(actor)) => pending = Some(actor),
            Some(Signal::Shutdown) | None => {
                flush(&mut pending, &commit, &mut last_error).await;
                return last_error;
            }
        }
    }
}

async fn flush(pending: &mut Option<String>, commit: &CommitFn, last_error: &mut Option<String>) {
    let Some(actor) = pending.take() else {
        return;
    };
    let commit = commit.clone();
    match tokio::task::spawn_blocking(move || commit(&actor)).await {
        Ok(Ok(())) => *last_error = None,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Auto-commit failed");
            *last_error = Some(e.to_string());
        }
        Err(e) => {
            tracing::error!(error = %e, "Auto-commit task failed");
            *last_error = Some(e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::git_available;
    use super::*;
    use crate::engine::Engine;
    use crate::types::ActorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn counting() -> (Arc<AtomicUsize>, Arc<Mutex<Vec<String>>>, CommitFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let actors = Arc::new(Mutex::new(Vec::new()));
        let (c, a) = (count.clone(), actors.clone());
        let commit: CommitFn = Arc::new(move |actor: &str| -> Result<()> {
            c.fetch_add(1, Ordering::SeqCst);
            a.lock().unwrap().push(actor.to_string());
            Ok(())
        });
        (count, actors, commit)
    }

    #[test]
    fn test_burst_coalesces_into_one_commit() {
        let (count, actors, commit) = counting();
        let committer = AutoCommitter::spawn(Duration::from_secs(60), commit).unwrap();
        for actor in ["act-1", "act-1", "act-2"] {
            committer.notify_change(actor);
        }
        assert_eq!(committer.shutdown(), None);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*actors.lock().unwrap(), vec!["act-2"]);
    }

    #[test]
    fn test_commits_after_quiet_period() {
        let (count, _, commit) = counting();
        let committer = AutoCommitter::spawn(Duration::from_millis(50), commit).unwrap();
        committer.notify_change("act-1");
        std::thread::sleep(Duration::from_millis(500));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        committer.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_without_changes_commits_nothing() {
        let (count, _, commit) = counting();
        let committer = AutoCommitter::spawn(Duration::from_millis(10), commit).unwrap();
        drop(committer);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_is_reported() {
        let commit: CommitFn = Arc::new(|_: &str| -> Result<()> { Err(Error::Git("boom".into())) });
        let committer = AutoCommitter::spawn(Duration::from_secs(60), commit).unwrap();
        committer.notify_change("act-1");
        assert_eq!(committer.shutdown().as_deref(), Some("git error: boom"));
    }

    #[test]
    fn test_engine_writes_reach_git() {
        if !git_available() {
            return;
        }
        let dir = TempDir::new().unwrap();
        init_repo(dir.path());
        let committer = Arc::new(
            AutoCommitter::for_workspace(dir.path(), Duration::from_secs(60), false).unwrap(),
        );
        let engine = Engine::open(dir.path())
            .unwrap()
            .with_notifier(committer.clone());
        engine.create_actor(ActorKind::Human, "Ada", None).unwrap();
        engine.create_project("Home").unwrap();
        assert_eq!(committer.shutdown(), None);

        let log = git(dir.path(), &["log", "--format=%s"]);
        assert_eq!(log.lines().count(), 1);
        assert!(log.starts_with("clarity: act-1 update ("));
    }
}
