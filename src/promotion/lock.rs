// ABOUTME: Per-environment mutual exclusion for promotion runs.
// ABOUTME: In-process single-flight guards plus a noclobber lock file on each environment host.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::remote::{CommandRunner, quote};
use crate::types::EnvironmentName;

/// Single-flight registry keyed by environment name.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLocks {
    held: Arc<Mutex<HashSet<EnvironmentName>>>,
}

/// Held while a run may mutate an environment. Releases on drop.
#[derive(Debug)]
#[must_use = "the environment is released as soon as the guard is dropped"]
pub struct EnvironmentGuard {
    held: Arc<Mutex<HashSet<EnvironmentName>>>,
    name: EnvironmentName,
}

impl EnvironmentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, or `None` if another run holds it.
    pub fn try_acquire(&self, name: &EnvironmentName) -> Option<EnvironmentGuard> {
        let mut held = self.held.lock();
        if !held.insert(name.clone()) {
            return None;
        }
        Some(EnvironmentGuard {
            held: Arc::clone(&self.held),
            name: name.clone(),
        })
    }

    pub fn is_held(&self, name: &EnvironmentName) -> bool {
        self.held.lock().contains(name)
    }
}

impl EnvironmentGuard {
    pub fn environment(&self) -> &EnvironmentName {
        &self.name
    }
}

impl Drop for EnvironmentGuard {
    fn drop(&mut self) {
        self.held.lock().remove(&self.name);
    }
}

/// Lock file directory relative to `$HOME` (XDG state dir).
const STATE_DIR: &str = ".local/state/promoter";

const LOCK_READ_ATTEMPTS: u32 = 3;
const LOCK_READ_RETRY: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "{environment} is locked by {holder} (pid {pid}) since {since}; use --force to break it"
    )]
    Held {
        environment: String,
        holder: String,
        pid: u32,
        since: DateTime<Utc>,
    },

    #[error("deploy lock error on {host}: {reason}")]
    Failed { host: String, reason: String },
}

/// Who holds a deploy lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine running the holder.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub environment: String,
}

impl LockInfo {
    pub fn new(environment: &EnvironmentName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            environment: environment.to_string(),
        }
    }

    /// Older than an hour: the holder most likely died.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }

    /// Lock file path. Left unexpanded so the host's shell resolves `$HOME`.
    pub fn lock_path(app: &str, environment: &EnvironmentName) -> String {
        format!("$HOME/{}/{}-{}.lock", STATE_DIR, app, environment)
    }
}

/// Cross-process deploy lock on an environment host.
pub struct DeployLock<'a> {
    runner: &'a dyn CommandRunner,
    path: String,
    environment: EnvironmentName,
}

impl std::fmt::Debug for DeployLock<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployLock")
            .field("host", &self.runner.host())
            .field("environment", &self.environment)
            .finish()
    }
}

impl<'a> DeployLock<'a> {
    /// Acquire the lock for `app` in `environment` on the runner's host.
    ///
    /// Creation uses noclobber redirection, so two controllers cannot both
    /// succeed. Stale locks are broken with a warning; `force` breaks any lock.
    pub async fn acquire(
        runner: &'a dyn CommandRunner,
        app: &str,
        environment: &EnvironmentName,
        force: bool,
    ) -> Result<Self, LockError> {
        let path = LockInfo::lock_path(app, environment);
        let failed = |reason: String| LockError::Failed {
            host: runner.host().to_string(),
            reason,
        };

        let mkdir = runner
            .run(&format!("mkdir -p \"$HOME/{}\"", STATE_DIR))
            .await
            .map_err(|e| failed(format!("failed to create state directory: {e}")))?;
        if !mkdir.success() {
            return Err(failed(format!(
                "failed to create state directory: {}",
                mkdir.stderr.trim()
            )));
        }

        let info = serde_json::to_string(&LockInfo::new(environment))
            .map_err(|e| failed(format!("failed to serialize lock info: {e}")))?;
        let acquire_cmd = format!("(set -C; echo {} > \"{}\") 2>/dev/null", quote(&info), path);

        let lock = Self {
            runner,
            path,
            environment: environment.clone(),
        };

        let first = runner
            .run(&acquire_cmd)
            .await
            .map_err(|e| failed(format!("failed to acquire lock: {e}")))?;
        if first.success() {
            tracing::debug!(host = runner.host(), environment = %environment, "deploy lock acquired");
            return Ok(lock);
        }

        match lock.existing().await {
            Some(existing) if !force && !existing.is_stale() => {
                return Err(LockError::Held {
                    environment: environment.to_string(),
                    holder: existing.holder,
                    pid: existing.pid,
                    since: existing.started_at,
                });
            }
            Some(existing) => tracing::warn!(
                holder = %existing.holder,
                pid = existing.pid,
                since = %existing.started_at,
                forced = force,
                "breaking deploy lock"
            ),
            None => tracing::warn!("deploy lock unreadable, breaking it"),
        }

        let _ = runner.run(&format!("rm -f \"{}\"", lock.path)).await;
        let retry = runner
            .run(&acquire_cmd)
            .await
            .map_err(|e| failed(format!("failed to acquire lock: {e}")))?;
        if !retry.success() {
            return Err(failed(
                "lock taken by another process while breaking it".to_string(),
            ));
        }
        Ok(lock)
    }

    /// Read the holder's lock info.
    ///
    /// A competing `set -C` creates the file before writing it, so an empty
    /// or partial file is re-read a few times before it counts as corrupt.
    async fn existing(&self) -> Option<LockInfo> {
        for attempt in 0..LOCK_READ_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(LOCK_READ_RETRY).await;
            }
            let output = self
                .runner
                .run(&format!("cat \"{}\"", self.path))
                .await
                .ok()?;
            if !output.success() {
                return None;
            }
            if let Ok(info) = serde_json::from_str(output.stdout.trim()) {
                return Some(info);
            }
        }
        None
    }

    /// Remove the lock file.
    pub async fn release(self) -> Result<(), LockError> {
        let output = self
            .runner
            .run(&format!("rm -f \"{}\"", self.path))
            .await
            .map_err(|e| LockError::Failed {
                host: self.runner.host().to_string(),
                reason: format!("failed to release lock: {e}"),
            })?;
        if !output.success() {
            return Err(LockError::Failed {
                host: self.runner.host().to_string(),
                reason: format!("failed to release lock: {}", output.stderr.trim()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalShell;

    #[test]
    fn second_acquire_of_same_environment_is_refused() {
        let locks = EnvironmentLocks::new();
        let production = EnvironmentName::production();

        let guard = locks.try_acquire(&production).unwrap();
        assert!(locks.try_acquire(&production).is_none());
        assert!(locks.try_acquire(&EnvironmentName::staging()).is_some());

        drop(guard);
        assert!(!locks.is_held(&production));
        assert!(locks.try_acquire(&production).is_some());
    }

    #[test]
    fn lock_path_is_per_app_and_environment() {
        assert_eq!(
            LockInfo::lock_path("shop", &EnvironmentName::production()),
            "$HOME/.local/state/promoter/shop-production.lock"
        );
    }

    #[test]
    fn old_lock_is_stale() {
        let mut info = LockInfo::new(&EnvironmentName::staging());
        assert!(!info.is_stale());
        info.started_at = Utc::now() - chrono::Duration::hours(2);
        assert!(info.is_stale());
    }

    /// Local shell with `$HOME` pointed at a scratch directory.
    struct ScratchHome {
        home: tempfile::TempDir,
    }

    #[async_trait::async_trait]
    impl CommandRunner for ScratchHome {
        fn host(&self) -> &str {
            "localhost"
        }

        async fn run(
            &self,
            command: &str,
        ) -> Result<crate::remote::CommandOutput, crate::remote::RemoteError> {
            let home = self.home.path().to_string_lossy();
            LocalShell
                .run(&format!("export HOME={}; {}", quote(&home), command))
                .await
        }
    }

    fn scratch() -> ScratchHome {
        ScratchHome {
            home: tempfile::tempdir().unwrap(),
        }
    }

    #[tokio::test]
    async fn deploy_lock_excludes_second_holder_until_released() {
        let host = scratch();
        let env = EnvironmentName::production();

        let first = DeployLock::acquire(&host, "shop", &env, false).await.unwrap();
        let err = DeployLock::acquire(&host, "shop", &env, false)
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::Held { .. }));

        first.release().await.unwrap();
        let again = DeployLock::acquire(&host, "shop", &env, false).await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn force_breaks_a_live_lock() {
        let host = scratch();
        let env = EnvironmentName::staging();

        let _held = DeployLock::acquire(&host, "shop", &env, false).await.unwrap();
        let forced = DeployLock::acquire(&host, "shop", &env, true).await.unwrap();
        forced.release().await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_lock_file_is_broken() {
        let host = scratch();
        let env = EnvironmentName::staging();
        let dir = host.home.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("shop-staging.lock"), "garbage").unwrap();

        let lock = DeployLock::acquire(&host, "shop", &env, false).await.unwrap();
        lock.release().await.unwrap();
    }

    /// Reports the lock file empty on the first read, then lets the holder's
    /// write land, like a competing `set -C` caught between create and write.
    struct HalfWrittenLock {
        inner: ScratchHome,
        holder: LockInfo,
        reads: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl CommandRunner for HalfWrittenLock {
        fn host(&self) -> &str {
            self.inner.host()
        }

        async fn run(
            &self,
            command: &str,
        ) -> Result<crate::remote::CommandOutput, crate::remote::RemoteError> {
            if command.starts_with("cat ") {
                let first = {
                    let mut reads = self.reads.lock();
                    *reads += 1;
                    *reads == 1
                };
                if first {
                    let dir = self.inner.home.path().join(STATE_DIR);
                    std::fs::write(
                        dir.join("shop-production.lock"),
                        serde_json::to_string(&self.holder).unwrap(),
                    )
                    .unwrap();
                    return Ok(crate::remote::CommandOutput {
                        exit_code: 0,
                        stdout: String::new(),
                        stderr: String::new(),
                    });
                }
            }
            self.inner.run(command).await
        }
    }

    #[tokio::test]
    async fn lock_being_written_is_not_broken() {
        let env = EnvironmentName::production();
        let inner = scratch();
        let dir = inner.home.path().join(STATE_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("shop-production.lock"), "").unwrap();
        let mut holder = LockInfo::new(&env);
        holder.holder = "other-host".to_string();
        let host = HalfWrittenLock {
            inner,
            holder,
            reads: Mutex::new(0),
        };

        let err = DeployLock::acquire(&host, "shop", &env, false)
            .await
            .unwrap_err();

        match err {
            LockError::Held { holder, .. } => assert_eq!(holder, "other-host"),
            other => panic!("expected Held, got {other:?}"),
        }
        assert_eq!(*host.reads.lock(), 2);
    }
}
