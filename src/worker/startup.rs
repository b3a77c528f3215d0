//! Best-effort dependency installation at worker startup.
//!
//! Runs once per process before the job loop. Every failure path ends in
//! "continue without requirements": a worker that cannot install its
//! dependencies still serves jobs, and the missing dependency surfaces as a
//! per-job error instead.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::config::WorkerConfig;
use crate::core::AppResult;
use crate::infra::store::{ContextStore, StoreExt, StoreKeys};

/// Cached dependency manifest written out-of-band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsManifest {
    /// Manifest body, one requirement per line.
    pub content: String,
    /// Content hash used for install idempotency.
    pub hash: String,
}

/// Installs a manifest into the worker's environment.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Install every requirement in `manifest`.
    async fn install(&self, manifest: &RequirementsManifest) -> AppResult<()>;
}

/// Installs by running an external tool with the manifest file as its last
/// argument, e.g. `pip install --quiet -r <file>`.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandInstaller {
    /// Run `program args... <manifest-file>`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Write manifest files under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    async fn install(&self, manifest: &RequirementsManifest) -> AppResult<()> {
        let file = self
            .scratch_dir
            .join(format!("requirements-{}.txt", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&file, manifest.content.as_bytes()).await?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&file)
            .kill_on_drop(true)
            .output()
            .await;
        let _ = tokio::fs::remove_file(&file).await;
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// What the startup step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No manifest is cached.
    NoManifest,
    /// The manifest is empty or whitespace.
    EmptyManifest,
    /// The marker shows this manifest hash is already installed.
    AlreadyInstalled,
    /// The store stayed unavailable for every attempt.
    StoreUnavailable,
    /// The installer ran successfully.
    Installed,
    /// The installer failed; the worker continues without it.
    InstallFailed,
}

/// Read the cached manifest and install it, never blocking forever.
///
/// Transient store errors are retried `startup_max_attempts` times with
/// exponential backoff starting at `startup_backoff_ms`. The install itself is
/// abandoned after `install_timeout_seconds`; a `CommandInstaller` child is
/// killed when that happens.
pub async fn install_requirements(
    store: &dyn ContextStore,
    keys: &StoreKeys,
    config: &WorkerConfig,
    installer: &dyn DependencyInstaller,
) -> InstallOutcome {
    let key = keys.requirements();
    let attempts = config.startup_max_attempts.max(1);
    let mut backoff = config.startup_backoff();

    let mut attempt = 0;
    let manifest = loop {
        attempt += 1;
        match store.get_json::<RequirementsManifest>(&key) {
            Ok(manifest) => break manifest,
            Err(e) if e.is_transient() && attempt < attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "requirements manifest unavailable; retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(e) => {
                tracing::warn!(error = %e, "continuing without requirements");
                return InstallOutcome::StoreUnavailable;
            }
        }
    };

    let Some(manifest) = manifest else {
        return InstallOutcome::NoManifest;
    };
    if manifest.content.trim().is_empty() {
        tracing::debug!("requirements manifest is empty");
        return InstallOutcome::EmptyManifest;
    }
    if let Some(marker) = &config.requirements_marker {
        if installed_hash(marker).await.as_deref() == Some(manifest.hash.as_str()) {
            tracing::debug!(hash = %manifest.hash, "requirements already installed");
            return InstallOutcome::AlreadyInstalled;
        }
    }

    let budget = config.install_timeout();
    match tokio::time::timeout(budget, installer.install(&manifest)).await {
        Ok(Ok(())) => {
            tracing::info!(hash = %manifest.hash, "requirements installed");
            if let Some(marker) = &config.requirements_marker {
                if let Err(e) = tokio::fs::write(marker, manifest.hash.as_bytes()).await {
                    tracing::warn!(marker = %marker.display(), error = %e, "failed to record install marker");
                }
            }
            InstallOutcome::Installed
        }
        Ok(Err(e)) => {
            tracing::error!(hash = %manifest.hash, error = %e, "requirements install failed");
            InstallOutcome::InstallFailed
        }
        Err(_) => {
            tracing::error!(
                hash = %manifest.hash,
                timeout_secs = budget.as_secs(),
                "requirements install timed out; continuing without it"
            );
            InstallOutcome::InstallFailed
        }
    }
}

async fn installed_hash(marker: &Path) -> Option<String> {
    tokio::fs::read_to_string(marker)
        .await
        .ok()
        .map(|s| s.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::core::StoreError;
    use crate::infra::store::MemoryStore;

    #[derive(Default)]
    struct CountingInstaller {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DependencyInstaller for CountingInstaller {
        async fn install(&self, _manifest: &RequirementsManifest) -> AppResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("resolver error");
            }
            Ok(())
        }
    }

    struct HangingInstaller;

    #[async_trait]
    impl DependencyInstaller for HangingInstaller {
        async fn install(&self, _manifest: &RequirementsManifest) -> AppResult<()> {
            std::future::pending().await
        }
    }

    struct DownStore {
        reads: AtomicUsize,
    }

    impl ContextStore for DownStore {
        fn put(&self, _: &str, _: &[u8], _: Option<Duration>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        fn get(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        }
        fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    fn manifest(content: &str, hash: &str) -> RequirementsManifest {
        RequirementsManifest {
            content: content.into(),
            hash: hash.into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_store_gives_up_after_bounded_attempts() {
        let store = DownStore {
            reads: AtomicUsize::new(0),
        };
        let installer = CountingInstaller::default();
        let cfg = WorkerConfig::default().with_startup_retry(3, 100);
        let outcome =
            install_requirements(&store, &StoreKeys::default(), &cfg, &installer).await;
        assert_eq!(outcome, InstallOutcome::StoreUnavailable);
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
        assert_eq!(installer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitespace_manifest_is_skipped() {
        let store = MemoryStore::new();
        let keys = StoreKeys::default();
        store
            .put_json(&keys.requirements(), &manifest("  \n\t", "h0"), None)
            .unwrap();
        let installer = CountingInstaller::default();
        let outcome =
            install_requirements(&store, &keys, &WorkerConfig::default(), &installer).await;
        assert_eq!(outcome, InstallOutcome::EmptyManifest);
        assert_eq!(installer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_failure_is_not_fatal() {
        let store = MemoryStore::new();
        let keys = StoreKeys::default();
        store
            .put_json(&keys.requirements(), &manifest("requests==2.31\n", "h1"), None)
            .unwrap();
        let installer = CountingInstaller {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let outcome =
            install_requirements(&store, &keys, &WorkerConfig::default(), &installer).await;
        assert_eq!(outcome, InstallOutcome::InstallFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_installer_is_abandoned_after_budget() {
        let store = MemoryStore::new();
        let keys = StoreKeys::default();
        store
            .put_json(&keys.requirements(), &manifest("torch\n", "h3"), None)
            .unwrap();
        let cfg = WorkerConfig::default().with_install_timeout(30);

        let started = tokio::time::Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_secs(3600),
            install_requirements(&store, &keys, &cfg, &HangingInstaller),
        )
        .await
        .expect("install step must give up on its own");

        assert_eq!(outcome, InstallOutcome::InstallFailed);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(30) && waited < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_marker_makes_install_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let keys = StoreKeys::default();
        store
            .put_json(&keys.requirements(), &manifest("numpy\n", "h2"), None)
            .unwrap();
        let cfg = WorkerConfig::default().with_requirements_marker(dir.path().join("installed"));
        let installer = CountingInstaller::default();

        let first = install_requirements(store.as_ref(), &keys, &cfg, &installer).await;
        let second = install_requirements(store.as_ref(), &keys, &cfg, &installer).await;
        assert_eq!(first, InstallOutcome::Installed);
        assert_eq!(second, InstallOutcome::AlreadyInstalled);
        assert_eq!(installer.calls.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_installer_reports_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let installer = CommandInstaller::new("sh", ["-c", "exit 1", "sh"])
            .with_scratch_dir(dir.path());
        assert!(installer.install(&manifest("x", "h")).await.is_err());

        let ok = CommandInstaller::new("true", Vec::<String>::new()).with_scratch_dir(dir.path());
        assert!(ok.install(&manifest("x", "h")).await.is_ok());
    }
}
