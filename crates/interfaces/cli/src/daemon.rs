use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

use daybook_config::AppConfig;
use daybook_runtime::run_daemon;

use crate::logging::service_logging;

const LOCK_FILE_NAME: &str = "daybook.lock";

pub(crate) fn lock_path(config: &AppConfig) -> PathBuf {
    config.journal.logs_path().join(LOCK_FILE_NAME)
}

/// Held for the life of the service; the OS releases it on exit.
pub(crate) struct RepoLock {
    file: File,
    path: PathBuf,
}

impl RepoLock {
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("create lock file {}", path.display()))?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "another daybook service already holds {}",
                path.display()
            )
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

pub(crate) async fn run_service(config: AppConfig) -> Result<()> {
    let logging = service_logging(&config)?;
    let dispatch = logging.dispatch.clone();
    let _lock = RepoLock::acquire(&lock_path(&config))?;

    let report = run_daemon(config, dispatch.clone(), terminate_signal()).await?;

    async {
        if report.failed > 0 {
            warn!(failed = report.failed, "some notes could not be written");
        }
        info!(appended = report.appended, "bye");
    }
    .with_subscriber(dispatch)
    .await;
    Ok(())
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut sigterm), Ok(mut sigint)) = (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) else {
        warn!("signal handlers unavailable; falling back to ctrl-c");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };
    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
