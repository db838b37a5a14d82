use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, info, warn};

use daybook_config::AppConfig;
use daybook_journal::{
    JournalLayout, JournalWriter, ScriptLauncher, SubmissionReceiver, Submitter, WeatherEnricher,
    WriterReport, submission_queue,
};

use crate::CommandServer;

/// Upper bound on waiting for the writer to drain after the shutdown item.
pub const WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the single journal writer for `config`.  The repository path is
/// made absolute so the sync script runs from the right directory no matter
/// where the process was started.
pub fn build_writer(config: &AppConfig) -> Result<JournalWriter> {
    let repo = std::path::absolute(config.journal.repo_path())
        .with_context(|| format!("resolve repository path {}", config.journal.repo))?;
    let layout = JournalLayout::new(&repo, &config.journal.entries_dirname);
    layout.ensure_dirs()?;

    let launcher =
        ScriptLauncher::new(&repo, &config.sync.script, config.sync.interpreter.clone());
    let mut writer = JournalWriter::new(layout, Arc::new(launcher))
        .with_max_file_bytes(config.journal.max_file_bytes);

    if config.journal.with_weather {
        let enricher = WeatherEnricher::new(
            &config.weather.location,
            Duration::from_secs(config.weather.timeout_secs),
        )?;
        writer = writer.with_enricher(Arc::new(enricher));
    }
    Ok(writer)
}

/// Runs the writer on its own task with `dispatch` as its subscriber.
pub fn spawn_writer(
    writer: JournalWriter,
    receiver: SubmissionReceiver,
    dispatch: Dispatch,
) -> JoinHandle<WriterReport> {
    tokio::spawn(writer.run(receiver).with_subscriber(dispatch))
}

/// Sends the shutdown item and waits (bounded) for the writer to finish.
pub async fn stop_writer(
    submitter: Submitter,
    writer_task: JoinHandle<WriterReport>,
) -> Result<WriterReport> {
    if submitter.shutdown().is_err() {
        warn!("writer already stopped before shutdown item was sent");
    }
    drop(submitter);

    tokio::time::timeout(WRITER_SHUTDOWN_TIMEOUT, writer_task)
        .await
        .context("journal writer did not finish within the shutdown timeout")?
        .context("journal writer task failed")
}

/// The service: writer task plus socket server, until `shutdown` resolves.
///
/// Shutdown order is server first (no new submissions), then the shutdown
/// item, then the bounded writer join.
pub async fn run_daemon(
    config: AppConfig,
    dispatch: Dispatch,
    shutdown: impl Future<Output = ()>,
) -> Result<WriterReport> {
    serve_until(config, dispatch.clone(), shutdown)
        .with_subscriber(dispatch)
        .await
}

async fn serve_until(
    config: AppConfig,
    task_dispatch: Dispatch,
    shutdown: impl Future<Output = ()>,
) -> Result<WriterReport> {
    let writer = build_writer(&config)?;
    let (submitter, receiver) = submission_queue();
    let writer_task = spawn_writer(writer, receiver, task_dispatch.clone());

    let server = match CommandServer::start(
        &config.daemon.socket_path,
        submitter.clone(),
        task_dispatch,
    ) {
        Ok(server) => server,
        Err(err) => {
            // Let the writer exit cleanly before reporting.
            let _ = stop_writer(submitter, writer_task).await;
            return Err(err);
        }
    };

    info!(
        socket = %config.daemon.socket_path,
        repo = %config.journal.repo,
        "daybook service started"
    );
    shutdown.await;
    info!("shutdown requested");

    server.stop().await;
    let report = stop_writer(submitter, writer_task).await?;
    info!(
        appended = report.appended,
        failed = report.failed,
        triggers = report.triggers,
        "daybook service stopped"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DaemonClient;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    fn test_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.journal.repo = dir.path().join("repo").display().to_string();
        config.daemon.socket_path = dir.path().join("daybook.sock").display().to_string();
        config
    }

    fn journal_lines(dir: &TempDir) -> Vec<String> {
        let entries = dir.path().join("repo").join("entries");
        let mut lines = Vec::new();
        for entry in std::fs::read_dir(entries).unwrap() {
            let content = std::fs::read_to_string(entry.unwrap().path()).unwrap();
            lines.extend(
                content
                    .lines()
                    .filter(|line| line.starts_with("- "))
                    .map(str::to_string),
            );
        }
        lines
    }

    #[tokio::test]
    async fn build_writer_creates_entries_directory() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let writer = build_writer(&config).unwrap();
        assert!(writer.layout().entries_dir().is_dir());
        assert!(writer.layout().repo().is_absolute());
    }

    #[tokio::test]
    async fn stop_writer_returns_report() {
        let dir = TempDir::new().unwrap();
        let writer = build_writer(&test_config(&dir)).unwrap();
        let (submitter, receiver) = submission_queue();
        let task = spawn_writer(writer, receiver, Dispatch::none());

        submitter.submit("first").unwrap();
        submitter.submit("second").unwrap();
        let report = stop_writer(submitter, task).await.unwrap();

        assert_eq!(report.appended, 2);
        assert_eq!(journal_lines(&dir).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clients_land_exactly_once() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let client = DaemonClient::new(&config.daemon.socket_path);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let daemon = tokio::spawn(run_daemon(config, Dispatch::none(), async move {
            let _ = stop_rx.await;
        }));
        client.connect_with_backoff(50).await.unwrap();

        let adds = (0..50).map(|i| {
            let client = client.clone();
            async move { client.add(format!("note {i}")).await }
        });
        let replies = futures::future::join_all(adds).await;
        assert!(replies.iter().all(|r| r.as_ref().is_ok_and(|reply| reply.ok)));

        stop_tx.send(()).unwrap();
        let report = daemon.await.unwrap().unwrap();
        assert_eq!(report.appended, 50);

        let mut lines = journal_lines(&dir);
        assert_eq!(lines.len(), 50);
        lines.sort();
        lines.dedup();
        assert_eq!(lines.len(), 50);
        assert!(!dir.path().join("daybook.sock").exists());
    }

    #[tokio::test]
    async fn ping_is_rejected_by_running_service() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let client = DaemonClient::new(&config.daemon.socket_path);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let daemon = tokio::spawn(run_daemon(config, Dispatch::none(), async move {
            let _ = stop_rx.await;
        }));
        client.connect_with_backoff(50).await.unwrap();

        let reply = client.ping().await.unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.error.as_deref(), Some("invalid command"));

        stop_tx.send(()).unwrap();
        let report = daemon.await.unwrap().unwrap();
        assert_eq!(report.appended, 0);
    }
}
