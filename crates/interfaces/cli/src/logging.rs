use std::fs;

use anyhow::{Context, Result};
use file_rotate::compression::Compression;
use file_rotate::suffix::AppendCount;
use file_rotate::{ContentLimit, FileRotate};
use tracing::Dispatch;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

use daybook_config::AppConfig;

/// Owns the log dispatch and the appender worker.  Dropping it flushes
/// pending file output.
pub(crate) struct Logging {
    pub(crate) dispatch: Dispatch,
    _guard: WorkerGuard,
}

/// `<repo>/logs/app.log`, rotated by size into `app.log.1` .. `app.log.N`,
/// plus a stderr layer.
pub(crate) fn service_logging(config: &AppConfig) -> Result<Logging> {
    let log_dir = config.journal.logs_path();
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("create log directory {}", log_dir.display()))?;

    let rotating = FileRotate::new(
        log_dir.join(&config.telemetry.log_file_name),
        AppendCount::new(config.telemetry.max_log_files.max(1)),
        ContentLimit::BytesSurpassed(config.telemetry.max_log_bytes.max(1)),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let (writer, guard) = tracing_appender::non_blocking(rotating);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(&config.telemetry.log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    Ok(Logging {
        dispatch: Dispatch::new(subscriber),
        _guard: guard,
    })
}

/// Plain stderr logging for one-shot client commands.
pub(crate) fn init_client_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .init();
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
