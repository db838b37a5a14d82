//! The single journal writer.
//!
//! One item at a time: resolve today's file, make sure it has a header,
//! append `- HH:MM <message>`, then stat the file and fire the sync script if
//! it is at or above the size threshold.  A failure on one item is logged and
//! the loop moves on; only [`Submission::Shutdown`] (or every producer going
//! away) ends it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

use crate::{
    Clock, HeaderEnricher, JournalError, JournalLayout, LaunchOutcome, LocalClock, Submission,
    SubmissionReceiver, SyncLauncher, TIME_FORMAT, render_header,
};

/// 10 KiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024;

/// Counters returned when the writer loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub appended: u64,
    pub failed: u64,
    /// Launch attempts, whatever their outcome.
    pub triggers: u64,
}

/// What happened to one processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub path: PathBuf,
    pub header_written: bool,
    /// Post-append size; `None` if the file vanished before the stat.
    pub size: Option<u64>,
    pub triggered: bool,
}

pub fn format_entry_line(time: NaiveTime, message: &str) -> String {
    format!("- {} {}\n", time.format(TIME_FORMAT), message)
}

pub struct JournalWriter {
    layout: JournalLayout,
    max_file_bytes: u64,
    clock: Arc<dyn Clock>,
    enricher: Option<Arc<dyn HeaderEnricher>>,
    launcher: Arc<dyn SyncLauncher>,
    report: WriterReport,
}

impl JournalWriter {
    pub fn new(layout: JournalLayout, launcher: Arc<dyn SyncLauncher>) -> Self {
        Self {
            layout,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            clock: Arc::new(LocalClock),
            enricher: None,
            launcher,
            report: WriterReport::default(),
        }
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn HeaderEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn layout(&self) -> &JournalLayout {
        &self.layout
    }

    pub fn report(&self) -> WriterReport {
        self.report
    }

    pub fn today_path(&self) -> PathBuf {
        self.layout.entry_path(self.clock.now().date())
    }

    /// Drains the queue until a shutdown item arrives or every producer is
    /// dropped.
    pub async fn run(mut self, mut queue: SubmissionReceiver) -> WriterReport {
        info!(repo = %self.layout.repo().display(), "writer loop started");
        loop {
            let message = match queue.dequeue().await {
                Some(Submission::Message(message)) => message,
                Some(Submission::Shutdown) => {
                    info!("shutdown signal received");
                    break;
                }
                None => {
                    info!("all submitters dropped; stopping writer");
                    break;
                }
            };

            if let Err(err) = self.process(&message).await {
                self.report.failed += 1;
                error!(?err, bytes = message.len(), "failed to process message");
            }
        }
        info!(
            appended = self.report.appended,
            failed = self.report.failed,
            triggers = self.report.triggers,
            "writer loop exited"
        );
        self.report
    }

    pub async fn process(&mut self, message: &str) -> Result<AppendOutcome, JournalError> {
        let now = self.clock.now();
        let path = self.layout.entry_path(now.date());
        self.layout.ensure_dirs()?;

        // Header check and write are one critical section: this task is the
        // only writer of the entries directory.
        let header_written = self.ensure_header(&path, now.date()).await?;
        append_line(&path, &format_entry_line(now.time(), message)).await?;
        self.report.appended += 1;

        // The note is on disk; from here on nothing may fail the item.
        let size = file_size(&path).await;
        let triggered = match size {
            Some(size) => self.maybe_trigger(&path, size),
            None => false,
        };

        Ok(AppendOutcome {
            path,
            header_written,
            size,
            triggered,
        })
    }

    /// Writes the header when `path` is missing or empty.  Returns whether a
    /// header was written.
    pub async fn ensure_header(&self, path: &Path, date: NaiveDate) -> Result<bool, JournalError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => return Ok(false),
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(JournalError::Stat {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        let enrichment = match &self.enricher {
            Some(enricher) => match enricher.enrichment_line().await {
                Ok(line) => Some(line),
                Err(err) => {
                    warn!(
                        ?err,
                        path = %path.display(),
                        "header enrichment failed; writing plain header"
                    );
                    None
                }
            },
            None => None,
        };

        let header = render_header(date, enrichment.as_deref());
        write_header(path, &header).await?;
        info!(path = %path.display(), "created header");
        Ok(true)
    }

    fn maybe_trigger(&mut self, path: &Path, size: u64) -> bool {
        if size < self.max_file_bytes {
            return false;
        }

        info!(
            path = %path.display(),
            size,
            threshold = self.max_file_bytes,
            "journal file at size threshold; launching sync"
        );
        self.report.triggers += 1;
        match self.launcher.launch() {
            Ok(LaunchOutcome::Spawned { pid }) => {
                info!(?pid, "sync script spawned");
            }
            Ok(LaunchOutcome::ScriptMissing { script }) => {
                warn!(script = %script.display(), "sync script not found; skipping sync");
            }
            Err(err) => {
                error!(?err, "failed to launch sync script");
            }
        }
        true
    }
}

async fn write_header(path: &Path, header: &str) -> Result<(), JournalError> {
    let map_err = |source| JournalError::Header {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(map_err)?;
    file.write_all(header.as_bytes()).await.map_err(map_err)?;
    file.flush().await.map_err(map_err)?;
    file.sync_all().await.map_err(map_err)?;
    Ok(())
}

async fn append_line(path: &Path, line: &str) -> Result<(), JournalError> {
    let map_err = |source| JournalError::Append {
        path: path.to_path_buf(),
        source,
    };
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(map_err)?;
    file.write_all(line.as_bytes()).await.map_err(map_err)?;
    // Flush and fsync so the note survives a crash right after the append.
    file.flush().await.map_err(map_err)?;
    file.sync_data().await.map_err(map_err)?;
    info!(bytes = line.len(), "appended note");
    Ok(())
}

/// `None` when the file cannot be measured; the size check is skipped.
async fn file_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Some(meta.len()),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(
                ?err,
                path = %path.display(),
                "could not stat journal file; skipping size check"
            );
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
