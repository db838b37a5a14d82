use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::JournalError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Where day files live inside a journal repository.
#[derive(Debug, Clone)]
pub struct JournalLayout {
    repo: PathBuf,
    entries_dir: PathBuf,
}

impl JournalLayout {
    pub fn new(repo: impl Into<PathBuf>, entries_dirname: &str) -> Self {
        let repo = repo.into();
        let entries_dir = repo.join(entries_dirname);
        Self { repo, entries_dir }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn entries_dir(&self) -> &Path {
        &self.entries_dir
    }

    /// `<repo>/<entries>/<YYYY-MM-DD>.md`, the one file for `date`.
    pub fn entry_path(&self, date: NaiveDate) -> PathBuf {
        self.entries_dir
            .join(format!("{}.md", date.format(DATE_FORMAT)))
    }

    pub fn ensure_dirs(&self) -> Result<(), JournalError> {
        std::fs::create_dir_all(&self.entries_dir).map_err(|source| JournalError::CreateDir {
            path: self.entries_dir.clone(),
            source,
        })
    }
}
