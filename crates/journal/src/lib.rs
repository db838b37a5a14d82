//! Single-writer persistence for the daily journal.
//!
//! Producers hand messages to a [`Submitter`]; exactly one [`JournalWriter`]
//! drains the matching [`SubmissionReceiver`], appends to today's Markdown
//! file and fires the sync script once the file crosses its size threshold.

mod clock;
mod error;
pub mod header;
mod layout;
mod queue;
pub mod trigger;
mod writer;

pub use clock::{Clock, FixedClock, LocalClock};
pub use error::JournalError;
pub use header::{HeaderEnricher, WeatherEnricher, render_header};
pub use layout::{DATE_FORMAT, JournalLayout, TIME_FORMAT};
pub use queue::{QueueClosed, Submission, SubmissionReceiver, Submitter, submission_queue};
pub use trigger::{LaunchOutcome, ScriptLauncher, SyncLauncher, TriggerError};
pub use writer::{
    AppendOutcome, DEFAULT_MAX_FILE_BYTES, JournalWriter, WriterReport, format_entry_line,
};
