use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;
use tracing::instrument::WithSubscriber;

use daybook_config::AppConfig;
use daybook_journal::{Submitter, submission_queue};
use daybook_runtime::{build_writer, spawn_writer, stop_writer};

use crate::daemon::{RepoLock, lock_path};
use crate::logging::service_logging;

const INTRO: &str = "Type: add <message> or quit";
const UNKNOWN_COMMAND: &str = "Unknown command. Use: add <message> or quit";
const PROMPT: &str = "> ";
const ADD_PREFIX: &str = "add ";

/// Writer in-process, no socket.  Notes are typed straight into the queue.
/// Shares the repo lock with the service so only one writer owns a repo.
pub(crate) async fn run_interactive(config: AppConfig) -> Result<()> {
    let _lock = RepoLock::acquire(&lock_path(&config))?;
    let logging = service_logging(&config)?;
    let dispatch = logging.dispatch.clone();

    let writer = build_writer(&config)?;
    let (submitter, receiver) = submission_queue();
    let writer_task = spawn_writer(writer, receiver, dispatch.clone());

    let stdin = BufReader::new(tokio::io::stdin());
    let session = run_line_session(stdin, std::io::stdout(), &submitter).await;

    let report = stop_writer(submitter, writer_task)
        .with_subscriber(dispatch.clone())
        .await?;
    async { info!(appended = report.appended, failed = report.failed, "session closed") }
        .with_subscriber(dispatch)
        .await;
    session
}

/// Prompts for commands until `q`/`quit`/`exit` (any case) or end of input.
/// Only a lowercase `add ` prefix queues a note.
pub(crate) async fn run_line_session<R, W>(
    input: R,
    mut output: W,
    submitter: &Submitter,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(output, "{INTRO}")?;
    let mut lines = input.lines();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        let Some(line) = lines.next_line().await? else {
            writeln!(output, "\nExiting.")?;
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line.to_ascii_lowercase().as_str(), "q" | "quit" | "exit") {
            break;
        }

        match line.strip_prefix(ADD_PREFIX).map(str::trim) {
            Some("") => {}
            Some(message) => {
                submitter.submit(message)?;
                writeln!(output, "queued.")?;
            }
            None => writeln!(output, "{UNKNOWN_COMMAND}")?,
        }
    }
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_journal::Submission;
    use tempfile::TempDir;

    async fn drain(mut receiver: daybook_journal::SubmissionReceiver) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(Submission::Message(text)) = receiver.dequeue().await {
            messages.push(text);
        }
        messages
    }

    async fn session(input: &[u8]) -> (Vec<String>, String) {
        let (submitter, receiver) = submission_queue();
        let mut output = Vec::new();
        run_line_session(input, &mut output, &submitter).await.unwrap();
        drop(submitter);
        (drain(receiver).await, String::from_utf8(output).unwrap())
    }

    #[tokio::test]
    async fn add_lines_are_queued_until_quit() {
        let (queued, printed) =
            session(b"add bought milk\nhello\nadd  call mum \nQuit\nadd too late\n").await;

        assert_eq!(queued, vec!["bought milk", "call mum"]);
        assert_eq!(
            printed,
            format!("{INTRO}\n> queued.\n> {UNKNOWN_COMMAND}\n> queued.\n> ")
        );
    }

    #[tokio::test]
    async fn add_prefix_is_case_sensitive() {
        let (queued, printed) = session(b"ADD shouted\nAdd title case\nq\n").await;

        assert!(queued.is_empty());
        assert_eq!(
            printed,
            format!("{INTRO}\n> {UNKNOWN_COMMAND}\n> {UNKNOWN_COMMAND}\n> ")
        );
    }

    #[tokio::test]
    async fn end_of_input_ends_session() {
        let (queued, printed) = session(b"add one\n\nadd   \nadd\n").await;

        assert_eq!(queued, vec!["one"]);
        // `add` with nothing after it trims to a line without the prefix.
        assert_eq!(
            printed,
            format!(
                "{INTRO}\n> queued.\n> > {UNKNOWN_COMMAND}\n> {UNKNOWN_COMMAND}\n> \nExiting.\n"
            )
        );
    }

    #[tokio::test]
    async fn interactive_mode_refuses_a_locked_repo() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.journal.repo = dir.path().display().to_string();
        let _held = RepoLock::acquire(&lock_path(&config)).unwrap();

        let err = run_interactive(config).await.unwrap_err();
        assert!(err.to_string().contains("already holds"));
    }
}
