//! Unbounded multi-producer / single-consumer hand-off between intake and the
//! writer.  No backpressure: `submit` only ever allocates.

use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Message(String),
    /// Stop the consumer after the item currently being processed.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("submission queue is closed")]
pub struct QueueClosed;

/// Producer handle.  Cheap to clone; one per connection handler is fine.
#[derive(Debug, Clone)]
pub struct Submitter {
    tx: mpsc::UnboundedSender<Submission>,
}

impl Submitter {
    pub fn submit(&self, text: impl Into<String>) -> Result<(), QueueClosed> {
        self.tx
            .send(Submission::Message(text.into()))
            .map_err(|_| QueueClosed)
    }

    pub fn shutdown(&self) -> Result<(), QueueClosed> {
        self.tx.send(Submission::Shutdown).map_err(|_| QueueClosed)
    }
}

/// Consumer side.  Not `Clone`: there is exactly one writer.
#[derive(Debug)]
pub struct SubmissionReceiver {
    rx: mpsc::UnboundedReceiver<Submission>,
}

impl SubmissionReceiver {
    /// Waits for the next item.  `None` once every [`Submitter`] is gone and
    /// the queue is drained.
    pub async fn dequeue(&mut self) -> Option<Submission> {
        self.rx.recv().await
    }
}

pub fn submission_queue() -> (Submitter, SubmissionReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Submitter { tx }, SubmissionReceiver { rx })
}
