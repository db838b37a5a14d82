use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::warn;

use crate::{MAX_COMMAND_BYTES, Reply, Request};

#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Retries until the daemon accepts a connection.  Used right after
    /// spawning a service.
    pub async fn connect_with_backoff(&self, max_attempts: usize) -> Result<()> {
        let mut delay = Duration::from_millis(50);
        let attempts = max_attempts.max(1);
        for attempt in 0..attempts {
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => return Ok(()),
                Err(err) if attempt + 1 == attempts => return Err(err.into()),
                Err(err) => {
                    warn!(attempt, ?err, "daemon connect failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(1));
                }
            }
        }
        Ok(())
    }

    /// Sends one request and returns the raw reply line, trimmed.
    pub async fn send(&self, request: &Request) -> Result<String> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;

        let mut payload = serde_json::to_string(request)?;
        payload.push('\n');
        stream.write_all(payload.as_bytes()).await?;
        stream.flush().await?;

        let mut response = String::new();
        (&mut stream)
            .take(MAX_COMMAND_BYTES as u64)
            .read_to_string(&mut response)
            .await?;
        Ok(response.trim().to_string())
    }

    pub async fn add(&self, message: impl Into<String>) -> Result<Reply> {
        self.request(&Request::add(message)).await
    }

    pub async fn ping(&self) -> Result<Reply> {
        self.request(&Request::ping()).await
    }

    async fn request(&self, request: &Request) -> Result<Reply> {
        let raw = self.send(request).await?;
        serde_json::from_str(&raw).with_context(|| format!("unexpected reply: {raw}"))
    }
}

/// One-line diagnostic for a failed client exchange.
pub fn describe_client_error(err: &anyhow::Error) -> String {
    match err.downcast_ref::<io::Error>().map(io::Error::kind) {
        Some(io::ErrorKind::NotFound) => {
            "Error: socket not found; is the service running?".to_string()
        }
        Some(io::ErrorKind::ConnectionRefused) => {
            "Error: connection refused; service inactive?".to_string()
        }
        _ => format!("Error: {err}"),
    }
}
