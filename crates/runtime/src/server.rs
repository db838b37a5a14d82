//! Unix socket intake: one command per connection, one reply, then close.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, info, warn};

use daybook_journal::Submitter;

use crate::{Command, MAX_COMMAND_BYTES, Reply};

/// How long `stop` waits for in-flight connection handlers.
const HANDLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Socket files are world read/write; this is not a security boundary.
#[cfg(unix)]
const SOCKET_MODE: u32 = 0o666;

pub struct CommandServer {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    dispatch: Dispatch,
}

impl CommandServer {
    /// Binds `socket_path` (replacing a stale socket file) and starts
    /// accepting.  Must be called from within a tokio runtime.
    pub fn start(
        socket_path: impl AsRef<Path>,
        submitter: Submitter,
        dispatch: Dispatch,
    ) -> Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let listener = tracing::dispatcher::with_default(&dispatch, || bind(&socket_path))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = tokio::spawn(
            accept_loop(listener, submitter, shutdown_rx).with_subscriber(dispatch.clone()),
        );

        Ok(Self {
            socket_path,
            shutdown_tx,
            accept_task,
            dispatch,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stops accepting, waits (bounded) for in-flight handlers and removes
    /// the socket file.
    pub async fn stop(self) {
        let Self {
            socket_path,
            shutdown_tx,
            accept_task,
            dispatch,
        } = self;

        async move {
            let _ = shutdown_tx.send(true);
            if let Err(err) = accept_task.await {
                warn!(?err, "accept loop ended abnormally");
            }
            if let Err(err) = std::fs::remove_file(&socket_path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(?err, path = %socket_path.display(), "failed to remove socket file");
                }
            }
            info!(path = %socket_path.display(), "socket server stopped");
        }
        .with_subscriber(dispatch)
        .await
    }
}

fn bind(socket_path: &Path) -> Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create socket directory {}", parent.display()))?;
        }
    }

    // Leftover from a previous run.  Best-effort; bind reports it if the
    // file is really still there.
    if std::fs::symlink_metadata(socket_path).is_ok() {
        if let Err(err) = std::fs::remove_file(socket_path) {
            warn!(?err, path = %socket_path.display(), "failed to remove stale socket");
        }
    }

    let listener = UnixListener::bind(socket_path)
        .with_context(|| format!("bind socket {}", socket_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) =
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(SOCKET_MODE))
        {
            warn!(?err, path = %socket_path.display(), "failed to set socket permissions");
        }
    }

    info!(path = %socket_path.display(), "socket server listening");
    Ok(listener)
}

async fn accept_loop(
    listener: UnixListener,
    submitter: Submitter,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            accept = listener.accept() => {
                match accept {
                    Ok((stream, _)) => {
                        let submitter = submitter.clone();
                        handlers.spawn(
                            async move {
                                if let Err(err) = handle_connection(stream, submitter).await {
                                    warn!(?err, "connection handler failed");
                                }
                            }
                            .with_current_subscriber(),
                        );
                    }
                    Err(err) => warn!(?err, "accept failed"),
                }
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(err) = joined {
                    warn!(?err, "connection handler panicked");
                }
            }
        }
    }

    drop(listener);
    let in_flight = handlers.len();
    let drained = tokio::time::timeout(HANDLER_DRAIN_TIMEOUT, async {
        while handlers.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            in_flight,
            remaining = handlers.len(),
            "connection handlers still running after stop; detaching"
        );
        handlers.detach_all();
    }
}

async fn handle_connection(mut stream: UnixStream, submitter: Submitter) -> Result<()> {
    let mut buf = vec![0u8; MAX_COMMAND_BYTES];
    let read = stream.read(&mut buf).await?;
    if read == 0 {
        debug!("empty connection closed");
        return Ok(());
    }

    let reply = match Command::decode(&buf[..read]) {
        Command::Add(message) => {
            let bytes = message.len();
            match submitter.submit(message) {
                Ok(()) => {
                    debug!(bytes, "note queued");
                    Reply::queued()
                }
                Err(err) => {
                    warn!(?err, "writer unavailable; rejecting note");
                    Reply::rejected(err.to_string())
                }
            }
        }
        command @ (Command::Ping | Command::Invalid) => {
            debug!(?command, "rejecting command");
            Reply::invalid()
        }
    };

    stream.write_all(reply.to_line()?.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_journal::{Submission, SubmissionReceiver, submission_queue};
    use tempfile::TempDir;

    fn start_server(dir: &TempDir) -> (CommandServer, SubmissionReceiver) {
        let (submitter, receiver) = submission_queue();
        let server =
            CommandServer::start(dir.path().join("daybook.sock"), submitter, Dispatch::none())
                .unwrap();
        (server, receiver)
    }

    async fn exchange(path: &Path, raw: &[u8]) -> String {
        let mut stream = UnixStream::connect(path).await.unwrap();
        stream.write_all(raw).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    /// Stops the server and returns everything it queued.
    async fn stop_and_drain(
        server: CommandServer,
        mut receiver: SubmissionReceiver,
    ) -> Vec<String> {
        server.stop().await;
        let mut messages = Vec::new();
        while let Some(item) = receiver.dequeue().await {
            match item {
                Submission::Message(text) => messages.push(text),
                Submission::Shutdown => panic!("server must never send shutdown"),
            }
        }
        messages
    }

    #[tokio::test]
    async fn structured_add_is_queued_and_acknowledged() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);

        let raw = br#"{"cmd":"add","msg":"bought milk"}"#;
        let response = exchange(server.socket_path(), raw).await;
        assert_eq!(response, "{\"ok\":true,\"message\":\"queued\"}\n");

        assert_eq!(stop_and_drain(server, receiver).await, vec!["bought milk"]);
    }

    #[tokio::test]
    async fn legacy_add_queues_the_same_message() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);

        let response = exchange(server.socket_path(), b"ADD bought milk\n").await;
        let reply: Reply = serde_json::from_str(response.trim()).unwrap();
        assert!(reply.ok);

        assert_eq!(stop_and_drain(server, receiver).await, vec!["bought milk"]);
    }

    #[tokio::test]
    async fn ping_and_garbage_are_rejected_without_submission() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);

        for raw in [
            br#"{"cmd":"ping"}"#.as_slice(),
            br#"{"cmd":"add","msg":""}"#.as_slice(),
            b"hello there".as_slice(),
        ] {
            let response = exchange(server.socket_path(), raw).await;
            assert_eq!(response, "{\"ok\":false,\"error\":\"invalid command\"}\n");
        }

        assert!(stop_and_drain(server, receiver).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_utf8_is_rejected_and_never_queued() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);

        let response = exchange(server.socket_path(), b"ADD caf\xff latte").await;
        assert_eq!(response, "{\"ok\":false,\"error\":\"invalid command\"}\n");

        assert!(stop_and_drain(server, receiver).await.is_empty());
    }

    #[tokio::test]
    async fn empty_connection_closes_silently() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);

        let response = exchange(server.socket_path(), b"").await;
        assert!(response.is_empty());

        assert!(stop_and_drain(server, receiver).await.is_empty());
    }

    #[tokio::test]
    async fn stale_socket_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("daybook.sock");
        std::fs::write(&path, "left over from a crash").unwrap();

        let (server, receiver) = start_server(&dir);
        let response = exchange(&path, b"ADD still works").await;
        assert!(response.contains("\"ok\":true"));

        assert_eq!(stop_and_drain(server, receiver).await, vec!["still works"]);
    }

    #[tokio::test]
    async fn socket_is_world_writable_and_removed_on_stop() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);
        let path = server.socket_path().to_path_buf();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o666);

        stop_and_drain(server, receiver).await;
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_clients_are_all_queued() {
        let dir = TempDir::new().unwrap();
        let (server, receiver) = start_server(&dir);
        let path = server.socket_path().to_path_buf();

        let clients = (0..50).map(|i| {
            let path = path.clone();
            async move {
                let raw = serde_json::to_vec(&crate::Request::add(format!("note {i}"))).unwrap();
                exchange(&path, &raw).await
            }
        });
        let responses = futures::future::join_all(clients).await;
        assert!(responses.iter().all(|r| r.contains("\"ok\":true")));

        let mut messages = stop_and_drain(server, receiver).await;
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 50);
    }
}
