//! Unix socket transport for the daemon.
//!
//! One listener, one spawned [`ConnectionHandler`] per accepted stream.
//! Framing is newline-delimited JSON in both directions. Handlers talk to
//! the daemon actor only through a cloned [`DaemonHandle`]; frames flow back
//! through a bounded outbox the handler registers on connect.
//!
//! ```text
//!   UnixListener ──accept──▶ ConnectionHandler ──commands──▶ daemon actor
//!                                   ▲                            │
//!                                   └──────────outbox────────────┘
//! ```
//!
//! On cancellation the socket file is removed first, then open connections
//! get a short grace period to unregister from the daemon.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept failures are logged and the loop keeps going

mod connection;

pub use connection::{assign_client_id, ConnectionError, ConnectionHandler, OUTBOX_CAPACITY};

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::daemon::DaemonHandle;

/// Socket used when neither config nor environment name one.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/sysstat.sock";

/// How long open connections get to unregister after shutdown starts.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Accepts clients and hands each one to its own task.
pub struct DaemonServer {
    socket_path: PathBuf,
    daemon: DaemonHandle,
    cancel_token: CancellationToken,
}

impl DaemonServer {
    pub fn new(socket_path: impl Into<PathBuf>, daemon: DaemonHandle, cancel_token: CancellationToken) -> Self {
        Self {
            socket_path: socket_path.into(),
            daemon,
            cancel_token,
        }
    }

    pub fn with_default_path(daemon: DaemonHandle, cancel_token: CancellationToken) -> Self {
        Self::new(DEFAULT_SOCKET_PATH, daemon, cancel_token)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serves until the cancellation token fires.
    ///
    /// Fails only if the socket cannot be set up.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = SocketFile::bind(&self.socket_path)?;
        info!(socket = %self.socket_path.display(), "Listening for clients");

        let mut connections = JoinSet::new();
        let mut accepted: u64 = 0;

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,

                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Connection task panicked");
                    }
                }

                result = listener.accept() => match result {
                    Ok((stream, _)) => {
                        connections.spawn(self.handler(stream, accepted).run());
                        accepted += 1;
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }

        drop(listener);
        info!(open = connections.len(), "Server stopping");
        if timeout(DRAIN_TIMEOUT, async { while connections.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!(open = connections.len(), "Connections still open after drain timeout");
            connections.abort_all();
        }

        Ok(())
    }

    fn handler(&self, stream: UnixStream, connection_number: u64) -> ConnectionHandler {
        let (reader, writer) = stream.into_split();
        ConnectionHandler::new(
            reader,
            writer,
            self.daemon.clone(),
            self.cancel_token.clone(),
            connection_number,
        )
    }
}

/// A bound listener that unlinks its socket file when dropped.
struct SocketFile {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketFile {
    /// Binds `path`, replacing a leftover socket nobody is listening on.
    fn bind(path: &Path) -> Result<Self, ServerError> {
        let setup = |error: io::Error| ServerError::SocketSetup {
            path: path.to_path_buf(),
            error: error.to_string(),
        };

        if path.exists() {
            if std::os::unix::net::UnixStream::connect(path).is_ok() {
                return Err(ServerError::InUse(path.to_path_buf()));
            }
            debug!(socket = %path.display(), "Removing stale socket");
            std::fs::remove_file(path).map_err(setup)?;
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(setup)?;
        }

        let listener = UnixListener::bind(path).map_err(setup)?;
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    async fn accept(&self) -> io::Result<(UnixStream, tokio::net::unix::SocketAddr)> {
        self.listener.accept().await
    }
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(socket = %self.path.display(), "Socket removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(socket = %self.path.display(), error = %e, "Failed to remove socket"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to set up socket at {path}: {error}")]
    SocketSetup { path: PathBuf, error: String },

    #[error("Another daemon is already listening on {0}")]
    InUse(PathBuf),
}
