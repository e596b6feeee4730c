//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs protocol version negotiation
//! - Registers an outbox with the daemon for frames and shape notifications
//! - Routes queries and subscriptions to the daemon
//! - Tells the daemon when the peer goes away
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sysstat_core::ClientId;
use sysstat_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};

use crate::daemon::DaemonHandle;

/// Maximum message size (1 MB)
const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Time allowed for the first message
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Messages the daemon may queue for one client before it is considered
/// too slow and dropped.
pub const OUTBOX_CAPACITY: usize = 256;

/// Connection handler for a single client.
pub struct ConnectionHandler {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: BufWriter<OwnedWriteHalf>,
    daemon: DaemonHandle,
    cancel: CancellationToken,

    /// Assigned after handshake
    client_id: Option<ClientId>,

    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        daemon: DaemonHandle,
        cancel: CancellationToken,
        connection_number: u64,
    ) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer: BufWriter::new(writer),
            daemon,
            cancel,
            client_id: None,
            connection_number,
        }
    }

    /// Runs the connection until the peer disconnects or the server stops.
    ///
    /// Returns the assigned client id, if the handshake succeeded.
    pub async fn run(mut self) -> Option<ClientId> {
        debug!(connection = self.connection_number, "New client connected");

        let client_id = match timeout(HANDSHAKE_TIMEOUT, self.handle_handshake()).await {
            Ok(Ok(id)) => id,
            Ok(Err(e)) => {
                warn!(connection = self.connection_number, error = %e, "Handshake failed");
                return None;
            }
            Err(_) => {
                warn!(connection = self.connection_number, "Handshake timed out");
                return None;
            }
        };
        info!(client_id = %client_id, "Client handshake completed");

        let (tx, outbox) = mpsc::channel(OUTBOX_CAPACITY);
        if let Err(e) = self.daemon.connect(client_id.clone(), Box::new(tx)).await {
            warn!(client_id = %client_id, error = %e, "Daemon refused connection, closing");
            return Some(client_id);
        }

        if let Err(e) = self.process_messages(outbox).await {
            debug!(client_id = %client_id, error = %e, "Connection closed");
        }

        if self.daemon.disconnect(client_id.clone()).await.is_err() {
            debug!(client_id = %client_id, "Daemon already stopped");
        }

        info!(client_id = %client_id, "Client disconnected");
        Some(client_id)
    }

    /// Expects `connect`, checks the protocol version and assigns an id.
    async fn handle_handshake(&mut self) -> Result<ClientId, ConnectionError> {
        let msg = self.read_message().await?;

        let client_version = msg.protocol_version;
        if let Err(e) = client_version.check() {
            warn!(
                client_version = %client_version,
                server_version = %ProtocolVersion::CURRENT,
                "Protocol version mismatch"
            );
            self.send_message(DaemonMessage::rejected(&e.to_string())).await?;

            return Err(ConnectionError::VersionMismatch {
                client: client_version,
                server: ProtocolVersion::CURRENT,
            });
        }

        match msg.message {
            MessageType::Connect { client_id } => {
                let assigned = assign_client_id(client_id.as_deref(), self.connection_number);
                self.client_id = Some(assigned.clone());
                self.send_message(DaemonMessage::connected(assigned.to_string()))
                    .await?;
                Ok(assigned)
            }
            other => {
                self.send_message(DaemonMessage::error("Expected Connect message for handshake"))
                    .await?;
                Err(ConnectionError::UnexpectedMessage(format!("{other:?}")))
            }
        }
    }

    /// Relays daemon messages out and client requests in until either side
    /// closes.
    async fn process_messages(&mut self, mut outbox: mpsc::Receiver<DaemonMessage>) -> Result<(), ConnectionError> {
        let cancel = self.cancel.clone();

        loop {
            // Pushed messages go out before the next request is read.
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    return Ok(());
                }

                outbound = outbox.recv() => {
                    match outbound {
                        Some(message) => self.send_message(message).await?,
                        // The daemon dropped our sink (slow consumer or shutdown)
                        None => return Err(ConnectionError::Dropped),
                    }
                }

                inbound = self.read_message() => {
                    match inbound {
                        Ok(msg) => self.handle_message(msg).await?,
                        Err(ConnectionError::Eof) => return Ok(()),
                        Err(ConnectionError::ParseError(e)) => {
                            self.send_message(DaemonMessage::error_with_code(&e, "parse_error")).await?;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: ClientMessage) -> Result<(), ConnectionError> {
        let client_id = self.client_id.clone().unwrap_or_default();

        let response = match msg.message {
            MessageType::Connect { .. } => DaemonMessage::error("Already connected"),
            MessageType::AllSensors => DaemonMessage::sensor_info(self.daemon.all_sensors().await?),
            MessageType::Sensors { paths } => DaemonMessage::sensor_info(self.daemon.sensors(paths).await?),
            MessageType::SensorData { paths } => {
                DaemonMessage::sensor_values(self.daemon.sensor_data(paths).await?)
            }
            MessageType::Subscribe { paths } => {
                let accepted = self.daemon.subscribe(client_id, paths).await?;
                DaemonMessage::Subscribed { paths: accepted }
            }
            MessageType::Unsubscribe { paths } => {
                let removed = self.daemon.unsubscribe(client_id, paths).await?;
                DaemonMessage::Unsubscribed { paths: removed }
            }
            MessageType::Ping { seq } => DaemonMessage::pong(seq),
            MessageType::Disconnect => {
                debug!(client_id = ?self.client_id, "Client requested disconnect");
                return Err(ConnectionError::Eof);
            }
        };

        self.send_message(response).await
    }

    /// Reads one line and parses it. Cancel safe.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let line = self
            .lines
            .next_line()
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?
            .ok_or(ConnectionError::Eof)?;

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        let msg: ClientMessage =
            serde_json::from_str(&line).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        debug!(
            client_id = ?self.client_id,
            message_type = ?std::mem::discriminant(&msg.message),
            "Received message"
        );

        Ok(msg)
    }

    async fn send_message(&mut self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;
        let writer = &mut self.writer;

        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Builds a unique client id from the requested name and connection number.
pub fn assign_client_id(requested: Option<&str>, connection_number: u64) -> ClientId {
    match requested {
        Some(name) if !name.is_empty() => ClientId::new(format!("{name}#{connection_number}")),
        _ => ClientId::new(format!("client-{connection_number}")),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Protocol version mismatch: client {client}, server {server}")]
    VersionMismatch {
        client: ProtocolVersion,
        server: ProtocolVersion,
    },

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Dropped by daemon")]
    Dropped,

    #[error("Daemon error: {0}")]
    Daemon(#[from] crate::daemon::DaemonError),
}
