//! Connection to the sysstat daemon.
//!
//! `SensorClient` owns one Unix socket connection. Requests are answered in
//! order, but the daemon may push frames and shape notifications at any
//! time; any that arrive while a response is awaited are buffered and
//! handed out later by [`SensorClient::next_event`].
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;
use tracing::{debug, info};

use sysstat_core::{SensorData, SensorInfoMap};
use sysstat_protocol::{ClientMessage, DaemonMessage, ProtocolVersion};

use crate::error::{ClientError, Result};

/// Default socket path, shared with the daemon.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/sysstat.sock";

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings.
///
/// # Example
///
/// ```rust
/// use sysstat_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     client_name: Some("panel".to_string()),
///     request_timeout: Duration::from_secs(2),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_path: PathBuf,

    /// Name sent in the handshake; the daemon appends a connection number.
    pub client_name: Option<String>,

    /// How long to wait for the response to a request.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            client_name: None,
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Something the daemon pushed without being asked.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Changed values of subscribed sensors for one tick.
    Data {
        entries: Vec<SensorData>,
        timestamp: DateTime<Utc>,
    },

    /// Changed metadata of subscribed sensors.
    MetadataChanged(SensorInfoMap),

    SensorAdded(String),

    /// The sensor is gone; any subscription to it has been dropped.
    SensorRemoved(String),
}

impl ClientEvent {
    fn from_message(message: DaemonMessage) -> std::result::Result<Self, DaemonMessage> {
        match message {
            DaemonMessage::NewSensorData { entries, timestamp } => Ok(Self::Data { entries, timestamp }),
            DaemonMessage::SensorMetaDataChanged { sensors } => Ok(Self::MetadataChanged(sensors)),
            DaemonMessage::SensorAdded { path } => Ok(Self::SensorAdded(path)),
            DaemonMessage::SensorRemoved { path } => Ok(Self::SensorRemoved(path)),
            other => Err(other),
        }
    }
}

// ============================================================================
// Sensor Client
// ============================================================================

/// A handshaken connection to the daemon.
///
/// # Example
///
/// ```rust,ignore
/// use sysstat_client::{ClientConfig, ClientEvent, SensorClient};
///
/// let mut client = SensorClient::connect(&ClientConfig::default()).await?;
/// client.subscribe(vec!["cpu/all/usage".to_string()]).await?;
///
/// while let Some(event) = client.next_event().await? {
///     if let ClientEvent::Data { entries, .. } = event {
///         println!("{entries:?}");
///     }
/// }
/// ```
pub struct SensorClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    client_id: String,
    request_timeout: Duration,

    /// Pushed messages read while waiting for a response
    pending: VecDeque<ClientEvent>,

    next_seq: u64,
}

impl SensorClient {
    /// Connects to the daemon and performs the handshake.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = UnixStream::connect(&config.socket_path)
            .await
            .map_err(|e| ClientError::Connect {
                path: config.socket_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let (reader, writer) = stream.into_split();
        let mut client = Self {
            lines: BufReader::new(reader).lines(),
            writer,
            client_id: String::new(),
            request_timeout: config.request_timeout,
            pending: VecDeque::new(),
            next_seq: 0,
        };

        client.handshake(config.client_name.clone()).await?;
        Ok(client)
    }

    /// Connects with default settings to the socket at `path`.
    pub async fn connect_to(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect(&ClientConfig {
            socket_path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
        .await
    }

    /// Id the daemon assigned to this connection.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn handshake(&mut self, name: Option<String>) -> Result<()> {
        self.send(&ClientMessage::connect(name)).await?;

        match self.read_with_timeout().await? {
            DaemonMessage::Connected {
                protocol_version,
                client_id,
            } => {
                if !ProtocolVersion::CURRENT.is_compatible_with(&protocol_version) {
                    return Err(ClientError::VersionMismatch {
                        client_version: ProtocolVersion::CURRENT.to_string(),
                        daemon_version: protocol_version.to_string(),
                    });
                }
                info!(client_id = %client_id, protocol_version = %protocol_version, "Handshake complete");
                self.client_id = client_id;
                Ok(())
            }
            DaemonMessage::Rejected { reason, .. } => Err(ClientError::Rejected(reason)),
            DaemonMessage::Error { message, code } => Err(ClientError::Daemon { message, code }),
            other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Metadata for every sensor the daemon knows.
    pub async fn all_sensors(&mut self) -> Result<SensorInfoMap> {
        match self.request(ClientMessage::all_sensors()).await? {
            DaemonMessage::SensorInfo { sensors } => Ok(sensors),
            other => Err(unexpected(other)),
        }
    }

    /// Metadata for the given paths. Unknown paths are absent.
    pub async fn sensors(&mut self, paths: Vec<String>) -> Result<SensorInfoMap> {
        match self.request(ClientMessage::sensors(paths)).await? {
            DaemonMessage::SensorInfo { sensors } => Ok(sensors),
            other => Err(unexpected(other)),
        }
    }

    /// Current values for the given paths. Unknown paths and sensors
    /// without a valid value are absent.
    pub async fn sensor_data(&mut self, paths: Vec<String>) -> Result<Vec<SensorData>> {
        match self.request(ClientMessage::sensor_data(paths)).await? {
            DaemonMessage::SensorValues { entries } => Ok(entries),
            other => Err(unexpected(other)),
        }
    }

    /// Subscribes to the given paths. Returns the ones that exist.
    pub async fn subscribe(&mut self, paths: Vec<String>) -> Result<Vec<String>> {
        match self.request(ClientMessage::subscribe(paths)).await? {
            DaemonMessage::Subscribed { paths } => Ok(paths),
            other => Err(unexpected(other)),
        }
    }

    /// Unsubscribes from the given paths. Returns the ones that were
    /// subscribed.
    pub async fn unsubscribe(&mut self, paths: Vec<String>) -> Result<Vec<String>> {
        match self.request(ClientMessage::unsubscribe(paths)).await? {
            DaemonMessage::Unsubscribed { paths } => Ok(paths),
            other => Err(unexpected(other)),
        }
    }

    /// Round trip to the daemon.
    pub async fn ping(&mut self) -> Result<()> {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);

        match self.request(ClientMessage::ping(seq)).await? {
            DaemonMessage::Pong { seq: got } if got == seq => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Says goodbye and closes the connection.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&ClientMessage::disconnect()).await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Waits for the next pushed event.
    ///
    /// Buffered events come first. Returns `None` once the daemon closes the
    /// connection.
    pub async fn next_event(&mut self) -> Result<Option<ClientEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        loop {
            let message = match self.read_message().await {
                Ok(message) => message,
                Err(ClientError::Closed) => return Ok(None),
                Err(e) => return Err(e),
            };

            match ClientEvent::from_message(message) {
                Ok(event) => return Ok(Some(event)),
                Err(DaemonMessage::Error { message, code }) => {
                    return Err(ClientError::Daemon { message, code });
                }
                Err(other) => debug!(message = ?other, "Ignoring unsolicited message"),
            }
        }
    }

    /// Events buffered while waiting for responses.
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    // ------------------------------------------------------------------------
    // Wire
    // ------------------------------------------------------------------------

    /// Sends a request and returns its response, buffering pushed messages
    /// that arrive first.
    async fn request(&mut self, message: ClientMessage) -> Result<DaemonMessage> {
        self.send(&message).await?;

        loop {
            let response = self.read_with_timeout().await?;
            match ClientEvent::from_message(response) {
                Ok(event) => self.pending.push_back(event),
                Err(DaemonMessage::Error { message, code }) => {
                    return Err(ClientError::Daemon { message, code });
                }
                Err(response) => return Ok(response),
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        debug!(message_type = ?message.message, "Sent message to daemon");
        Ok(())
    }

    async fn read_with_timeout(&mut self) -> Result<DaemonMessage> {
        timeout(self.request_timeout, self.read_message())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn read_message(&mut self) -> Result<DaemonMessage> {
        let line = self.lines.next_line().await?.ok_or(ClientError::Closed)?;
        Ok(serde_json::from_str(&line)?)
    }
}

fn unexpected(message: DaemonMessage) -> ClientError {
    ClientError::UnexpectedResponse(format!("{message:?}"))
}
