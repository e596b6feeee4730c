//! Protocol message types for daemon communication.
//!
//! Messages are JSON objects, one per line, tagged by a `type` field.

use crate::version::ProtocolVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysstat_core::{SensorData, SensorInfoMap};

// ============================================================================
// Client → Daemon
// ============================================================================

/// Requests a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Handshake; must be the first message on a connection
    Connect {
        /// Preferred name, used as a prefix of the assigned id
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<String>,
    },

    /// Discovery dump of every container, object and property
    AllSensors,

    /// Metadata for specific property paths
    Sensors { paths: Vec<String> },

    /// Current values for specific property paths
    SensorData { paths: Vec<String> },

    /// Start receiving frames for these paths
    Subscribe { paths: Vec<String> },

    /// Stop receiving frames for these paths
    Unsubscribe { paths: Vec<String> },

    Ping { seq: u64 },

    /// Client disconnecting gracefully
    Disconnect,
}

/// Envelope for every client request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    pub protocol_version: ProtocolVersion,

    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Wraps `message` with the current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn connect(client_id: Option<String>) -> Self {
        Self::new(MessageType::Connect { client_id })
    }

    pub fn all_sensors() -> Self {
        Self::new(MessageType::AllSensors)
    }

    pub fn sensors(paths: Vec<String>) -> Self {
        Self::new(MessageType::Sensors { paths })
    }

    pub fn sensor_data(paths: Vec<String>) -> Self {
        Self::new(MessageType::SensorData { paths })
    }

    pub fn subscribe(paths: Vec<String>) -> Self {
        Self::new(MessageType::Subscribe { paths })
    }

    pub fn unsubscribe(paths: Vec<String>) -> Self {
        Self::new(MessageType::Unsubscribe { paths })
    }

    pub fn ping(seq: u64) -> Self {
        Self::new(MessageType::Ping { seq })
    }

    pub fn disconnect() -> Self {
        Self::new(MessageType::Disconnect)
    }
}

// ============================================================================
// Daemon → Client
// ============================================================================

/// Responses and notifications sent by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Handshake accepted
    Connected {
        protocol_version: ProtocolVersion,
        /// Transport identity assigned to this connection
        client_id: String,
    },

    /// Handshake refused (version mismatch)
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Reply to `all_sensors` and `sensors`
    SensorInfo { sensors: SensorInfoMap },

    /// Reply to `sensor_data`
    SensorValues { entries: Vec<SensorData> },

    /// Reply to `subscribe` with the paths that resolved
    Subscribed { paths: Vec<String> },

    /// Reply to `unsubscribe` with the paths that were subscribed
    Unsubscribed { paths: Vec<String> },

    /// Per-tick frame of changed values
    NewSensorData {
        entries: Vec<SensorData>,
        timestamp: DateTime<Utc>,
    },

    /// Per-tick frame of changed metadata; always precedes the tick's data frame
    SensorMetaDataChanged { sensors: SensorInfoMap },

    /// A property path appeared (sent to every client)
    SensorAdded { path: String },

    /// A property path disappeared (sent to every client)
    SensorRemoved { path: String },

    Pong { seq: u64 },

    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn connected(client_id: String) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            client_id,
        }
    }

    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    pub fn sensor_info(sensors: SensorInfoMap) -> Self {
        Self::SensorInfo { sensors }
    }

    pub fn sensor_values(entries: Vec<SensorData>) -> Self {
        Self::SensorValues { entries }
    }

    /// Creates a data frame stamped with the current time.
    pub fn new_sensor_data(entries: Vec<SensorData>) -> Self {
        Self::NewSensorData {
            entries,
            timestamp: Utc::now(),
        }
    }

    pub fn metadata_changed(sensors: SensorInfoMap) -> Self {
        Self::SensorMetaDataChanged { sensors }
    }

    pub fn sensor_added(path: String) -> Self {
        Self::SensorAdded { path }
    }

    pub fn sensor_removed(path: String) -> Self {
        Self::SensorRemoved { path }
    }

    pub fn pong(seq: u64) -> Self {
        Self::Pong { seq }
    }

    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// True for messages the daemon pushes without a request.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Self::NewSensorData { .. }
                | Self::SensorMetaDataChanged { .. }
                | Self::SensorAdded { .. }
                | Self::SensorRemoved { .. }
        )
    }
}
