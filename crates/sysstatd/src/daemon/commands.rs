//! Daemon actor commands, errors and reports.
//!
//! - `DaemonCommand`: messages sent to the actor
//! - `DaemonError`: errors surfaced through the handle
//! - `TickReport` / `DaemonStatus`: what the actor reports back

use std::fmt;

use tokio::sync::oneshot;

use sysstat_core::{ClientId, SensorData, SensorInfoMap};

use crate::dispatch::FrameSink;
use crate::provider::SensorProvider;
use crate::registry::RegistryError;

// ============================================================================
// Daemon Commands
// ============================================================================

/// Commands sent to the daemon actor.
///
/// Requests carry a oneshot channel for the response. Everything that
/// touches the tree or the sessions arrives through this enum, so all
/// mutation happens on the actor's task.
pub enum DaemonCommand {
    /// Register a provider and take its containers into the tree.
    ///
    /// # Errors
    /// - `RegistryError::DuplicateProvider` if the name is taken
    RegisterProvider {
        provider: Box<dyn SensorProvider>,
        respond_to: oneshot::Sender<Result<usize, RegistryError>>,
    },

    /// A peer completed its handshake. It will receive shape notifications
    /// and, once subscribed, per-tick frames through `sink`.
    ///
    /// # Errors
    /// - `DaemonError::DuplicateClient` if the id is already connected
    Connect {
        client_id: ClientId,
        sink: Box<dyn FrameSink>,
        respond_to: oneshot::Sender<Result<(), DaemonError>>,
    },

    /// A peer went away. Its session, if any, is torn down.
    Disconnect { client_id: ClientId },

    /// Subscribe a connected peer. Creates its session on first use.
    Subscribe {
        client_id: ClientId,
        paths: Vec<String>,
        respond_to: oneshot::Sender<Vec<String>>,
    },

    Unsubscribe {
        client_id: ClientId,
        paths: Vec<String>,
        respond_to: oneshot::Sender<Vec<String>>,
    },

    AllSensors {
        respond_to: oneshot::Sender<SensorInfoMap>,
    },

    Sensors {
        paths: Vec<String>,
        respond_to: oneshot::Sender<SensorInfoMap>,
    },

    SensorData {
        paths: Vec<String>,
        respond_to: oneshot::Sender<Vec<SensorData>>,
    },

    /// Run one poll cycle: update every provider, then flush every session.
    ///
    /// The ticker sends this without a response channel.
    Tick {
        respond_to: Option<oneshot::Sender<TickReport>>,
    },

    Status {
        respond_to: oneshot::Sender<DaemonStatus>,
    },
}

impl fmt::Debug for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegisterProvider { provider, .. } => f
                .debug_struct("RegisterProvider")
                .field("provider", &provider.name())
                .finish(),
            Self::Connect { client_id, .. } => {
                f.debug_struct("Connect").field("client_id", client_id).finish()
            }
            Self::Disconnect { client_id } => {
                f.debug_struct("Disconnect").field("client_id", client_id).finish()
            }
            Self::Subscribe { client_id, paths, .. } => f
                .debug_struct("Subscribe")
                .field("client_id", client_id)
                .field("paths", paths)
                .finish(),
            Self::Unsubscribe { client_id, paths, .. } => f
                .debug_struct("Unsubscribe")
                .field("client_id", client_id)
                .field("paths", paths)
                .finish(),
            Self::AllSensors { .. } => f.write_str("AllSensors"),
            Self::Sensors { paths, .. } => f.debug_struct("Sensors").field("paths", paths).finish(),
            Self::SensorData { paths, .. } => {
                f.debug_struct("SensorData").field("paths", paths).finish()
            }
            Self::Tick { .. } => f.write_str("Tick"),
            Self::Status { .. } => f.write_str("Status"),
        }
    }
}

// ============================================================================
// Daemon Errors
// ============================================================================

/// Errors returned by [`DaemonHandle`](super::DaemonHandle) methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("client already connected: {0}")]
    DuplicateClient(ClientId),

    /// The actor has shut down.
    #[error("daemon channel closed")]
    ChannelClosed,
}

// ============================================================================
// Reports
// ============================================================================

/// Result of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Sequence number of this tick, starting at 1
    pub tick: u64,
    pub providers_updated: usize,
    pub providers_failed: Vec<String>,
    /// Messages sent to clients during the flush
    pub messages_sent: usize,
    /// Clients torn down because their sink failed
    pub clients_dropped: usize,
}

/// Snapshot of the daemon's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonStatus {
    pub providers: Vec<String>,
    pub containers: usize,
    pub sensors: usize,
    pub peers: usize,
    pub sessions: usize,
    pub ticks: u64,
}
