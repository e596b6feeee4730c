//! Client interface for the daemon actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `DaemonError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use sysstat_core::{ClientId, SensorData, SensorInfoMap};

use super::commands::{DaemonCommand, DaemonError, DaemonStatus, TickReport};
use crate::dispatch::FrameSink;
use crate::provider::SensorProvider;

/// Cheap-to-clone handle for talking to the daemon actor.
///
/// Connection tasks hold one each; none of them touch daemon state directly.
#[derive(Clone)]
pub struct DaemonHandle {
    sender: mpsc::Sender<DaemonCommand>,
}

impl DaemonHandle {
    pub fn new(sender: mpsc::Sender<DaemonCommand>) -> Self {
        Self { sender }
    }

    /// Registers a provider. Returns the number of containers it added.
    ///
    /// # Errors
    ///
    /// - `DaemonError::Registry` if a provider with the same name exists
    /// - `DaemonError::ChannelClosed` if the actor has shut down
    pub async fn register_provider(&self, provider: Box<dyn SensorProvider>) -> Result<usize, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::RegisterProvider {
            provider,
            respond_to: tx,
        })
        .await?;

        Ok(rx.await.map_err(|_| DaemonError::ChannelClosed)??)
    }

    /// Announces a connected peer and the sink its messages go to.
    ///
    /// # Errors
    ///
    /// - `DaemonError::DuplicateClient` if a peer with this id is connected;
    ///   the existing peer is left untouched
    /// - `DaemonError::ChannelClosed` if the actor has shut down
    pub async fn connect(&self, client_id: ClientId, sink: Box<dyn FrameSink>) -> Result<(), DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Connect {
            client_id,
            sink,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| DaemonError::ChannelClosed)?
    }

    /// Tears down a peer and its session.
    pub async fn disconnect(&self, client_id: ClientId) -> Result<(), DaemonError> {
        self.send(DaemonCommand::Disconnect { client_id }).await
    }

    /// Subscribes a connected peer. Returns the paths that resolved.
    pub async fn subscribe(&self, client_id: ClientId, paths: Vec<String>) -> Result<Vec<String>, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Subscribe {
            client_id,
            paths,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    /// Unsubscribes a peer. Returns the paths that were subscribed.
    pub async fn unsubscribe(&self, client_id: ClientId, paths: Vec<String>) -> Result<Vec<String>, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Unsubscribe {
            client_id,
            paths,
            respond_to: tx,
        })
        .await?;

        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    pub async fn all_sensors(&self) -> Result<SensorInfoMap, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::AllSensors { respond_to: tx }).await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    pub async fn sensors(&self, paths: Vec<String>) -> Result<SensorInfoMap, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Sensors {
            paths,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    pub async fn sensor_data(&self, paths: Vec<String>) -> Result<Vec<SensorData>, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::SensorData {
            paths,
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    /// Runs one poll cycle and waits for it to finish.
    ///
    /// Used to step the daemon manually when it runs without a ticker.
    pub async fn tick(&self) -> Result<TickReport, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Tick { respond_to: Some(tx) }).await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    pub async fn status(&self) -> Result<DaemonStatus, DaemonError> {
        let (tx, rx) = oneshot::channel();
        self.send(DaemonCommand::Status { respond_to: tx }).await?;
        rx.await.map_err(|_| DaemonError::ChannelClosed)
    }

    async fn send(&self, command: DaemonCommand) -> Result<(), DaemonError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| DaemonError::ChannelClosed)
    }
}
