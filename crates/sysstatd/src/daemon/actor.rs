//! Daemon actor - owns the registry, sessions and peers.
//!
//! The actor is the single execution context for everything that touches
//! the sensor tree: provider updates, deferred results, subscriptions and
//! frame dispatch. Commands are processed one at a time, so ticks never
//! overlap and a tick is never interleaved with a subscribe.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the requester went away)
//! - Sink failures tear the client down instead of surfacing an error

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sysstat_core::{ClientId, TreeEvent};
use sysstat_protocol::DaemonMessage;

use super::commands::{DaemonCommand, DaemonError, DaemonStatus, TickReport};
use crate::dispatch::{self, FrameSink};
use crate::provider::{DeferredSender, DeferredUpdate};
use crate::registry::Registry;
use crate::session::ClientSession;

/// The daemon actor.
pub struct DaemonActor {
    receiver: mpsc::Receiver<DaemonCommand>,
    deferred: mpsc::UnboundedReceiver<DeferredUpdate>,
    registry: Registry,

    /// Subscription state, one per subscribed peer
    sessions: HashMap<ClientId, ClientSession>,

    /// Outbound sinks, one per connected peer
    peers: HashMap<ClientId, Box<dyn FrameSink>>,

    quit_on_last_client: bool,
    cancel: CancellationToken,
    ticks: u64,
}

impl DaemonActor {
    pub fn new(
        receiver: mpsc::Receiver<DaemonCommand>,
        quit_on_last_client: bool,
        cancel: CancellationToken,
    ) -> Self {
        let (deferred_tx, deferred_rx): (DeferredSender, _) = mpsc::unbounded_channel();

        Self {
            receiver,
            deferred: deferred_rx,
            registry: Registry::new(deferred_tx),
            sessions: HashMap::new(),
            peers: HashMap::new(),
            quit_on_last_client,
            cancel,
            ticks: 0,
        }
    }

    /// Processes commands and deferred results until cancelled or until
    /// every handle is dropped.
    pub async fn run(mut self) {
        info!("Daemon actor starting");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("Daemon actor cancelled");
                    break;
                }

                cmd = self.receiver.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => break,
                    }
                }

                Some(update) = self.deferred.recv() => {
                    self.handle_deferred(update);
                }
            }
        }

        info!(
            ticks = self.ticks,
            sessions = self.sessions.len(),
            "Daemon actor stopped"
        );
    }

    fn handle_command(&mut self, cmd: DaemonCommand) {
        match cmd {
            DaemonCommand::RegisterProvider {
                provider,
                respond_to,
            } => {
                let result = self.registry.register_provider(provider);
                let events = self.registry.take_events();
                self.route_events(events);
                let _ = respond_to.send(result);
            }
            DaemonCommand::Connect {
                client_id,
                sink,
                respond_to,
            } => {
                let result = if self.peers.contains_key(&client_id) {
                    warn!(client_id = %client_id, "Client id already connected, rejecting");
                    Err(DaemonError::DuplicateClient(client_id))
                } else {
                    debug!(client_id = %client_id, "Peer connected");
                    self.peers.insert(client_id, sink);
                    Ok(())
                };
                let _ = respond_to.send(result);
            }
            DaemonCommand::Disconnect { client_id } => {
                self.drop_client(&client_id, "disconnected");
            }
            DaemonCommand::Subscribe {
                client_id,
                paths,
                respond_to,
            } => {
                let accepted = self.handle_subscribe(client_id, &paths);
                let _ = respond_to.send(accepted);
            }
            DaemonCommand::Unsubscribe {
                client_id,
                paths,
                respond_to,
            } => {
                let removed = match self.sessions.get_mut(&client_id) {
                    Some(session) => session.unsubscribe(&paths, self.registry.tree_mut()),
                    None => Vec::new(),
                };
                let _ = respond_to.send(removed);
            }
            DaemonCommand::AllSensors { respond_to } => {
                let _ = respond_to.send(self.registry.all_sensors());
            }
            DaemonCommand::Sensors { paths, respond_to } => {
                let _ = respond_to.send(self.registry.sensors(&paths));
            }
            DaemonCommand::SensorData { paths, respond_to } => {
                let _ = respond_to.send(self.registry.sensor_data(&paths));
            }
            DaemonCommand::Tick { respond_to } => {
                let report = self.handle_tick();
                if let Some(tx) = respond_to {
                    let _ = tx.send(report);
                }
            }
            DaemonCommand::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_subscribe(&mut self, client_id: ClientId, paths: &[String]) -> Vec<String> {
        if !self.peers.contains_key(&client_id) {
            warn!(client_id = %client_id, "Subscribe from unknown peer ignored");
            return Vec::new();
        }

        let tree = self.registry.tree_mut();
        let session = self
            .sessions
            .entry(client_id.clone())
            .or_insert_with(|| ClientSession::new(client_id.clone()));

        let accepted = session.subscribe(paths, tree);
        debug!(
            client_id = %client_id,
            requested = paths.len(),
            accepted = accepted.len(),
            "Client subscribed"
        );
        accepted
    }

    /// One poll cycle: providers in registration order, then every session.
    fn handle_tick(&mut self) -> TickReport {
        self.ticks += 1;

        let summary = self.registry.update_all();
        let mut dropped = self.route_events(summary.events);
        let (messages_sent, flush_dropped) = self.flush_sessions();
        dropped += flush_dropped;

        debug!(
            tick = self.ticks,
            updated = summary.updated,
            failed = summary.failed.len(),
            messages = messages_sent,
            "Tick complete"
        );

        TickReport {
            tick: self.ticks,
            providers_updated: summary.updated,
            providers_failed: summary.failed,
            messages_sent,
            clients_dropped: dropped,
        }
    }

    /// Applies a deferred provider result. Changed values wait in the
    /// sessions' buffers until the next tick flushes them.
    fn handle_deferred(&mut self, update: DeferredUpdate) {
        let provider = update.provider.clone();
        let changed = self.registry.apply_deferred(update);
        let events = self.registry.take_events();
        self.route_events(events);

        debug!(provider = %provider, changed, "Applied deferred update");
    }

    fn status(&self) -> DaemonStatus {
        let tree = self.registry.tree();
        DaemonStatus {
            providers: self.registry.provider_names(),
            containers: tree.container_count(),
            sensors: tree.sensor_count(),
            peers: self.peers.len(),
            sessions: self.sessions.len(),
            ticks: self.ticks,
        }
    }

    // ========================================================================
    // Event Routing
    // ========================================================================

    /// Feeds tree events into sessions and broadcasts shape changes.
    ///
    /// Returns the number of clients dropped because a broadcast failed.
    fn route_events(&mut self, events: Vec<TreeEvent>) -> usize {
        let mut dropped = 0;

        for event in events {
            match event {
                TreeEvent::ValueChanged {
                    path,
                    value,
                    subscribers,
                } => {
                    for id in &subscribers {
                        if let Some(session) = self.sessions.get_mut(id) {
                            session.record_value(&path, value.clone());
                        }
                    }
                }
                TreeEvent::MetadataChanged {
                    path,
                    info,
                    subscribers,
                } => {
                    for id in &subscribers {
                        if let Some(session) = self.sessions.get_mut(id) {
                            session.record_info(&path, info.clone());
                        }
                    }
                }
                TreeEvent::SensorAdded { path } => {
                    dropped += self.broadcast(DaemonMessage::sensor_added(path));
                }
                TreeEvent::SensorRemoved { path, subscribers } => {
                    for id in &subscribers {
                        if let Some(session) = self.sessions.get_mut(id) {
                            session.forget(&path);
                        }
                    }
                    dropped += self.broadcast(DaemonMessage::sensor_removed(path));
                }
            }
        }

        dropped
    }

    /// Sends a message to every connected peer.
    fn broadcast(&mut self, message: DaemonMessage) -> usize {
        let failed: Vec<ClientId> = self
            .peers
            .iter()
            .filter_map(|(id, sink)| sink.send(message.clone()).err().map(|_| id.clone()))
            .collect();

        for id in &failed {
            self.drop_client(id, "broadcast failed");
        }
        failed.len()
    }

    /// Flushes every session to its peer. Returns messages sent and
    /// clients dropped.
    fn flush_sessions(&mut self) -> (usize, usize) {
        let mut sent = 0;
        let mut failed = Vec::new();

        for (id, session) in &mut self.sessions {
            let Some(sink) = self.peers.get(id) else {
                failed.push(id.clone());
                continue;
            };

            match dispatch::flush(session, sink.as_ref()) {
                Ok(count) => sent += count,
                Err(e) => {
                    debug!(client_id = %id, error = %e, "Frame send failed");
                    failed.push(id.clone());
                }
            }
        }

        for id in &failed {
            self.drop_client(id, "frame send failed");
        }
        (sent, failed.len())
    }

    /// Removes a peer and tears down its session.
    ///
    /// With quit-on-last-client set, removing the last session cancels the
    /// daemon.
    fn drop_client(&mut self, client_id: &ClientId, reason: &str) {
        self.peers.remove(client_id);

        let Some(mut session) = self.sessions.remove(client_id) else {
            debug!(client_id = %client_id, reason, "Peer removed");
            return;
        };

        let released = session.teardown(self.registry.tree_mut());
        info!(client_id = %client_id, reason, released, "Client session torn down");

        if self.quit_on_last_client && self.sessions.is_empty() {
            info!("Last client gone, shutting down");
            self.cancel.cancel();
        }
    }
}
