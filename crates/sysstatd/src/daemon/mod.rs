//! Daemon core using the Actor pattern.
//!
//! The daemon owns the sensor registry, the client sessions and the poll
//! tick. It receives commands via a tokio mpsc channel; a ticker task sends
//! a `Tick` command on a fixed period.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Ticker task    │────▶│   DaemonActor   │────▶│ FrameSink / peer │
//! └─────────────────┘     └─────────────────┘     └──────────────────┘
//!         │                   ▲       │                    │
//!         │  DaemonCommand    │       │ update(ctx)        │ frames,
//!         │  (mpsc channel)   │       ▼                    │ added/removed
//!         ▼                   │  ┌──────────┐              ▼
//!    Tick / Subscribe /       │  │ Registry │        connected clients
//!    queries from clients     │  └──────────┘
//!                             │       │ defer()
//!                             └───────┘ DeferredUpdate (mpsc)
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

mod actor;
mod commands;
mod handle;

pub use actor::DaemonActor;
pub use commands::{DaemonCommand, DaemonError, DaemonStatus, TickReport};
pub use handle::DaemonHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Default poll period
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runtime options for the daemon core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Tick period. `None` runs without a ticker; ticks are then driven
    /// through [`DaemonHandle::tick`].
    pub poll_interval: Option<Duration>,

    /// Cancel the daemon when the last subscribed client goes away.
    pub quit_on_last_client: bool,
}

impl DaemonOptions {
    /// Options for a daemon whose ticks are stepped by hand.
    pub fn manual() -> Self {
        Self {
            poll_interval: None,
            quit_on_last_client: false,
        }
    }
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            poll_interval: Some(DEFAULT_POLL_INTERVAL),
            quit_on_last_client: false,
        }
    }
}

/// Spawns the daemon actor (and its ticker, if configured) and returns a
/// handle for interaction.
///
/// Cancelling `cancel` stops both tasks. The actor also cancels it itself
/// when quit-on-last-client triggers.
///
/// # Example
///
/// ```no_run
/// use sysstatd::daemon::{spawn_daemon, DaemonOptions};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_daemon(DaemonOptions::default(), CancellationToken::new());
///     let sensors = handle.all_sensors().await;
/// }
/// ```
pub fn spawn_daemon(options: DaemonOptions, cancel: CancellationToken) -> DaemonHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = DaemonActor::new(cmd_rx, options.quit_on_last_client, cancel.clone());
    tokio::spawn(actor.run());

    if let Some(period) = options.poll_interval {
        spawn_tick_task(cmd_tx.downgrade(), period, cancel);
    }

    DaemonHandle::new(cmd_tx)
}

/// Spawns the task that drives the poll cycle.
///
/// Late ticks are skipped rather than bunched, so a slow cycle delays the
/// next one instead of queueing several. The ticker holds only a weak
/// sender: once every [`DaemonHandle`] is dropped it stops, and the actor
/// sees its channel close.
fn spawn_tick_task(sender: mpsc::WeakSender<DaemonCommand>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Ticker stopping: cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    let Some(sender) = sender.upgrade() else {
                        debug!("Ticker stopping: all handles dropped");
                        break;
                    };
                    if sender.send(DaemonCommand::Tick { respond_to: None }).await.is_err() {
                        debug!("Ticker stopping: daemon channel closed");
                        break;
                    }
                }
            }
        }
    });
}
