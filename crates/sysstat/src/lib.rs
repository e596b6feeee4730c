//! sysstat Client - Talk to the sysstat daemon
//!
//! Connects over the daemon's Unix socket, discovers sensors, reads current
//! values and subscribes to per-tick frames.
//!
//! ```rust,ignore
//! use sysstat_client::SensorClient;
//!
//! let mut client = SensorClient::connect_to("/tmp/sysstat.sock").await?;
//! for (path, info) in client.all_sensors().await? {
//!     println!("{path}: {}", info.name);
//! }
//! ```

pub mod client;
pub mod error;

pub use client::{ClientConfig, ClientEvent, SensorClient, DEFAULT_SOCKET_PATH};
pub use error::{ClientError, Result};
