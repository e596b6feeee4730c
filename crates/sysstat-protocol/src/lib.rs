//! sysstat Protocol - Wire protocol for daemon communication
//!
//! This crate provides the JSON-lines message types exchanged between
//! the daemon and its clients: discovery queries, subscription requests,
//! per-tick sensor frames and tree shape notifications.

pub mod message;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, MessageType};
pub use version::{ProtocolVersion, VersionError};
