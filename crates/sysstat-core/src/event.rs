//! Change notifications produced by the sensor tree.

use crate::client::ClientId;
use crate::info::SensorInfo;
use crate::value::SensorValue;

/// A change in the sensor tree.
///
/// Every mutating tree operation queues the events it causes before it
/// returns, so whoever drains the queue never observes a half-updated tree.
/// Value and metadata events are only queued for properties that currently
/// have subscribers and carry the subscriber list at the time of the change.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// A subscribed property now holds a new, defined value
    ValueChanged {
        path: String,
        value: SensorValue,
        subscribers: Vec<ClientId>,
    },

    /// A subscribed property's metadata changed
    MetadataChanged {
        path: String,
        info: SensorInfo,
        subscribers: Vec<ClientId>,
    },

    /// A property path appeared
    SensorAdded { path: String },

    /// A property path disappeared; `subscribers` held it at removal time
    SensorRemoved {
        path: String,
        subscribers: Vec<ClientId>,
    },
}

impl TreeEvent {
    /// Path of the property this event concerns.
    pub fn path(&self) -> &str {
        match self {
            Self::ValueChanged { path, .. }
            | Self::MetadataChanged { path, .. }
            | Self::SensorAdded { path }
            | Self::SensorRemoved { path, .. } => path,
        }
    }
}
