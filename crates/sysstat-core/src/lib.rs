//! sysstat Core - Sensor tree and shared types
//!
//! This crate provides the hierarchical sensor address space shared between
//! the daemon (sysstatd) and its clients: values, metadata, path parsing and
//! the container → object → property tree with its change events.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod client;
pub mod container;
pub mod error;
pub mod event;
pub mod info;
pub mod path;
pub mod property;
pub mod tree;
pub mod value;

// Re-exports for convenience
pub use client::ClientId;
pub use container::{SensorContainer, SensorObject};
pub use error::{TreeError, TreeResult};
pub use event::TreeEvent;
pub use info::{SensorInfo, SensorInfoMap};
pub use path::{object_path, property_path, SensorPath};
pub use property::{AggregateSpec, ObjectMatch, PropertyKind, SensorProperty};
pub use tree::{SensorTree, TreeCheckpoint};
pub use value::{SensorData, SensorValue, Unit, ValueType};
