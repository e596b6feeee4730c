//! Sensor tree errors following panic-free policy.

use thiserror::Error;

/// Errors that can occur while mutating the sensor tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// No container with this id is registered
    #[error("Unknown container: {0}")]
    UnknownContainer(String),

    /// No object at this `container/object` path
    #[error("Unknown object: {0}")]
    UnknownObject(String),

    /// No property at this path
    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),

    #[error("Container already registered: {0}")]
    DuplicateContainer(String),

    #[error("Object already exists: {0}")]
    DuplicateObject(String),

    #[error("Sensor already exists: {0}")]
    DuplicateSensor(String),

    /// Aggregate and percentage sensors compute their own value
    #[error("Sensor value is derived and cannot be set: {0}")]
    DerivedSensor(String),

    /// A provider tried to touch a container it does not own
    #[error("Provider {provider} does not own container {container}")]
    NotOwner { container: String, provider: String },
}

/// Result type for tree operations.
pub type TreeResult<T> = Result<T, TreeError>;
