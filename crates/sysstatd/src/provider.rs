//! Provider contract: how data sources plug into the daemon.
//!
//! A provider contributes containers once at registration and is then
//! polled once per tick. During `update()` it only touches the tree through
//! a [`ProviderContext`], which refuses writes to containers the provider
//! does not own.
//!
//! Work that cannot finish within a tick (free-space queries and the like)
//! goes through [`ProviderContext::defer`]. The future runs on the tokio
//! runtime and its result is posted back to the daemon actor, which applies
//! it between ticks. Until then the previous values stay in place.

use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use sysstat_core::{
    SensorContainer, SensorInfo, SensorObject, SensorPath, SensorTree, SensorValue, TreeError,
};

// ============================================================================
// Provider Trait
// ============================================================================

/// A source of sensors.
pub trait SensorProvider: Send {
    /// Unique provider name.
    fn name(&self) -> &str;

    /// Containers owned by this provider. Called once, at registration.
    fn containers(&mut self) -> Vec<SensorContainer>;

    /// Refreshes values. Called once per tick and must not block for long.
    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError>;
}

/// Errors a provider can report.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Sensor tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Update failed: {0}")]
    Failed(String),

    #[error("Deferred query failed: {0}")]
    Deferred(String),
}

impl ProviderError {
    pub fn failed<E: std::fmt::Display>(err: E) -> Self {
        Self::Failed(err.to_string())
    }

    pub fn deferred<E: std::fmt::Display>(err: E) -> Self {
        Self::Deferred(err.to_string())
    }
}

// ============================================================================
// Deferred Work
// ============================================================================

/// Values produced by a deferred provider task.
pub type DeferredValues = Vec<(String, SensorValue)>;

/// Result of a deferred task, posted back to the daemon actor.
#[derive(Debug)]
pub struct DeferredUpdate {
    pub provider: String,
    pub result: Result<DeferredValues, ProviderError>,
}

/// Sending side handed to providers through their context.
pub type DeferredSender = mpsc::UnboundedSender<DeferredUpdate>;

// ============================================================================
// Provider Context
// ============================================================================

/// A provider's view of the sensor tree during `update()`.
pub struct ProviderContext<'a> {
    provider: &'a str,
    tree: &'a mut SensorTree,
    deferred: &'a DeferredSender,
}

impl<'a> ProviderContext<'a> {
    pub fn new(provider: &'a str, tree: &'a mut SensorTree, deferred: &'a DeferredSender) -> Self {
        Self {
            provider,
            tree,
            deferred,
        }
    }

    /// Name of the provider this context belongs to.
    pub fn provider(&self) -> &str {
        self.provider
    }

    /// Read-only access to the whole tree.
    pub fn tree(&self) -> &SensorTree {
        &*self.tree
    }

    pub fn set_value(&mut self, path: &str, value: impl Into<SensorValue>) -> Result<bool, ProviderError> {
        self.check_path(path)?;
        Ok(self.tree.set_value(path, value)?)
    }

    /// Marks a sensor as having no valid reading.
    pub fn clear_value(&mut self, path: &str) -> Result<bool, ProviderError> {
        self.check_path(path)?;
        Ok(self.tree.clear_value(path)?)
    }

    pub fn set_max(&mut self, path: &str, max: f64) -> Result<bool, ProviderError> {
        self.check_path(path)?;
        Ok(self.tree.set_max(path, max)?)
    }

    pub fn update_info<F>(&mut self, path: &str, update: F) -> Result<bool, ProviderError>
    where
        F: FnOnce(&mut SensorInfo),
    {
        self.check_path(path)?;
        Ok(self.tree.update_info(path, update)?)
    }

    pub fn add_object(&mut self, container: &str, object: SensorObject) -> Result<(), ProviderError> {
        self.check_owner(container)?;
        Ok(self.tree.add_object(container, object)?)
    }

    pub fn remove_object(&mut self, container: &str, object: &str) -> Result<(), ProviderError> {
        self.check_owner(container)?;
        Ok(self.tree.remove_object(container, object)?)
    }

    pub fn has_object(&self, container: &str, object: &str) -> bool {
        self.tree
            .container(container)
            .is_some_and(|c| c.object(object).is_some())
    }

    pub fn object_ids(&self, container: &str) -> Vec<String> {
        self.tree.object_ids(container)
    }

    pub fn is_subscribed(&self, path: &str) -> bool {
        self.tree.is_subscribed(path)
    }

    pub fn is_object_subscribed(&self, container: &str, object: &str) -> bool {
        self.tree.is_object_subscribed(container, object)
    }

    /// True when anything in the container has a subscriber.
    pub fn is_container_subscribed(&self, container: &str) -> bool {
        self.tree
            .container(container)
            .is_some_and(|c| c.objects().any(SensorObject::is_subscribed))
    }

    /// Runs `task` off the tick and applies its values when it completes.
    ///
    /// Returns false if there is no tokio runtime to run it on.
    pub fn defer<F>(&self, task: F) -> bool
    where
        F: Future<Output = Result<DeferredValues, ProviderError>> + Send + 'static,
    {
        let Ok(runtime) = Handle::try_current() else {
            warn!(provider = self.provider, "No runtime available for deferred work");
            return false;
        };

        let sender = self.deferred.clone();
        let provider = self.provider.to_string();

        runtime.spawn(async move {
            let result = task.await;
            if sender.send(DeferredUpdate { provider, result }).is_err() {
                debug!("Deferred result dropped: daemon stopped");
            }
        });

        true
    }

    fn check_path(&self, path: &str) -> Result<(), ProviderError> {
        let parsed = SensorPath::parse(path).ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;
        self.check_owner(parsed.container)
    }

    fn check_owner(&self, container: &str) -> Result<(), ProviderError> {
        match self.tree.container_owner(container) {
            Some(owner) if owner == self.provider => Ok(()),
            Some(_) => Err(TreeError::NotOwner {
                container: container.to_string(),
                provider: self.provider.to_string(),
            }
            .into()),
            None => Err(TreeError::UnknownContainer(container.to_string()).into()),
        }
    }
}
