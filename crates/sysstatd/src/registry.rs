//! Provider registry: owns the sensor tree and the registered providers.

use tracing::{debug, info, warn};

use sysstat_core::{SensorData, SensorInfoMap, SensorProperty, SensorTree, TreeError, TreeEvent};

use crate::provider::{DeferredSender, DeferredUpdate, ProviderContext, SensorProvider};

/// Errors from provider registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("provider already registered: {0}")]
    DuplicateProvider(String),
}

/// Outcome of one round of provider updates.
#[derive(Debug, Default)]
pub struct UpdateSummary {
    /// Providers whose `update()` succeeded
    pub updated: usize,
    /// Names of providers whose `update()` failed
    pub failed: Vec<String>,
    /// Tree events in the order they occurred
    pub events: Vec<TreeEvent>,
}

/// Registered providers plus the tree they populate.
pub struct Registry {
    providers: Vec<Box<dyn SensorProvider>>,
    tree: SensorTree,
    deferred: DeferredSender,
}

impl Registry {
    pub fn new(deferred: DeferredSender) -> Self {
        Self {
            providers: Vec::new(),
            tree: SensorTree::new(),
            deferred,
        }
    }

    /// Registers a provider and takes its containers into the tree.
    ///
    /// A second provider with an existing name is rejected and its
    /// containers are never added. A container id already owned by another
    /// provider is skipped; the rest of the provider's containers are kept.
    /// Returns the number of containers added.
    pub fn register_provider(&mut self, mut provider: Box<dyn SensorProvider>) -> Result<usize, RegistryError> {
        let name = provider.name().to_string();

        if self.providers.iter().any(|p| p.name() == name) {
            warn!(provider = %name, "Provider already registered, ignoring");
            return Err(RegistryError::DuplicateProvider(name));
        }

        let mut added = 0;
        for container in provider.containers() {
            let id = container.id().to_string();
            match self.tree.insert_container(container, &name) {
                Ok(()) => added += 1,
                Err(TreeError::DuplicateContainer(_)) => {
                    warn!(
                        provider = %name,
                        container = %id,
                        owner = ?self.tree.container_owner(&id),
                        "Container already owned by another provider, skipping"
                    );
                }
                Err(e) => warn!(provider = %name, error = %e, "Failed to add container"),
            }
        }

        info!(provider = %name, containers = added, "Provider registered");
        self.providers.push(provider);
        Ok(added)
    }

    /// Names of registered providers, in registration order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn tree(&self) -> &SensorTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut SensorTree {
        &mut self.tree
    }

    pub fn resolve(&self, path: &str) -> Option<&SensorProperty> {
        self.tree.resolve(path)
    }

    pub fn all_sensors(&self) -> SensorInfoMap {
        self.tree.all_sensors()
    }

    pub fn sensors(&self, paths: &[String]) -> SensorInfoMap {
        self.tree.sensors(paths)
    }

    pub fn sensor_data(&self, paths: &[String]) -> Vec<SensorData> {
        self.tree.sensor_data(paths)
    }

    /// Drains tree events produced outside `update_all`.
    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        self.tree.take_events()
    }

    /// Calls `update()` on every provider in registration order.
    ///
    /// A failing provider is logged and everything it wrote during the call
    /// is rolled back; the rest still run.
    /// Events are drained after each provider.
    pub fn update_all(&mut self) -> UpdateSummary {
        let mut summary = UpdateSummary {
            events: self.tree.take_events(),
            ..Default::default()
        };

        for provider in &mut self.providers {
            let name = provider.name().to_string();
            let checkpoint = self.tree.checkpoint(&name);
            let mut ctx = ProviderContext::new(&name, &mut self.tree, &self.deferred);

            match provider.update(&mut ctx) {
                Ok(()) => summary.updated += 1,
                Err(e) => {
                    // Partial writes are discarded; the provider's sensors keep
                    // their values from the previous tick.
                    self.tree.rollback(checkpoint);
                    warn!(provider = %name, error = %e, "Provider update failed");
                    summary.failed.push(name);
                }
            }

            summary.events.extend(self.tree.take_events());
        }

        summary
    }

    /// Applies the result of a deferred provider task.
    ///
    /// Failures are logged and publish nothing. Values for sensors that no
    /// longer exist, or that the provider does not own, are dropped.
    /// Returns the number of values that changed.
    pub fn apply_deferred(&mut self, update: DeferredUpdate) -> usize {
        let values = match update.result {
            Ok(values) => values,
            Err(e) => {
                debug!(provider = %update.provider, error = %e, "Deferred update failed");
                return 0;
            }
        };

        let mut changed = 0;
        let mut ctx = ProviderContext::new(&update.provider, &mut self.tree, &self.deferred);

        for (path, value) in values {
            match ctx.set_value(&path, value) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => debug!(provider = %update.provider, path = %path, error = %e, "Dropped deferred value"),
            }
        }

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use sysstat_core::{SensorContainer, SensorInfo, SensorObject, SensorValue};
    use tokio::sync::mpsc;

    struct Fixed {
        name: &'static str,
        container: &'static str,
    }

    impl SensorProvider for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn containers(&mut self) -> Vec<SensorContainer> {
            vec![SensorContainer::new(self.container, self.container).with_object(
                SensorObject::new("all", "All")
                    .with_property(SensorProperty::new("usage", SensorInfo::new("Usage")).with_value(0.0)),
            )]
        }

        fn update(&mut self, _ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
            Err(ProviderError::failed("sensor unplugged"))
        }
    }

    fn registry() -> Registry {
        let (tx, _rx) = mpsc::unbounded_channel();
        Registry::new(tx)
    }

    #[test]
    fn test_duplicate_provider_rejected() {
        let mut registry = registry();
        assert_eq!(
            registry.register_provider(Box::new(Fixed { name: "cpu", container: "cpu" })),
            Ok(1)
        );

        let err = registry
            .register_provider(Box::new(Fixed { name: "cpu", container: "cpu2" }))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateProvider("cpu".to_string()));
        assert_eq!(registry.provider_count(), 1);
        assert!(registry.tree().container("cpu2").is_none());
    }

    #[test]
    fn test_conflicting_container_skipped() {
        let mut registry = registry();
        registry
            .register_provider(Box::new(Fixed { name: "cpu", container: "cpu" }))
            .unwrap();

        assert_eq!(
            registry.register_provider(Box::new(Fixed { name: "other", container: "cpu" })),
            Ok(0)
        );
        assert_eq!(registry.tree().container_owner("cpu"), Some("cpu"));
        assert_eq!(registry.provider_count(), 2);
    }

    #[test]
    fn test_failures_are_isolated() {
        let mut registry = registry();
        registry
            .register_provider(Box::new(Fixed { name: "a", container: "a" }))
            .unwrap();
        registry
            .register_provider(Box::new(Fixed { name: "b", container: "b" }))
            .unwrap();

        let summary = registry.update_all();
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.failed, vec!["a".to_string(), "b".to_string()]);
    }

    struct Partial;

    impl SensorProvider for Partial {
        fn name(&self) -> &str {
            "partial"
        }

        fn containers(&mut self) -> Vec<SensorContainer> {
            Fixed { name: "partial", container: "partial" }.containers()
        }

        fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
            ctx.set_value("partial/all/usage", 80.0)?;
            ctx.remove_object("partial", "all")?;
            Err(ProviderError::failed("read interrupted"))
        }
    }

    #[test]
    fn test_failed_update_rolled_back() {
        let mut registry = registry();
        registry.register_provider(Box::new(Partial)).unwrap();
        registry.take_events();

        let summary = registry.update_all();
        assert_eq!(summary.failed, vec!["partial".to_string()]);
        assert!(summary.events.is_empty());
        assert_eq!(
            registry.resolve("partial/all/usage").unwrap().value(),
            Some(&SensorValue::Double(0.0))
        );
    }

    #[test]
    fn test_apply_deferred_respects_ownership() {
        let mut registry = registry();
        registry
            .register_provider(Box::new(Fixed { name: "cpu", container: "cpu" }))
            .unwrap();

        let changed = registry.apply_deferred(DeferredUpdate {
            provider: "cpu".to_string(),
            result: Ok(vec![
                ("cpu/all/usage".to_string(), SensorValue::Double(5.0)),
                ("cpu/gone/usage".to_string(), SensorValue::Double(1.0)),
            ]),
        });
        assert_eq!(changed, 1);

        let changed = registry.apply_deferred(DeferredUpdate {
            provider: "disk".to_string(),
            result: Ok(vec![("cpu/all/usage".to_string(), SensorValue::Double(9.0))]),
        });
        assert_eq!(changed, 0);
        assert_eq!(
            registry.resolve("cpu/all/usage").unwrap().value(),
            Some(&SensorValue::Double(5.0))
        );

        let changed = registry.apply_deferred(DeferredUpdate {
            provider: "cpu".to_string(),
            result: Err(ProviderError::deferred("statvfs failed")),
        });
        assert_eq!(changed, 0);
    }
}
