//! The sensor tree: containers, objects and properties addressed by path.
//!
//! All mutation goes through [`SensorTree`] so that derived values stay in
//! sync and every change is queued as a [`TreeEvent`] before the mutating
//! call returns.
//!
//! Change detection uses strict inequality for every property kind: setting
//! a value equal to the current one, or recomputing an aggregate to the same
//! result, queues nothing.

use std::collections::BTreeMap;

use tracing::debug;

use crate::client::ClientId;
use crate::container::{SensorContainer, SensorObject};
use crate::error::{TreeError, TreeResult};
use crate::event::TreeEvent;
use crate::info::{SensorInfo, SensorInfoMap};
use crate::path::{object_path, property_path, SensorPath};
use crate::property::{AggregateSpec, PropertyKind, SensorProperty};
use crate::value::{SensorData, SensorValue};

/// Containers saved by [`SensorTree::checkpoint`].
#[derive(Debug)]
pub struct TreeCheckpoint {
    containers: Vec<SensorContainer>,
    events: usize,
}

/// In-memory registry of every sensor.
#[derive(Debug, Default)]
pub struct SensorTree {
    containers: BTreeMap<String, SensorContainer>,
    events: Vec<TreeEvent>,
}

impl SensorTree {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Shape
    // ------------------------------------------------------------------------

    /// Inserts a container owned by `owner`.
    ///
    /// Queues `SensorAdded` for every property and computes derived values.
    pub fn insert_container(&mut self, mut container: SensorContainer, owner: &str) -> TreeResult<()> {
        if self.containers.contains_key(container.id()) {
            return Err(TreeError::DuplicateContainer(container.id().to_string()));
        }

        container.set_owner(owner);
        let id = container.id().to_string();

        for object in container.objects() {
            for property in object.properties() {
                self.events.push(TreeEvent::SensorAdded {
                    path: property_path(&id, object.id(), property.id()),
                });
            }
        }

        debug!(container = %id, owner, "Container inserted");
        self.containers.insert(id.clone(), container);
        self.recompute_all_derived(&id);
        Ok(())
    }

    /// Adds an object to an existing container.
    pub fn add_object(&mut self, container_id: &str, object: SensorObject) -> TreeResult<()> {
        let container = self
            .containers
            .get_mut(container_id)
            .ok_or_else(|| TreeError::UnknownContainer(container_id.to_string()))?;

        if container.object(object.id()).is_some() {
            return Err(TreeError::DuplicateObject(object_path(container_id, object.id())));
        }

        for property in object.properties() {
            self.events.push(TreeEvent::SensorAdded {
                path: property_path(container_id, object.id(), property.id()),
            });
        }

        debug!(container = container_id, object = object.id(), "Object added");
        container.objects.insert(object.id().to_string(), object);
        self.recompute_all_derived(container_id);
        Ok(())
    }

    /// Removes an object and every property it owns.
    ///
    /// Subscriptions to the removed properties go away with them; the
    /// `SensorRemoved` events carry who held them.
    pub fn remove_object(&mut self, container_id: &str, object_id: &str) -> TreeResult<()> {
        let container = self
            .containers
            .get_mut(container_id)
            .ok_or_else(|| TreeError::UnknownContainer(container_id.to_string()))?;

        let object = container
            .objects
            .remove(object_id)
            .ok_or_else(|| TreeError::UnknownObject(object_path(container_id, object_id)))?;

        for property in object.properties() {
            self.events.push(TreeEvent::SensorRemoved {
                path: property_path(container_id, object_id, property.id()),
                subscribers: property.subscriber_list(),
            });
        }

        debug!(container = container_id, object = object_id, "Object removed");
        self.recompute_all_derived(container_id);
        Ok(())
    }

    /// Adds a property to an existing object.
    pub fn add_property(
        &mut self,
        container_id: &str,
        object_id: &str,
        property: SensorProperty,
    ) -> TreeResult<()> {
        let object = self
            .containers
            .get_mut(container_id)
            .ok_or_else(|| TreeError::UnknownContainer(container_id.to_string()))?
            .object_mut(object_id)
            .ok_or_else(|| TreeError::UnknownObject(object_path(container_id, object_id)))?;

        let path = property_path(container_id, object_id, property.id());
        if object.property(property.id()).is_some() {
            return Err(TreeError::DuplicateSensor(path));
        }

        object.properties.insert(property.id().to_string(), property);
        self.events.push(TreeEvent::SensorAdded { path });
        self.recompute_all_derived(container_id);
        Ok(())
    }

    /// Removes a single property.
    pub fn remove_property(&mut self, path: &str) -> TreeResult<()> {
        let parsed = SensorPath::parse(path).ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;

        let property = self
            .containers
            .get_mut(parsed.container)
            .and_then(|c| c.object_mut(parsed.object))
            .and_then(|o| o.properties.remove(parsed.property))
            .ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;

        self.events.push(TreeEvent::SensorRemoved {
            path: path.to_string(),
            subscribers: property.subscriber_list(),
        });
        self.recompute_all_derived(parsed.container);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn container(&self, id: &str) -> Option<&SensorContainer> {
        self.containers.get(id)
    }

    pub fn containers(&self) -> impl Iterator<Item = &SensorContainer> {
        self.containers.values()
    }

    /// Name of the provider owning `container_id`.
    pub fn container_owner(&self, container_id: &str) -> Option<&str> {
        self.containers.get(container_id).map(SensorContainer::owner)
    }

    /// Resolves a `container/object/property` path.
    ///
    /// Malformed paths and paths with missing segments resolve to `None`.
    pub fn resolve(&self, path: &str) -> Option<&SensorProperty> {
        let parsed = SensorPath::parse(path)?;
        self.containers
            .get(parsed.container)?
            .object(parsed.object)?
            .property(parsed.property)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.resolve(path).is_some()
    }

    /// Metadata for every container, object and property.
    ///
    /// Containers and objects appear under their own paths with only a name.
    pub fn all_sensors(&self) -> SensorInfoMap {
        let mut map = SensorInfoMap::new();

        for container in self.containers.values() {
            map.insert(container.id().to_string(), SensorInfo::new(container.name()));

            for object in container.objects() {
                map.insert(
                    object_path(container.id(), object.id()),
                    SensorInfo::new(object.name()),
                );

                for property in object.properties() {
                    map.insert(
                        property_path(container.id(), object.id(), property.id()),
                        property.info().clone(),
                    );
                }
            }
        }

        map
    }

    /// Metadata for the given property paths; unknown paths are absent.
    pub fn sensors<I, S>(&self, paths: I) -> SensorInfoMap
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter_map(|path| {
                let path = path.as_ref();
                self.resolve(path)
                    .map(|property| (path.to_string(), property.info().clone()))
            })
            .collect()
    }

    /// Current values for the given paths, skipping unknown paths and
    /// properties without a valid value.
    pub fn sensor_data<I, S>(&self, paths: I) -> Vec<SensorData>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter_map(|path| {
                let path = path.as_ref();
                let value = self.resolve(path)?.value()?.clone();
                Some(SensorData::new(path, value))
            })
            .collect()
    }

    /// Ids of the objects in a container.
    pub fn object_ids(&self, container_id: &str) -> Vec<String> {
        self.containers
            .get(container_id)
            .map(|c| c.objects().map(|o| o.id().to_string()).collect())
            .unwrap_or_default()
    }

    /// Total number of properties.
    pub fn sensor_count(&self) -> usize {
        self.containers
            .values()
            .flat_map(SensorContainer::objects)
            .map(|o| o.properties.len())
            .sum()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    // ------------------------------------------------------------------------
    // Values and metadata
    // ------------------------------------------------------------------------

    /// Sets a plain property's value.
    ///
    /// Returns whether the value changed. Derived properties reject direct
    /// writes with [`TreeError::DerivedSensor`].
    pub fn set_value(&mut self, path: &str, value: impl Into<SensorValue>) -> TreeResult<bool> {
        self.store_value(path, Some(value.into()))
    }

    /// Marks a plain property as having no valid value.
    pub fn clear_value(&mut self, path: &str) -> TreeResult<bool> {
        self.store_value(path, None)
    }

    /// Applies `update` to a property's metadata.
    ///
    /// Returns whether anything changed. Works on derived properties too.
    pub fn update_info<F>(&mut self, path: &str, update: F) -> TreeResult<bool>
    where
        F: FnOnce(&mut SensorInfo),
    {
        let parsed = SensorPath::parse(path).ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;
        let property = lookup_mut(&mut self.containers, parsed.container, parsed.object, parsed.property)
            .ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;

        if !property.update_info(update) {
            return Ok(false);
        }

        if property.is_subscribed() {
            self.events.push(TreeEvent::MetadataChanged {
                path: path.to_string(),
                info: property.info().clone(),
                subscribers: property.subscriber_list(),
            });
        }

        self.recompute_percentages(parsed.container, parsed.object, parsed.property);
        Ok(true)
    }

    /// Sets the `max` metadata of a property.
    pub fn set_max(&mut self, path: &str, max: f64) -> TreeResult<bool> {
        self.update_info(path, |info| info.max = Some(max))
    }

    fn store_value(&mut self, path: &str, value: Option<SensorValue>) -> TreeResult<bool> {
        let parsed = SensorPath::parse(path).ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;
        let property = lookup_mut(&mut self.containers, parsed.container, parsed.object, parsed.property)
            .ok_or_else(|| TreeError::UnknownSensor(path.to_string()))?;

        if property.kind().is_derived() {
            return Err(TreeError::DerivedSensor(path.to_string()));
        }

        if !property.set_value(value) {
            return Ok(false);
        }
        push_value_event(&mut self.events, path.to_string(), property);

        self.recompute_dependents(parsed.container, parsed.object, parsed.property);
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Adds `client` to a property's subscribers.
    ///
    /// Returns false when the path does not resolve.
    pub fn subscribe(&mut self, path: &str, client: &ClientId) -> bool {
        match self.resolve_mut(path) {
            Some(property) => {
                property.add_subscriber(client.clone());
                true
            }
            None => false,
        }
    }

    /// Removes `client` from a property's subscribers.
    ///
    /// Returns whether the client was subscribed.
    pub fn unsubscribe(&mut self, path: &str, client: &ClientId) -> bool {
        self.resolve_mut(path)
            .is_some_and(|property| property.remove_subscriber(client))
    }

    pub fn is_subscribed(&self, path: &str) -> bool {
        self.resolve(path).is_some_and(SensorProperty::is_subscribed)
    }

    /// True when any property of the object has a subscriber.
    pub fn is_object_subscribed(&self, container_id: &str, object_id: &str) -> bool {
        self.containers
            .get(container_id)
            .and_then(|c| c.object(object_id))
            .is_some_and(SensorObject::is_subscribed)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Drains the queued change events in the order they occurred.
    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    // ------------------------------------------------------------------------
    // Checkpoints
    // ------------------------------------------------------------------------

    /// Saves the containers owned by `owner` and the event queue position.
    ///
    /// Derived values never cross containers, so an owner's containers can
    /// be restored on their own.
    pub fn checkpoint(&self, owner: &str) -> TreeCheckpoint {
        TreeCheckpoint {
            containers: self
                .containers
                .values()
                .filter(|c| c.owner() == owner)
                .cloned()
                .collect(),
            events: self.events.len(),
        }
    }

    /// Puts the checkpointed containers back and forgets events queued since.
    pub fn rollback(&mut self, checkpoint: TreeCheckpoint) {
        let discarded = self.events.len().saturating_sub(checkpoint.events);
        self.events.truncate(checkpoint.events);

        for container in checkpoint.containers {
            self.containers.insert(container.id().to_string(), container);
        }
        debug!(discarded, "Rolled back sensor tree");
    }

    // ------------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------------

    fn resolve_mut(&mut self, path: &str) -> Option<&mut SensorProperty> {
        let parsed = SensorPath::parse(path)?;
        lookup_mut(&mut self.containers, parsed.container, parsed.object, parsed.property)
    }

    /// Recomputes everything that depends on `container/object/property`.
    fn recompute_dependents(&mut self, container_id: &str, object_id: &str, property_id: &str) {
        let Some(container) = self.containers.get(container_id) else {
            return;
        };

        let is_plain = container
            .object(object_id)
            .and_then(|o| o.property(property_id))
            .is_some_and(|p| !p.kind().is_derived());

        let mut aggregates = Vec::new();
        if is_plain {
            for object in container.objects() {
                if object.id() == object_id {
                    continue;
                }
                for property in object.properties() {
                    if let PropertyKind::Aggregate(spec) = property.kind() {
                        if spec.property == property_id && spec.objects.matches(object_id) {
                            aggregates.push((
                                object.id().to_string(),
                                property.id().to_string(),
                                aggregate_value(container, object.id(), spec),
                            ));
                        }
                    }
                }
            }
        }

        for (object, property, value) in &aggregates {
            self.store_derived(container_id, object, property, value.clone());
        }

        self.recompute_percentages(container_id, object_id, property_id);
        for (object, property, _) in &aggregates {
            self.recompute_percentages(container_id, object, property);
        }
    }

    /// Recomputes percentage properties in `object` based on `base`.
    fn recompute_percentages(&mut self, container_id: &str, object_id: &str, base: &str) {
        let Some(object) = self.containers.get(container_id).and_then(|c| c.object(object_id)) else {
            return;
        };

        let updates: Vec<(String, Option<SensorValue>)> = object
            .properties()
            .filter(|p| matches!(p.kind(), PropertyKind::Percentage { base: b } if b == base))
            .map(|p| (p.id().to_string(), percentage_value(object, base)))
            .collect();

        for (property, value) in updates {
            self.store_derived(container_id, object_id, &property, value);
        }
    }

    /// Recomputes every derived property of a container, aggregates first.
    fn recompute_all_derived(&mut self, container_id: &str) {
        let Some(container) = self.containers.get(container_id) else {
            return;
        };

        let mut aggregates = Vec::new();
        for object in container.objects() {
            for property in object.properties() {
                if let PropertyKind::Aggregate(spec) = property.kind() {
                    aggregates.push((
                        object.id().to_string(),
                        property.id().to_string(),
                        aggregate_value(container, object.id(), spec),
                    ));
                }
            }
        }

        for (object, property, value) in aggregates {
            self.store_derived(container_id, &object, &property, value);
        }

        let Some(container) = self.containers.get(container_id) else {
            return;
        };

        let mut percentages = Vec::new();
        for object in container.objects() {
            for property in object.properties() {
                if let PropertyKind::Percentage { base } = property.kind() {
                    percentages.push((
                        object.id().to_string(),
                        property.id().to_string(),
                        percentage_value(object, base),
                    ));
                }
            }
        }

        for (object, property, value) in percentages {
            self.store_derived(container_id, &object, &property, value);
        }
    }

    fn store_derived(
        &mut self,
        container_id: &str,
        object_id: &str,
        property_id: &str,
        value: Option<SensorValue>,
    ) {
        let Some(property) = lookup_mut(&mut self.containers, container_id, object_id, property_id)
        else {
            return;
        };

        if property.set_value(value) {
            push_value_event(
                &mut self.events,
                property_path(container_id, object_id, property_id),
                property,
            );
        }
    }
}

fn lookup_mut<'a>(
    containers: &'a mut BTreeMap<String, SensorContainer>,
    container_id: &str,
    object_id: &str,
    property_id: &str,
) -> Option<&'a mut SensorProperty> {
    containers
        .get_mut(container_id)?
        .object_mut(object_id)?
        .property_mut(property_id)
}

fn push_value_event(events: &mut Vec<TreeEvent>, path: String, property: &SensorProperty) {
    if !property.is_subscribed() {
        return;
    }
    if let Some(value) = property.value() {
        events.push(TreeEvent::ValueChanged {
            path,
            value: value.clone(),
            subscribers: property.subscriber_list(),
        });
    }
}

fn aggregate_value(container: &SensorContainer, own_object: &str, spec: &AggregateSpec) -> Option<SensorValue> {
    let values = container
        .objects()
        .filter(|o| o.id() != own_object && spec.objects.matches(o.id()))
        .filter_map(|o| o.property(&spec.property))
        .filter(|p| !p.kind().is_derived())
        .filter_map(SensorProperty::value);

    SensorValue::sum(values)
}

fn percentage_value(object: &SensorObject, base: &str) -> Option<SensorValue> {
    let base = object.property(base)?;
    let value = base.value()?.as_f64()?;
    let max = base.info().max?;

    if max <= 0.0 {
        return None;
    }
    Some(SensorValue::Double(value / max * 100.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::ObjectMatch;

    fn cpu_container() -> SensorContainer {
        SensorContainer::new("cpu", "CPUs").with_object(
            SensorObject::new("all", "All").with_property(
                SensorProperty::new("usage", SensorInfo::new("Usage")).with_value(0.0),
            ),
        )
    }

    fn disk_container() -> SensorContainer {
        let volume = |id: &str, used: u64, total: u64| {
            SensorObject::new(id, id)
                .with_property(
                    SensorProperty::new("used", SensorInfo::new("Used").with_max(total as f64))
                        .with_value(used),
                )
                .with_property(SensorProperty::percentage("usedPercent", "Used %", "used"))
        };

        SensorContainer::new("disk", "Disks")
            .with_object(volume("sda1", 25, 100))
            .with_object(volume("sdb1", 50, 100))
            .with_object(
                SensorObject::new("all", "All").with_property(SensorProperty::aggregate(
                    "used",
                    SensorInfo::new("Used"),
                    AggregateSpec::new(ObjectMatch::All, "used"),
                )),
            )
    }

    #[test]
    fn test_resolve_round_trip() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        let property = tree.resolve("cpu/all/usage").unwrap();
        assert_eq!(property.id(), "usage");
        assert_eq!(tree.container_owner("cpu"), Some("cpu"));
    }

    #[test]
    fn test_resolve_malformed_paths() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        for path in ["", "cpu", "cpu/", "cpu/all", "cpu/all/", "/all/usage", "cpu//usage", "cpu/all/usage/x", "gpu/all/usage"] {
            assert!(tree.resolve(path).is_none(), "{path} should not resolve");
        }
    }

    #[test]
    fn test_insert_queues_sensor_added() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        let events = tree.take_events();
        assert_eq!(
            events,
            vec![TreeEvent::SensorAdded {
                path: "cpu/all/usage".to_string()
            }]
        );
        assert!(!tree.has_events());
    }

    #[test]
    fn test_duplicate_container_rejected() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        let err = tree.insert_container(cpu_container(), "other").unwrap_err();
        assert_eq!(err, TreeError::DuplicateContainer("cpu".to_string()));
        assert_eq!(tree.container_owner("cpu"), Some("cpu"));
        assert_eq!(tree.sensor_count(), 1);
    }

    #[test]
    fn test_set_value_strict_inequality() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();
        tree.take_events();

        let client = ClientId::new("a");
        assert!(tree.subscribe("cpu/all/usage", &client));

        assert!(tree.set_value("cpu/all/usage", 42.5).unwrap());
        assert!(!tree.set_value("cpu/all/usage", 42.5).unwrap());

        let events = tree.take_events();
        assert_eq!(
            events,
            vec![TreeEvent::ValueChanged {
                path: "cpu/all/usage".to_string(),
                value: SensorValue::Double(42.5),
                subscribers: vec![client],
            }]
        );
    }

    #[test]
    fn test_unsubscribed_changes_queue_nothing() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();
        tree.take_events();

        assert!(tree.set_value("cpu/all/usage", 10.0).unwrap());
        assert!(tree.set_max("cpu/all/usage", 100.0).unwrap());
        assert!(tree.take_events().is_empty());
    }

    #[test]
    fn test_clear_value_queues_nothing() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();
        tree.subscribe("cpu/all/usage", &ClientId::new("a"));
        tree.take_events();

        assert!(tree.clear_value("cpu/all/usage").unwrap());
        assert!(tree.take_events().is_empty());
        assert!(tree.sensor_data(["cpu/all/usage"]).is_empty());
    }

    #[test]
    fn test_set_value_unknown_path() {
        let mut tree = SensorTree::new();
        let err = tree.set_value("cpu/all/usage", 1.0).unwrap_err();
        assert_eq!(err, TreeError::UnknownSensor("cpu/all/usage".to_string()));
    }

    #[test]
    fn test_aggregate_and_percentage() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();

        assert_eq!(tree.resolve("disk/all/used").unwrap().value(), Some(&SensorValue::UInt(75)));
        assert_eq!(
            tree.resolve("disk/sda1/usedPercent").unwrap().value(),
            Some(&SensorValue::Double(25.0))
        );

        tree.set_value("disk/sda1/used", 50u64).unwrap();
        assert_eq!(tree.resolve("disk/all/used").unwrap().value(), Some(&SensorValue::UInt(100)));
        assert_eq!(
            tree.resolve("disk/sda1/usedPercent").unwrap().value(),
            Some(&SensorValue::Double(50.0))
        );

        tree.set_max("disk/sda1/used", 200.0).unwrap();
        assert_eq!(
            tree.resolve("disk/sda1/usedPercent").unwrap().value(),
            Some(&SensorValue::Double(25.0))
        );
    }

    #[test]
    fn test_derived_sensor_rejects_writes() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();

        let err = tree.set_value("disk/all/used", 1u64).unwrap_err();
        assert_eq!(err, TreeError::DerivedSensor("disk/all/used".to_string()));
    }

    #[test]
    fn test_aggregate_unchanged_result_queues_nothing() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();
        tree.subscribe("disk/all/used", &ClientId::new("a"));
        tree.take_events();

        tree.remove_property("disk/sdb1/usedPercent").unwrap();

        assert_eq!(
            tree.take_events(),
            vec![TreeEvent::SensorRemoved {
                path: "disk/sdb1/usedPercent".to_string(),
                subscribers: vec![],
            }]
        );
        assert_eq!(tree.resolve("disk/all/used").unwrap().value(), Some(&SensorValue::UInt(75)));
    }

    #[test]
    fn test_remove_object_cascades() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();
        let client = ClientId::new("a");
        tree.subscribe("disk/sdb1/used", &client);
        tree.subscribe("disk/all/used", &client);
        tree.take_events();

        tree.remove_object("disk", "sdb1").unwrap();

        assert!(tree.resolve("disk/sdb1/used").is_none());
        let events = tree.take_events();
        assert!(events.contains(&TreeEvent::SensorRemoved {
            path: "disk/sdb1/used".to_string(),
            subscribers: vec![client.clone()],
        }));
        assert!(events.contains(&TreeEvent::SensorRemoved {
            path: "disk/sdb1/usedPercent".to_string(),
            subscribers: vec![],
        }));
        assert!(events.contains(&TreeEvent::ValueChanged {
            path: "disk/all/used".to_string(),
            value: SensorValue::UInt(25),
            subscribers: vec![client],
        }));
    }

    #[test]
    fn test_add_object_updates_aggregate() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();
        tree.take_events();

        let object = SensorObject::new("sdc1", "sdc1").with_property(
            SensorProperty::new("used", SensorInfo::new("Used")).with_value(5u64),
        );
        tree.add_object("disk", object).unwrap();

        assert_eq!(tree.resolve("disk/all/used").unwrap().value(), Some(&SensorValue::UInt(80)));
        assert_eq!(
            tree.take_events(),
            vec![TreeEvent::SensorAdded {
                path: "disk/sdc1/used".to_string()
            }]
        );

        let err = tree
            .add_object("disk", SensorObject::new("sdc1", "sdc1"))
            .unwrap_err();
        assert_eq!(err, TreeError::DuplicateObject("disk/sdc1".to_string()));
    }

    #[test]
    fn test_metadata_change_event() {
        let mut tree = SensorTree::new();
        tree.insert_container(disk_container(), "disk").unwrap();
        let client = ClientId::new("a");
        tree.subscribe("disk/sda1/used", &client);
        tree.take_events();

        tree.set_max("disk/sda1/used", 200.0).unwrap();

        let events = tree.take_events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            TreeEvent::MetadataChanged { path, info, subscribers } => {
                assert_eq!(path, "disk/sda1/used");
                assert_eq!(info.max, Some(200.0));
                assert_eq!(subscribers, &vec![client]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_all_sensors_and_queries() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        let all = tree.all_sensors();
        assert_eq!(all.get("cpu").map(|i| i.name.as_str()), Some("CPUs"));
        assert_eq!(all.get("cpu/all").map(|i| i.name.as_str()), Some("All"));
        assert_eq!(all.get("cpu/all/usage").map(|i| i.name.as_str()), Some("Usage"));

        let some = tree.sensors(["cpu/all/usage", "cpu/all/missing"]);
        assert_eq!(some.len(), 1);

        let data = tree.sensor_data(["cpu/all/usage", "nope"]);
        assert_eq!(data, vec![SensorData::new("cpu/all/usage", 0.0)]);
    }

    #[test]
    fn test_subscription_state() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();
        let client = ClientId::new("a");

        assert!(!tree.subscribe("cpu/all/missing", &client));
        assert!(tree.subscribe("cpu/all/usage", &client));
        assert!(tree.is_subscribed("cpu/all/usage"));
        assert!(tree.is_object_subscribed("cpu", "all"));

        assert!(tree.unsubscribe("cpu/all/usage", &client));
        assert!(!tree.unsubscribe("cpu/all/usage", &client));
        assert!(!tree.is_object_subscribed("cpu", "all"));
    }

    #[test]
    fn test_rollback_restores_owner_containers() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();
        tree.insert_container(disk_container(), "disk").unwrap();
        tree.take_events();

        let checkpoint = tree.checkpoint("disk");
        tree.set_value("disk/sda1/used", 90u64).unwrap();
        tree.remove_object("disk", "sdb1").unwrap();
        assert!(tree.has_events());

        tree.rollback(checkpoint);

        assert!(!tree.has_events());
        assert_eq!(tree.resolve("disk/sda1/used").unwrap().value(), Some(&SensorValue::UInt(25)));
        assert_eq!(tree.resolve("disk/all/used").unwrap().value(), Some(&SensorValue::UInt(75)));
        assert!(tree.resolve("disk/sdb1/used").is_some());
        assert!(tree.resolve("cpu/all/usage").is_some());
    }

    #[test]
    fn test_rollback_keeps_earlier_events() {
        let mut tree = SensorTree::new();
        tree.insert_container(cpu_container(), "cpu").unwrap();

        let checkpoint = tree.checkpoint("cpu");
        tree.set_value("cpu/all/usage", 5.0).unwrap();
        tree.rollback(checkpoint);

        assert_eq!(
            tree.take_events(),
            vec![TreeEvent::SensorAdded {
                path: "cpu/all/usage".to_string()
            }]
        );
        assert_eq!(tree.resolve("cpu/all/usage").unwrap().value(), Some(&SensorValue::Double(0.0)));
    }
}
