//! Containers and objects: the inner nodes of the sensor tree.

use std::collections::BTreeMap;

use crate::property::SensorProperty;

// ============================================================================
// Sensor Object
// ============================================================================

/// A named entity within a container (a disk volume, a network interface,
/// a CPU core) holding a set of properties.
#[derive(Debug, Clone)]
pub struct SensorObject {
    id: String,
    name: String,
    pub(crate) properties: BTreeMap<String, SensorProperty>,
}

impl SensorObject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Adds a property, replacing any property with the same id.
    #[must_use]
    pub fn with_property(mut self, property: SensorProperty) -> Self {
        self.properties.insert(property.id().to_string(), property);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn property(&self, id: &str) -> Option<&SensorProperty> {
        self.properties.get(id)
    }

    pub fn properties(&self) -> impl Iterator<Item = &SensorProperty> {
        self.properties.values()
    }

    /// True when any property has a subscriber.
    pub fn is_subscribed(&self) -> bool {
        self.properties.values().any(SensorProperty::is_subscribed)
    }

    pub(crate) fn property_mut(&mut self, id: &str) -> Option<&mut SensorProperty> {
        self.properties.get_mut(id)
    }
}

// ============================================================================
// Sensor Container
// ============================================================================

/// Top-level namespace of sensors contributed by one provider.
#[derive(Debug, Clone)]
pub struct SensorContainer {
    id: String,
    name: String,
    owner: String,
    pub(crate) objects: BTreeMap<String, SensorObject>,
}

impl SensorContainer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner: String::new(),
            objects: BTreeMap::new(),
        }
    }

    /// Adds an object, replacing any object with the same id.
    #[must_use]
    pub fn with_object(mut self, object: SensorObject) -> Self {
        self.objects.insert(object.id().to_string(), object);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the provider that registered this container.
    ///
    /// Empty until the container is inserted into a tree.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn object(&self, id: &str) -> Option<&SensorObject> {
        self.objects.get(id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SensorObject> {
        self.objects.values()
    }

    pub(crate) fn set_owner(&mut self, owner: &str) {
        self.owner = owner.to_string();
    }

    pub(crate) fn object_mut(&mut self, id: &str) -> Option<&mut SensorObject> {
        self.objects.get_mut(id)
    }
}
