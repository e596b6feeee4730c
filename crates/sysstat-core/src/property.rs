//! Sensor properties: the leaves of the sensor tree.

use std::collections::BTreeSet;

use crate::client::ClientId;
use crate::info::SensorInfo;
use crate::value::{SensorValue, Unit, ValueType};

// ============================================================================
// Property Kind
// ============================================================================

/// Which sibling objects an aggregate sensor combines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectMatch {
    /// Every other object in the container
    All,
    /// Every other object except the listed ids
    Except(Vec<String>),
    /// Only the listed ids
    Only(Vec<String>),
}

impl ObjectMatch {
    pub fn matches(&self, object_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Except(ids) => !ids.iter().any(|id| id == object_id),
            Self::Only(ids) => ids.iter().any(|id| id == object_id),
        }
    }
}

/// Defines how an aggregate sensor finds its constituents.
///
/// The aggregate sums property `property` of every matching object in the
/// same container. The aggregate's own object never participates, and only
/// plain (provider-set) properties are summed, so derived values never feed
/// back into each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub objects: ObjectMatch,
    pub property: String,
}

impl AggregateSpec {
    pub fn new(objects: ObjectMatch, property: impl Into<String>) -> Self {
        Self {
            objects,
            property: property.into(),
        }
    }
}

/// How a property obtains its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    /// Set directly by the owning provider
    Plain,
    /// Sum over matching sibling-object properties
    Aggregate(AggregateSpec),
    /// `base / base.max * 100` for a property in the same object
    Percentage { base: String },
}

impl PropertyKind {
    pub fn is_derived(&self) -> bool {
        !matches!(self, Self::Plain)
    }
}

// ============================================================================
// Sensor Property
// ============================================================================

/// A single sensor: value, metadata and the set of subscribed clients.
#[derive(Debug, Clone)]
pub struct SensorProperty {
    id: String,
    info: SensorInfo,
    value: Option<SensorValue>,
    kind: PropertyKind,
    subscribers: BTreeSet<ClientId>,
}

impl SensorProperty {
    /// Creates a plain property with no value yet.
    pub fn new(id: impl Into<String>, info: SensorInfo) -> Self {
        Self {
            id: id.into(),
            info,
            value: None,
            kind: PropertyKind::Plain,
            subscribers: BTreeSet::new(),
        }
    }

    /// Creates an aggregate property.
    pub fn aggregate(id: impl Into<String>, info: SensorInfo, spec: AggregateSpec) -> Self {
        Self {
            kind: PropertyKind::Aggregate(spec),
            ..Self::new(id, info)
        }
    }

    /// Creates a percentage property derived from `base` in the same object.
    pub fn percentage(id: impl Into<String>, name: impl Into<String>, base: impl Into<String>) -> Self {
        let info = SensorInfo::new(name)
            .with_unit(Unit::Percent)
            .with_min(0.0)
            .with_max(100.0)
            .with_value_type(ValueType::Double);

        Self {
            kind: PropertyKind::Percentage { base: base.into() },
            ..Self::new(id, info)
        }
    }

    /// Sets the initial value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<SensorValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info(&self) -> &SensorInfo {
        &self.info
    }

    /// Current value; `None` while the sensor has no valid reading.
    pub fn value(&self) -> Option<&SensorValue> {
        self.value.as_ref()
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// True when at least one client is subscribed.
    pub fn is_subscribed(&self) -> bool {
        !self.subscribers.is_empty()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &ClientId> {
        self.subscribers.iter()
    }

    /// Stores a new value.
    ///
    /// Returns true only if the value differs from the previous one.
    pub(crate) fn set_value(&mut self, value: Option<SensorValue>) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        true
    }

    /// Applies `update` to the metadata. Returns true if anything changed.
    pub(crate) fn update_info<F>(&mut self, update: F) -> bool
    where
        F: FnOnce(&mut SensorInfo),
    {
        let before = self.info.clone();
        update(&mut self.info);
        self.info != before
    }

    pub(crate) fn add_subscriber(&mut self, client: ClientId) -> bool {
        self.subscribers.insert(client)
    }

    pub(crate) fn remove_subscriber(&mut self, client: &ClientId) -> bool {
        self.subscribers.remove(client)
    }

    pub(crate) fn subscriber_list(&self) -> Vec<ClientId> {
        self.subscribers.iter().cloned().collect()
    }
}
