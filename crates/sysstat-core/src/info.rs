//! Descriptive sensor metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::value::{Unit, ValueType};

/// Metadata published for every sensor path.
///
/// Containers and objects carry only a `name`; properties fill in the rest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SensorInfo {
    /// Display name (e.g. "Free Space")
    pub name: String,

    /// Compact display name (e.g. "Free")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Prefix shown before the name, usually the owning object's name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prefix: String,

    #[serde(default)]
    pub unit: Unit,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default)]
    pub value_type: ValueType,
}

/// Path → metadata mapping returned by discovery queries.
pub type SensorInfoMap = BTreeMap<String, SensorInfo>;

impl SensorInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    #[must_use]
    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    #[must_use]
    pub fn with_max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }
}
