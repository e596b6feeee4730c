//! Sensor values, value types and physical units.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Sensor Value
// ============================================================================

/// The current reading of a sensor.
///
/// Serialized untagged so clients see plain JSON numbers and strings.
/// Deserialization tries `UInt`, then `Int`, then `Double`, then `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    UInt(u64),
    Int(i64),
    Double(f64),
    Text(String),
}

impl SensorValue {
    /// Returns the value as a float, or `None` for text values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::UInt(v) => Some(*v as f64),
            Self::Int(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    /// Returns the type tag matching this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::UInt(_) => ValueType::UInt,
            Self::Int(_) => ValueType::Int,
            Self::Double(_) => ValueType::Double,
            Self::Text(_) => ValueType::Text,
        }
    }

    /// Sums numeric values, skipping text.
    ///
    /// Integer sums stay integral (saturating) as long as every summed value
    /// has the same integer type; any mix widens to `Double`.
    /// Returns `None` when there is nothing numeric to sum.
    pub fn sum<'a, I>(values: I) -> Option<SensorValue>
    where
        I: IntoIterator<Item = &'a SensorValue>,
    {
        let mut acc: Option<SensorValue> = None;

        for value in values {
            let next = match (&acc, value) {
                (_, Self::Text(_)) => continue,
                (None, v) => v.clone(),
                (Some(Self::UInt(a)), Self::UInt(b)) => Self::UInt(a.saturating_add(*b)),
                (Some(Self::Int(a)), Self::Int(b)) => Self::Int(a.saturating_add(*b)),
                (Some(a), b) => {
                    Self::Double(a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0))
                }
            };
            acc = Some(next);
        }

        acc
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UInt(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for SensorValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<u32> for SensorValue {
    fn from(v: u32) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<i64> for SensorValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for SensorValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for SensorValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<f32> for SensorValue {
    fn from(v: f32) -> Self {
        Self::Double(f64::from(v))
    }
}

impl From<String> for SensorValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for SensorValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// A `(path, value)` pair as delivered to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    pub path: String,
    pub value: SensorValue,
}

impl SensorData {
    pub fn new(path: impl Into<String>, value: impl Into<SensorValue>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Value Type
// ============================================================================

/// Declared type of a sensor's value, published as metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    UInt,
    Int,
    #[default]
    Double,
    Text,
}

// ============================================================================
// Unit
// ============================================================================

/// Physical unit of a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    None,
    Byte,
    ByteRate,
    Hertz,
    Percent,
    Celsius,
    Second,
    Watt,
    Volt,
    Rpm,
    Rate,
}

impl Unit {
    /// Short symbol used when printing values.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Byte => "B",
            Self::ByteRate => "B/s",
            Self::Hertz => "Hz",
            Self::Percent => "%",
            Self::Celsius => "°C",
            Self::Second => "s",
            Self::Watt => "W",
            Self::Volt => "V",
            Self::Rpm => "RPM",
            Self::Rate => "/s",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_keeps_integer_type() {
        let values = [SensorValue::UInt(10), SensorValue::UInt(32)];
        assert_eq!(SensorValue::sum(&values), Some(SensorValue::UInt(42)));
    }

    #[test]
    fn test_sum_widens_mixed_types() {
        let values = [SensorValue::UInt(1), SensorValue::Double(0.5)];
        assert_eq!(SensorValue::sum(&values), Some(SensorValue::Double(1.5)));
    }

    #[test]
    fn test_sum_skips_text_and_empty() {
        let values = [SensorValue::from("eth0"), SensorValue::Int(-3)];
        assert_eq!(SensorValue::sum(&values), Some(SensorValue::Int(-3)));
        assert_eq!(SensorValue::sum(&Vec::<SensorValue>::new()), None);
        assert_eq!(SensorValue::sum(&[SensorValue::from("x")]), None);
    }

    #[test]
    fn test_untagged_serialization() {
        let json = serde_json::to_string(&SensorValue::Double(42.5)).unwrap();
        assert_eq!(json, "42.5");

        let parsed: SensorValue = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, SensorValue::UInt(7));

        let parsed: SensorValue = serde_json::from_str("-7").unwrap();
        assert_eq!(parsed, SensorValue::Int(-7));

        let parsed: SensorValue = serde_json::from_str("\"sda1\"").unwrap();
        assert_eq!(parsed, SensorValue::Text("sda1".to_string()));
    }

    #[test]
    fn test_unit_symbol() {
        assert_eq!(Unit::ByteRate.to_string(), "B/s");
        assert_eq!(Unit::None.to_string(), "");
        assert_eq!(Unit::default(), Unit::None);
    }
}
