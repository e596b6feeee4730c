//! Sensor path parsing.
//!
//! A sensor path has the form `container/object/property`. Parsing splits on
//! the first `/` (container), then on the last `/` (property). Whatever lies
//! between is the object id, which is empty when the path has exactly two
//! segments. Object ids never contain `/`, so paths with more than three
//! segments parse but never resolve.

use std::fmt;

/// The three segments of a sensor path, borrowed from the input string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorPath<'a> {
    pub container: &'a str,
    pub object: &'a str,
    pub property: &'a str,
}

impl<'a> SensorPath<'a> {
    /// Parses `path` into its segments.
    ///
    /// Returns `None` when there is no `/` at all or the property segment is
    /// empty.
    pub fn parse(path: &'a str) -> Option<Self> {
        let first = path.find('/')?;
        let last = path.rfind('/')?;

        let container = path.get(..first)?;
        let object = if first == last {
            ""
        } else {
            path.get(first + 1..last)?
        };
        let property = path.get(last + 1..)?;

        if property.is_empty() {
            return None;
        }

        Some(Self {
            container,
            object,
            property,
        })
    }
}

impl fmt::Display for SensorPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.container, self.object, self.property)
    }
}

/// Builds the `container/object` path of an object.
pub fn object_path(container: &str, object: &str) -> String {
    format!("{container}/{object}")
}

/// Builds the `container/object/property` path of a property.
pub fn property_path(container: &str, object: &str, property: &str) -> String {
    format!("{container}/{object}/{property}")
}
