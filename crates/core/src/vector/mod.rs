//! Vector features and their attribute tables
//!
//! A `FeatureCollection` is the in-memory form of a polygon layer such as a
//! waterbody shapefile or GeoJSON export: one geometry per row plus an ordered
//! attribute schema.

mod table;

pub use table::{AttributeKey, AttributeTable};

use crate::crs::CRS;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

static NULL: AttributeValue = AttributeValue::Null;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Int(i) => Some(*i as f64),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Hashable key used when counting distinct values
    pub fn key(&self) -> AttributeKey<'_> {
        AttributeKey::from(self)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, ""),
            AttributeValue::Bool(b) => write!(f, "{}", b),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Float(v) => write!(f, "{}", v),
            AttributeValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<i32> for AttributeValue {
    fn from(v: i32) -> Self {
        AttributeValue::Int(v as i64)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone, Default)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: BTreeMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder form of [`Feature::set_property`]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one attribute schema.
///
/// Column order is the order in which columns were declared or first seen;
/// features missing a column read as `Null` for it.
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    features: Vec<Feature>,
    columns: Vec<String>,
    crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection with a declared column order
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fc = Self::new();
        for c in columns {
            fc.declare_column(c);
        }
        fc
    }

    /// Append a column to the schema if it is not already present
    pub fn declare_column(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.columns.contains(&name) {
            self.columns.push(name);
        }
    }

    pub fn push(&mut self, feature: Feature) {
        for key in feature.properties.keys() {
            if !self.columns.iter().any(|c| c == key) {
                self.columns.push(key.clone());
            }
        }
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Values of one column in row order, `Null` where a feature lacks it
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a AttributeValue> + 'a {
        self.features
            .iter()
            .map(move |f| f.get_property(column).unwrap_or(&NULL))
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}

impl FromIterator<Feature> for FeatureCollection {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut fc = FeatureCollection::new();
        for f in iter {
            fc.push(f);
        }
        fc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_keeps_declared_order() {
        let mut fc = FeatureCollection::with_columns(["WB_ID", "UID"]);
        fc.push(Feature::empty().with_property("UID", "r3dp84s8n").with_property("area", 10.0));
        assert_eq!(fc.columns(), ["WB_ID", "UID", "area"]);
    }

    #[test]
    fn missing_property_reads_as_null() {
        let fc: FeatureCollection = vec![
            Feature::empty().with_property("FID", AttributeValue::Int(1)),
            Feature::empty(),
        ]
        .into_iter()
        .collect();

        let values: Vec<_> = fc.column_values("FID").collect();
        assert_eq!(values, vec![&AttributeValue::Int(1), &AttributeValue::Null]);
    }

    #[test]
    fn attribute_numeric_view() {
        assert_eq!(AttributeValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(AttributeValue::from("x").as_f64(), None);
        assert_eq!(AttributeValue::Null.to_string(), "");
    }
}
