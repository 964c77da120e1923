//! Vector layer abstraction consumed by raster/vector hybrid calculators

use crate::error::{Error, Result};
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

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
            AttributeValue::Int(v) => Some(*v as f64),
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::String(s) => s.trim().parse().ok(),
            AttributeValue::Null => None,
        }
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
        }
    }
}

/// Feature-by-feature access to a vector dataset.
///
/// Drivers (OGR, GeoPackage, ...) implement this; [`FeatureCollection`] is
/// the in-memory implementation.
pub trait VectorLayer {
    fn feature_count(&self) -> usize;

    /// Geometry of feature `fid`
    fn geometry(&self, fid: usize) -> Result<Option<&Geometry<f64>>>;

    /// Read an attribute by field name
    fn field(&self, fid: usize, name: &str) -> Result<Option<&AttributeValue>>;

    /// Write an attribute, creating the field if needed
    fn set_field(&mut self, fid: usize, name: &str, value: AttributeValue) -> Result<()>;
}

/// Collection of features
#[derive(Debug, Clone, Default)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self { features: Vec::new() }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn feature(&self, fid: usize) -> Result<&Feature> {
        self.features
            .get(fid)
            .ok_or_else(|| Error::invalid_param("fid", fid, format!("layer has {} features", self.len())))
    }
}

impl VectorLayer for FeatureCollection {
    fn feature_count(&self) -> usize {
        self.len()
    }

    fn geometry(&self, fid: usize) -> Result<Option<&Geometry<f64>>> {
        Ok(self.feature(fid)?.geometry.as_ref())
    }

    fn field(&self, fid: usize, name: &str) -> Result<Option<&AttributeValue>> {
        Ok(self.feature(fid)?.properties.get(name))
    }

    fn set_field(&mut self, fid: usize, name: &str, value: AttributeValue) -> Result<()> {
        let count = self.len();
        let feature = self
            .features
            .get_mut(fid)
            .ok_or_else(|| Error::invalid_param("fid", fid, format!("layer has {} features", count)))?;
        feature.properties.insert(name.to_string(), value);
        Ok(())
    }
}
