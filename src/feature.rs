//! Features and their attribute schema

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::core::Value;
use crate::geometry::Geometry;
use crate::quoting::quoted_value;

/// Kind of data stored in a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldType {
    Bool,
    Int,
    Double,
    #[default]
    String,
    Date,
    Time,
    DateTime,
}

/// A named attribute column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Ordered attribute schema shared between features of one layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fields {
    fields: Vec<Field>,
}

impl Fields {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Schema of string fields named `names`
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| Field::new(name, FieldType::String))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Index of a field: exact match first, then case-insensitive
    pub fn lookup_field(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.name.eq_ignore_ascii_case(name))
            })
    }
}

/// One row: identifier, attributes in field order, and optional geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    id: i64,
    fields: Arc<Fields>,
    attributes: Vec<Value>,
    geometry: Option<Arc<Geometry>>,
}

impl Feature {
    /// Feature with every attribute null
    pub fn new(id: i64, fields: Arc<Fields>) -> Self {
        let attributes = vec![Value::Null; fields.len()];
        Self {
            id,
            fields,
            attributes,
            geometry: None,
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Value>) -> Self {
        self.attributes = attributes;
        self.attributes.resize(self.fields.len(), Value::Null);
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(Arc::new(geometry));
        self
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn fields(&self) -> &Arc<Fields> {
        &self.fields
    }

    pub fn attributes(&self) -> &[Value] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.fields
            .lookup_field(name)
            .and_then(|index| self.attributes.get(index))
    }

    pub fn attribute_at(&self, index: usize) -> Option<&Value> {
        self.attributes.get(index)
    }

    /// Set an attribute by name; returns false when the field does not exist
    pub fn set_attribute(&mut self, name: &str, value: Value) -> bool {
        match self.fields.lookup_field(name) {
            Some(index) => {
                self.attributes[index] = value;
                true
            }
            None => false,
        }
    }

    pub fn geometry(&self) -> Option<&Arc<Geometry>> {
        self.geometry.as_ref()
    }

    pub fn has_geometry(&self) -> bool {
        self.geometry.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn set_geometry(&mut self, geometry: Option<Geometry>) {
        self.geometry = geometry.map(Arc::new);
    }

    /// Stable hash over the id, attributes and geometry text, used to key
    /// cache entries that depend on the current feature.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = rustc_hash::FxHasher::default();
        self.id.hash(&mut hasher);
        for value in &self.attributes {
            quoted_value(value).hash(&mut hasher);
        }
        if let Some(geometry) = &self.geometry {
            geometry.to_wkt().hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Feature {
        let fields = Arc::new(Fields::from_names(["name", "Population"]));
        Feature::new(7, fields).with_attributes(vec![Value::from("Oslo"), Value::Int(700_000)])
    }

    #[test]
    fn test_attribute_lookup_is_case_insensitive_fallback() {
        let feature = sample();
        assert_eq!(feature.attribute("population"), Some(&Value::Int(700_000)));
        assert_eq!(feature.attribute("missing"), None);
    }

    #[test]
    fn test_content_hash_tracks_attributes() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.content_hash(), b.content_hash());
        b.set_attribute("name", Value::from("Bergen"));
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
