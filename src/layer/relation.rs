//! Parent/child relations between layers

use crate::core::Value;
use crate::evaluator::Expression;
use crate::feature::Feature;

/// A one-to-many link from a referenced (parent) layer to a referencing
/// (child) layer, joined on one or more field pairs
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    id: String,
    name: String,
    referencing_layer: String,
    referenced_layer: String,
    /// (referencing field, referenced field)
    field_pairs: Vec<(String, String)>,
}

impl Relation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        referencing_layer: impl Into<String>,
        referenced_layer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            referencing_layer: referencing_layer.into(),
            referenced_layer: referenced_layer.into(),
            field_pairs: Vec::new(),
        }
    }

    pub fn with_field_pair(
        mut self,
        referencing_field: impl Into<String>,
        referenced_field: impl Into<String>,
    ) -> Self {
        self.field_pairs
            .push((referencing_field.into(), referenced_field.into()));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id of the child layer
    pub fn referencing_layer(&self) -> &str {
        &self.referencing_layer
    }

    /// Id of the parent layer
    pub fn referenced_layer(&self) -> &str {
        &self.referenced_layer
    }

    pub fn field_pairs(&self) -> &[(String, String)] {
        &self.field_pairs
    }

    pub fn is_valid(&self) -> bool {
        !self.id.is_empty() && !self.field_pairs.is_empty()
    }

    /// Filter text selecting the child features of `feature`
    ///
    /// Missing parent attributes, or a missing feature, compare as null.
    pub fn related_features_filter(&self, feature: Option<&Feature>) -> String {
        self.field_pairs
            .iter()
            .map(|(referencing, referenced)| {
                let value = feature
                    .and_then(|feature| feature.attribute(referenced))
                    .cloned()
                    .unwrap_or(Value::Null);
                Expression::create_field_equality_expression(referencing, &value)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::feature::Fields;

    #[test]
    fn test_related_features_filter() {
        let fields = Arc::new(Fields::from_names(["code", "zone"]));
        let parent = Feature::new(1, fields)
            .with_attributes(vec![Value::from("N'1"), Value::Null]);

        let single = Relation::new("r1", "districts", "districts_1", "regions_1")
            .with_field_pair("region_code", "code");
        assert!(single.is_valid());
        assert_eq!(single.related_features_filter(Some(&parent)), "\"region_code\" = 'N''1'");

        let pair = single.with_field_pair("zone", "zone");
        assert_eq!(
            pair.related_features_filter(Some(&parent)),
            "\"region_code\" = 'N''1' AND \"zone\" IS NULL"
        );
        assert_eq!(
            pair.related_features_filter(None),
            "\"region_code\" IS NULL AND \"zone\" IS NULL"
        );
    }

    #[test]
    fn test_relation_without_fields_is_invalid() {
        assert!(!Relation::new("r1", "r", "a", "b").is_valid());
    }
}
