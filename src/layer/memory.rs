//! In-memory vector layer

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{AggregateCalculator, AggregateKind, AggregateParameters, VectorLayer};
use crate::ast::values_equal;
use crate::core::error_code::EX0153;
use crate::core::{ExpressionError, Result, Tvl, Value};
use crate::evaluator::{ContextScope, EvaluationContext, Expression, StaticVariable};
use crate::feature::{Feature, Fields};
use crate::geometry::{GeometryType, Rect};

/// A layer whose features live in a `Vec`.
///
/// Aggregates are computed by evaluating the sub-expression and filter
/// with [`Expression`] once per feature, on top of the caller's context.
#[derive(Debug)]
pub struct MemoryLayer {
    id: String,
    name: String,
    fields: Arc<Fields>,
    features: RwLock<Vec<Feature>>,
    selection: RwLock<BTreeSet<i64>>,
}

impl MemoryLayer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        fields: impl Into<Arc<Fields>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            fields: fields.into(),
            features: RwLock::new(Vec::new()),
            selection: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn with_features(self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features.write().extend(features);
        self
    }

    pub fn add_feature(&self, feature: Feature) {
        self.features.write().push(feature);
    }

    /// Snapshot of every feature
    pub fn features(&self) -> Vec<Feature> {
        self.features.read().clone()
    }

    pub fn select(&self, ids: impl IntoIterator<Item = i64>) {
        self.selection.write().extend(ids);
    }

    pub fn deselect_all(&self) {
        self.selection.write().clear();
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::provider_error(EX0153, message, Some(self.id.clone()))
    }

    fn parse(&self, text: &str) -> Result<Expression> {
        let expression = Expression::new(text);
        if expression.is_valid() {
            Ok(expression)
        } else {
            Err(self.error(expression.parser_error_string()))
        }
    }

    fn scope_for(&self, feature: Feature) -> ContextScope {
        let mut scope = ContextScope::new("Aggregate");
        scope.add_variable(StaticVariable::new("layer_id", self.id.as_str()).read_only(true));
        scope.add_variable(StaticVariable::new("layer_name", self.name.as_str()).read_only(true));
        scope.set_fields(self.fields.clone());
        scope.set_feature(feature);
        scope
    }
}

impl VectorLayer for MemoryLayer {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Arc<Fields> {
        self.fields.clone()
    }

    fn feature_count(&self) -> i64 {
        self.features.read().len() as i64
    }

    fn selected_feature_ids(&self) -> Vec<i64> {
        self.selection.read().iter().copied().collect()
    }

    fn get_feature(&self, id: i64) -> Option<Feature> {
        self.features.read().iter().find(|f| f.id() == id).cloned()
    }

    fn find_feature(&self, attribute: &str, value: &Value) -> Option<Feature> {
        self.features
            .read()
            .iter()
            .find(|f| f.attribute(attribute).is_some_and(|v| values_equal(v, value)))
            .cloned()
    }

    fn aggregate(
        &self,
        kind: AggregateKind,
        expression: &str,
        parameters: &AggregateParameters,
        context: Option<&EvaluationContext>,
    ) -> Result<Value> {
        let mut sub_expression = self.parse(expression)?;
        let mut filter = match parameters.filter.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(self.parse(text)?),
            _ => None,
        };

        let mut context = context.cloned().unwrap_or_default();
        // Evaluation may call back into this layer, so no lock is held
        let features = self.features();
        log::trace!(
            "layer '{}': {} over {} features",
            self.id,
            kind,
            features.len()
        );

        let mut values = Vec::with_capacity(features.len());
        for feature in features {
            let mut guard = context.push_scope(self.scope_for(feature));
            if let Some(filter) = filter.as_mut() {
                let keep = filter.evaluate(&mut guard);
                if filter.has_eval_error() {
                    return Err(self.error(filter.eval_error_string()));
                }
                if !matches!(keep.to_tvl(), Ok(Tvl::True)) {
                    continue;
                }
            }
            let value = sub_expression.evaluate(&mut guard);
            if sub_expression.has_eval_error() {
                return Err(self.error(sub_expression.eval_error_string()));
            }
            values.push(value);
        }

        AggregateCalculator::calculate(kind, &values, &parameters.delimiter)
            .map_err(|message| self.error(message))
    }

    fn geometry_type(&self) -> GeometryType {
        self.features
            .read()
            .iter()
            .find_map(|f| f.geometry().map(|g| g.geometry_type()))
            .unwrap_or(GeometryType::Unknown)
    }

    fn extent(&self) -> Option<Rect> {
        self.features
            .read()
            .iter()
            .filter_map(|f| f.geometry().and_then(|g| g.bounding_box()))
            .reduce(|a, b| Rect {
                x_min: a.x_min.min(b.x_min),
                y_min: a.y_min.min(b.y_min),
                x_max: a.x_max.max(b.x_max),
                y_max: a.y_max.max(b.y_max),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Geometry, Point};
    use pretty_assertions::assert_eq;

    fn cities() -> MemoryLayer {
        let fields = Arc::new(Fields::from_names(["name", "pop"]));
        let feature = |id: i64, name: &str, pop: i64, x: f64| {
            Feature::new(id, fields.clone())
                .with_attributes(vec![Value::from(name), Value::Int(pop)])
                .with_geometry(Geometry::from(Point::new(x, 1.0)))
        };
        MemoryLayer::new("cities_1", "cities", fields.clone()).with_features([
            feature(1, "Oslo", 700, 0.0),
            feature(2, "Bergen", 280, 5.0),
            feature(3, "Tromso", 77, -2.0),
        ])
    }

    fn params(filter: Option<&str>, delimiter: &str) -> AggregateParameters {
        AggregateParameters {
            filter: filter.map(str::to_string),
            delimiter: delimiter.to_string(),
        }
    }

    #[test]
    fn test_sum_and_filter() {
        let layer = cities();
        let total = layer.aggregate(AggregateKind::Sum, "\"pop\"", &params(None, ""), None);
        assert_eq!(total.unwrap(), Value::Int(1057));

        let big = layer.aggregate(
            AggregateKind::Count,
            "\"pop\"",
            &params(Some("\"pop\" > 100"), ""),
            None,
        );
        assert_eq!(big.unwrap(), Value::Int(2));
    }

    #[test]
    fn test_concatenate_uses_delimiter() {
        let value = cities()
            .aggregate(AggregateKind::StringConcatenate, "name", &params(None, "|"), None)
            .unwrap();
        assert_eq!(value, Value::from("Oslo|Bergen|Tromso"));
    }

    #[test]
    fn test_invalid_sub_expression_is_provider_error() {
        let error = cities()
            .aggregate(AggregateKind::Sum, "pop +", &params(None, ""), None)
            .unwrap_err();
        assert_eq!(error.error_code(), EX0153);
    }

    #[test]
    fn test_lookup_and_selection() {
        let layer = cities();
        assert_eq!(layer.get_feature(2).map(|f| f.id()), Some(2));
        assert_eq!(
            layer.find_feature("name", &Value::from("Tromso")).map(|f| f.id()),
            Some(3)
        );
        assert!(layer.find_feature("name", &Value::from("Paris")).is_none());

        layer.select([3, 1]);
        assert_eq!(layer.selected_feature_ids(), vec![1, 3]);
        assert_eq!(layer.selected_feature_count(), 2);
        layer.deselect_all();
        assert_eq!(layer.selected_feature_count(), 0);
    }

    #[test]
    fn test_extent_and_properties() {
        let layer = cities();
        let extent = layer.extent().unwrap();
        assert_eq!((extent.x_min, extent.x_max), (-2.0, 5.0));
        assert_eq!(layer.geometry_type(), GeometryType::Point);
        assert_eq!(layer.property("feature_count"), Some(Value::Int(3)));
        assert_eq!(layer.property("name"), Some(Value::from("cities")));
    }
}
