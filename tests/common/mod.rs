//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use feature_expression::evaluator::{global_scope, layer_scope};
use feature_expression::layer::{AggregateKind, AggregateParameters};
use feature_expression::{
    EvaluationContext, Expression, Feature, Fields, LayerStore, MemoryLayer, Result, Value,
    VectorLayer,
};

/// Layer that delegates to a [`MemoryLayer`] and counts aggregate requests
pub struct CountingLayer {
    inner: MemoryLayer,
    aggregate_calls: AtomicUsize,
}

impl CountingLayer {
    pub fn new(inner: MemoryLayer) -> Self {
        Self {
            inner,
            aggregate_calls: AtomicUsize::new(0),
        }
    }

    pub fn aggregate_calls(&self) -> usize {
        self.aggregate_calls.load(Ordering::SeqCst)
    }
}

impl VectorLayer for CountingLayer {
    fn id(&self) -> &str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fields(&self) -> Arc<Fields> {
        self.inner.fields()
    }

    fn feature_count(&self) -> i64 {
        self.inner.feature_count()
    }

    fn selected_feature_ids(&self) -> Vec<i64> {
        self.inner.selected_feature_ids()
    }

    fn get_feature(&self, id: i64) -> Option<Feature> {
        self.inner.get_feature(id)
    }

    fn find_feature(&self, attribute: &str, value: &Value) -> Option<Feature> {
        self.inner.find_feature(attribute, value)
    }

    fn aggregate(
        &self,
        kind: AggregateKind,
        expression: &str,
        parameters: &AggregateParameters,
        context: Option<&EvaluationContext>,
    ) -> Result<Value> {
        self.aggregate_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.aggregate(kind, expression, parameters, context)
    }
}

pub fn city_fields() -> Arc<Fields> {
    Arc::new(Fields::from_names(["name", "pop", "region"]))
}

pub fn city(fields: &Arc<Fields>, id: i64, name: &str, pop: i64, region: &str) -> Feature {
    Feature::new(id, fields.clone()).with_attributes(vec![
        Value::from(name),
        Value::Int(pop),
        Value::from(region),
    ])
}

/// Four cities in a counting layer named `cities`, registered in a store
/// and bound as the context layer
pub fn cities() -> (Arc<CountingLayer>, EvaluationContext) {
    let fields = city_fields();
    let layer = Arc::new(CountingLayer::new(
        MemoryLayer::new("cities_1", "cities", fields.clone()).with_features([
            city(&fields, 1, "Oslo", 700, "east"),
            city(&fields, 2, "Bergen", 280, "west"),
            city(&fields, 3, "Stavanger", 145, "west"),
            city(&fields, 4, "Tromso", 77, "north"),
        ]),
    ));
    let store = Arc::new(LayerStore::new());
    store.add_layer(layer.clone());

    let mut context =
        EvaluationContext::from_scopes(vec![global_scope(), layer_scope(layer.clone())]);
    context.set_layer_store(store);
    (layer, context)
}

/// Evaluate `text`, returning the value and the evaluation error string
pub fn eval(text: &str, context: &mut EvaluationContext) -> (Value, String) {
    let mut expression = Expression::new(text);
    assert!(expression.is_valid(), "{text}: {}", expression.parser_error_string());
    let value = expression.evaluate(context);
    (value, expression.eval_error_string())
}
