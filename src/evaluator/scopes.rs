//! Ready-made scopes for the common evaluation setups

use std::sync::Arc;

use super::context::{ContextScope, EvaluationContext, StaticVariable};
use crate::core::Value;
use crate::feature::{Feature, Fields};
use crate::layer::VectorLayer;

fn version_number() -> i64 {
    let part = |text: &str| text.parse::<i64>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Process-wide constants
pub fn global_scope() -> ContextScope {
    let mut scope = ContextScope::new("Global");
    scope.add_variable(
        StaticVariable::new("expression_version", env!("CARGO_PKG_VERSION"))
            .read_only(true)
            .with_static(true),
    );
    scope.add_variable(
        StaticVariable::new("expression_version_no", version_number())
            .read_only(true)
            .with_static(true),
    );
    scope
}

/// Variables describing `layer`, plus its fields
pub fn layer_scope(layer: Arc<dyn VectorLayer>) -> ContextScope {
    let mut scope = ContextScope::new("Layer");
    scope.add_variable(
        StaticVariable::new("layer_name", layer.name())
            .read_only(true)
            .with_static(true),
    );
    scope.add_variable(
        StaticVariable::new("layer_id", layer.id())
            .read_only(true)
            .with_static(true),
    );
    scope.set_fields(layer.fields());
    scope.add_variable(
        StaticVariable::new("layer", Value::Layer(layer))
            .read_only(true)
            .with_static(true),
    );
    scope
}

/// Context holding just `feature` and `fields`
pub fn feature_context(
    feature: impl Into<Arc<Feature>>,
    fields: impl Into<Arc<Fields>>,
) -> EvaluationContext {
    let mut scope = ContextScope::new("Feature");
    scope.set_feature(feature);
    scope.set_fields(fields);
    EvaluationContext::from_scopes(vec![scope])
}

/// Built-in help text for well-known variables
pub fn variable_help_text(name: &str) -> &'static str {
    match name {
        "expression_version" => "Current version string of the expression engine.",
        "expression_version_no" => "Current version number of the expression engine.",
        "layer" => "The current layer.",
        "layer_name" => "Name of current layer.",
        "layer_id" => "ID of current layer.",
        "value" => "The current value being edited.",
        "parent" => "The feature of the layer an aggregate is evaluated from.",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_scope_is_static() {
        let scope = global_scope();
        assert!(scope.is_static("expression_version"));
        assert!(scope.is_read_only("expression_version_no"));
        assert_eq!(
            scope.variable("expression_version"),
            Value::from(env!("CARGO_PKG_VERSION"))
        );
    }

    #[test]
    fn test_feature_context() {
        let fields = Arc::new(Fields::from_names(["name"]));
        let feature = Feature::new(3, fields.clone()).with_attributes(vec![Value::from("x")]);
        let context = feature_context(feature, fields);
        assert_eq!(context.feature().map(|f| f.id()), Some(3));
        assert_eq!(context.fields().map(|f| f.len()), Some(1));
    }

    #[test]
    fn test_help_text_fallback() {
        let context = EvaluationContext::new();
        assert_eq!(context.description("layer_name"), "Name of current layer.");
        assert_eq!(context.description("unknown"), "");
    }
}
