//! Record functions: the current feature, feature lookups and selection

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::{FunctionContext, all_attributes};
use crate::core::{EvalError, EvalResult, Result, Value};
use crate::feature::Feature;
use crate::layer::VectorLayer;
use std::sync::Arc;

/// The layer held by the `layer` context variable
fn context_layer(call: &FunctionContext<'_>) -> Option<Arc<dyn VectorLayer>> {
    let variable = call.context.variable("layer");
    call.context.resolve_layer(&variable)
}

fn feature_arg(call: &FunctionContext<'_>, index: usize) -> Option<Arc<Feature>> {
    call.value(index).to_feature().ok()
}

fn is_selected(call: &FunctionContext<'_>) -> EvalResult<Value> {
    let (layer, feature) = match call.arg_count() {
        0 => (context_layer(call), call.context.feature()),
        1 => (context_layer(call), feature_arg(call, 0)),
        2 => (call.context.resolve_layer(call.value(0)), feature_arg(call, 1)),
        given => {
            return Err(EvalError::new(format!(
                "Function `is_selected` requires no more than two parameters. {given} given."
            )));
        }
    };
    let (Some(layer), Some(feature)) = (layer, feature) else {
        return Ok(Value::Null);
    };
    Ok(Value::Bool(layer.selected_feature_ids().contains(&feature.id())))
}

fn num_selected(call: &FunctionContext<'_>) -> EvalResult<Value> {
    let layer = match call.arg_count() {
        0 => context_layer(call),
        1 => call.context.resolve_layer(call.value(0)),
        given => {
            return Err(EvalError::new(format!(
                "Function `num_selected` requires no more than one parameter. {given} given."
            )));
        }
    };
    Ok(layer
        .map(|layer| Value::from(layer.selected_feature_count()))
        .unwrap_or_default())
}

impl FunctionRegistry {
    pub fn register_record_functions(&self) -> Result<()> {
        FunctionBuilder::new("$id", FunctionGroup::Record)
            .help("Returns the feature id of the current feature.")
            .arity(0)
            .is_static(false)
            .implementation(|call| {
                Ok(call.context.feature().map(|f| Value::Int(f.id())).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("$currentfeature", FunctionGroup::Record)
            .help("Returns the current feature being evaluated.")
            .arity(0)
            .is_static(false)
            .implementation(|call| {
                Ok(call.context.feature().map(Value::Feature).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("uuid", FunctionGroup::Record)
            .help("Generates a universally unique identifier, such as '{0bd2f60f-f157-4a6d-96af-d4ba4cb366a1}'.")
            .arity(0)
            .alias("$uuid")
            .is_static(false)
            .implementation(|_| Ok(Value::String(format!("{{{}}}", uuid::Uuid::new_v4()))))
            .register_builtin(self)?;
        FunctionBuilder::new("attribute", FunctionGroup::Record)
            .help("Returns the value of a named attribute of a feature.")
            .parameter("feature")
            .parameter("attribute_name")
            .referenced_columns(all_attributes())
            .implementation(|call| {
                let feature = call.feature(0)?;
                Ok(feature.attribute(&call.text(1)).cloned().unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("get_feature", FunctionGroup::Record)
            .help("Returns the first feature of a layer whose attribute matches a value.")
            .parameter("layer")
            .parameter("attribute")
            .parameter("value")
            .implementation(|call| {
                let Some(layer) = call.context.resolve_layer(call.value(0)) else {
                    return Ok(Value::Null);
                };
                let attribute = call.text(1);
                if layer.fields().lookup_field(&attribute).is_none() {
                    return Ok(Value::Null);
                }
                Ok(layer
                    .find_feature(&attribute, call.value(2))
                    .map(Value::from)
                    .unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("get_feature_by_id", FunctionGroup::Record)
            .help("Returns the feature with an id on a layer.")
            .parameter("layer")
            .parameter("feature_id")
            .implementation(|call| {
                let Some(layer) = call.context.resolve_layer(call.value(0)) else {
                    return Ok(Value::Null);
                };
                Ok(layer.get_feature(call.int(1)?).map(Value::from).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("is_selected", FunctionGroup::Record)
            .help("Returns true if a feature is selected, by default the current feature on the current layer.")
            .variadic()
            .is_static(false)
            .implementation(|call| is_selected(call))
            .register_builtin(self)?;
        FunctionBuilder::new("num_selected", FunctionGroup::Record)
            .help("Returns the number of selected features on a layer, by default the current layer.")
            .variadic()
            .implementation(|call| num_selected(call))
            .register_builtin(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::evaluator::{EvaluationContext, Expression, layer_scope};
    use crate::feature::Fields;
    use crate::layer::{LayerStore, MemoryLayer};

    fn setup() -> (Arc<MemoryLayer>, EvaluationContext) {
        let fields = Arc::new(Fields::from_names(["code", "label"]));
        let row = |id: i64, code: i64, label: &str| {
            Feature::new(id, fields.clone())
                .with_attributes(vec![Value::Int(code), Value::from(label)])
        };
        let layer = Arc::new(
            MemoryLayer::new("zones_1", "zones", fields.clone())
                .with_features([row(10, 1, "north"), row(11, 2, "south"), row(12, 3, "west")]),
        );
        layer.select([11, 12]);
        let store = Arc::new(LayerStore::new());
        store.add_layer(layer.clone());

        let mut context = EvaluationContext::from_scopes(vec![layer_scope(layer.clone())]);
        context.set_layer_store(store);
        context.set_feature(row(11, 2, "south"));
        (layer, context)
    }

    fn eval(text: &str, context: &mut EvaluationContext) -> (Value, String) {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(context);
        (value, expression.eval_error_string())
    }

    #[rstest]
    #[case("$id", Value::Int(11))]
    #[case("attribute($currentfeature, 'label')", Value::from("south"))]
    #[case("attribute($currentfeature, 'missing')", Value::Null)]
    #[case("attribute(get_feature('zones', 'code', 3), 'label')", Value::from("west"))]
    #[case("attribute(get_feature('zones_1', 'label', 'north'), 'code')", Value::Int(1))]
    #[case("get_feature('zones', 'code', 99)", Value::Null)]
    #[case("get_feature('zones', 'nope', 1)", Value::Null)]
    #[case("get_feature('rivers', 'code', 1)", Value::Null)]
    #[case("attribute(get_feature_by_id('zones', 12), 'code')", Value::Int(3))]
    #[case("get_feature_by_id('zones', 42)", Value::Null)]
    #[case("is_selected()", Value::Bool(true))]
    #[case("is_selected(get_feature_by_id('zones', 10))", Value::Bool(false))]
    #[case("is_selected('zones', get_feature_by_id('zones', 12))", Value::Bool(true))]
    #[case("num_selected()", Value::Int(2))]
    #[case("num_selected('zones_1')", Value::Int(2))]
    #[case("num_selected('rivers')", Value::Null)]
    fn test_record_functions(#[case] text: &str, #[case] expected: Value) {
        let (_, mut context) = setup();
        assert_eq!(eval(text, &mut context), (expected, String::new()));
    }

    #[test]
    fn test_selection_argument_count_errors() {
        let (_, mut context) = setup();
        assert_eq!(
            eval("is_selected('zones', $currentfeature, 3)", &mut context),
            (
                Value::Null,
                "Function `is_selected` requires no more than two parameters. 3 given.".to_string()
            )
        );
        assert_eq!(
            eval("num_selected('zones', 1)", &mut context),
            (
                Value::Null,
                "Function `num_selected` requires no more than one parameter. 2 given.".to_string()
            )
        );
    }

    #[test]
    fn test_without_feature() {
        let mut context = EvaluationContext::new();
        assert_eq!(eval("$id", &mut context), (Value::Null, String::new()));
        assert_eq!(eval("is_selected()", &mut context), (Value::Null, String::new()));
    }

    #[test]
    fn test_uuid_format() {
        let (value, _) = eval("$uuid", &mut EvaluationContext::new());
        let text = value.to_text();
        assert_eq!(text.len(), 38);
        assert!(text.starts_with('{') && text.ends_with('}'));
        assert_ne!(eval("uuid()", &mut EvaluationContext::new()).0, value);
    }

    #[test]
    fn test_attribute_reads_every_column() {
        let expression = Expression::new("attribute($currentfeature, 'label')");
        assert!(
            expression
                .referenced_columns()
                .contains(crate::registry::function::ALL_ATTRIBUTES)
        );
    }
}
