//! General functions: variables, nested evaluation and layer metadata

use super::FunctionRegistry;
use super::builder::{FunctionBuilder, FunctionGroup};
use super::function::all_attributes;
use crate::ast::{ExpressionNode, FunctionCallNode};
use crate::core::{EvalError, Result, Value};
use crate::evaluator::{ContextScope, EvaluationContext, Expression};

const WITH_VARIABLE_SCOPE: &str = "with_variable";

fn temporary_scope(name: String, value: Value, is_static: bool) -> ContextScope {
    let mut scope = ContextScope::new(WITH_VARIABLE_SCOPE);
    scope.set_variable(name, value, is_static);
    scope
}

/// Name and value of a static `with_variable` binding
fn static_binding(
    name: &ExpressionNode,
    value: &ExpressionNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> Option<(String, Value)> {
    if !name.is_static(parent, context) || !value.is_static(parent, context) {
        return None;
    }
    let name = name.eval(parent, context).ok()?.to_text();
    let value = value.eval(parent, context).ok()?;
    Some((name, value))
}

fn var_is_static(
    node: &FunctionCallNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> bool {
    let Some(argument) = node.arguments.first() else {
        return false;
    };
    if !argument.is_static(parent, context) {
        return false;
    }
    let Ok(name) = argument.eval(parent, context).map(|value| value.to_text()) else {
        return false;
    };
    context
        .active_scope_for_variable(&name)
        .is_some_and(|scope| scope.is_static(&name))
}

fn eval_is_static(
    node: &FunctionCallNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> bool {
    let Some(argument) = node.arguments.first() else {
        return false;
    };
    if !argument.is_static(parent, context) {
        return false;
    }
    let Ok(text) = argument.eval(parent, context).map(|value| value.to_text()) else {
        return false;
    };
    let inner = Expression::new(text);
    inner.root_node().is_some_and(|root| root.is_static(&inner, context))
}

fn with_variable_is_static(
    node: &FunctionCallNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> bool {
    let [name, value, body] = node.arguments.as_slice() else {
        return false;
    };
    let Some((name, value)) = static_binding(name, value, parent, context) else {
        return false;
    };
    context.with_scope(temporary_scope(name, value, true), |context| {
        body.is_static(parent, context)
    })
}

fn prepare_with_variable(
    node: &FunctionCallNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> bool {
    let [name, value, body] = node.arguments.as_slice() else {
        return false;
    };
    if name.prepare(parent, context).is_err() || value.prepare(parent, context).is_err() {
        return false;
    }
    let Ok(name) = name.eval(parent, context).map(|value| value.to_text()) else {
        return false;
    };
    // the value may depend on the feature; bind null until evaluation
    let value = value.eval(parent, context).unwrap_or_default();
    context.with_scope(temporary_scope(name, value, false), |context| {
        body.prepare(parent, context).is_ok()
    })
}

impl FunctionRegistry {
    pub fn register_general_functions(&self) -> Result<()> {
        FunctionBuilder::new("layer_property", FunctionGroup::General)
            .help("Returns a matching layer property or metadata value: name, id, feature_count, geometry_type or extent.")
            .parameter("layer")
            .parameter("property")
            .implementation(|call| {
                let Some(layer) = call.context.resolve_layer(call.value(0)) else {
                    return Ok(Value::Null);
                };
                Ok(layer.property(&call.text(1)).unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("var", FunctionGroup::General)
            .help("Returns the value stored within a specified variable.")
            .parameter("name")
            .static_when(var_is_static)
            .implementation(|call| Ok(call.context.variable(&call.text(0))))
            .register_builtin(self)?;
        FunctionBuilder::new("eval", FunctionGroup::General)
            .help("Evaluates an expression which is passed in a string.")
            .parameter("expression")
            .uses_geometry(true)
            .referenced_columns(all_attributes())
            .static_when(eval_is_static)
            .implementation(|call| {
                let mut inner = Expression::new(call.text(0));
                let value = inner.evaluate(call.context);
                match inner.eval_error_string() {
                    error if error.is_empty() => Ok(value),
                    error => Err(EvalError::new(error)),
                }
            })
            .register_builtin(self)?;
        FunctionBuilder::new("env", FunctionGroup::General)
            .help("Gets an environment variable and returns its content as a string, or null when it is not set.")
            .parameter("name")
            .implementation(|call| {
                Ok(std::env::var(call.text(0))
                    .map(Value::String)
                    .unwrap_or_default())
            })
            .register_builtin(self)?;
        FunctionBuilder::new("with_variable", FunctionGroup::General)
            .help("Sets a variable for any expression code provided as the third argument.")
            .parameter("name")
            .parameter("value")
            .parameter("expression")
            .lazy()
            .static_when(with_variable_is_static)
            .prepare_with(prepare_with_variable)
            .implementation(|call| {
                let name = call.eval_arg(0)?.to_text();
                let value = call.eval_arg(1)?;
                let Some(body) = call.node(2) else {
                    return Ok(Value::Null);
                };
                let parent = call.parent;
                call.context
                    .with_scope(temporary_scope(name, value, false), |context| {
                        body.eval(parent, context)
                    })
            })
            .register_builtin(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::sync::Arc;

    use super::*;
    use crate::evaluator::layer_scope;
    use crate::feature::Fields;
    use crate::layer::{LayerStore, MemoryLayer};

    fn eval(text: &str, context: &mut EvaluationContext) -> (Value, String) {
        let mut expression = Expression::new(text);
        let value = expression.evaluate(context);
        (value, expression.eval_error_string())
    }

    fn context_with_constant() -> EvaluationContext {
        let mut scope = ContextScope::new("test");
        scope.set_variable("answer", 42, true);
        scope.set_variable("moving", "x", false);
        EvaluationContext::from_scopes(vec![scope])
    }

    fn is_static(text: &str, context: &mut EvaluationContext) -> bool {
        let expression = Expression::new(text);
        let root = expression.root_node().cloned();
        root.is_some_and(|root| root.is_static(&expression, context))
    }

    #[rstest]
    #[case("var('answer')", Value::Int(42))]
    #[case("var('missing')", Value::Null)]
    #[case("eval('1 + 2')", Value::Int(3))]
    #[case("eval('@answer * 2')", Value::Int(84))]
    #[case("with_variable('a', 5, a + 1)", Value::Int(6))]
    #[case("with_variable('a', 5, @a * @answer)", Value::Int(210))]
    #[case("with_variable('a', 2, with_variable('b', 3, @a + @b))", Value::Int(5))]
    fn test_general_functions(#[case] text: &str, #[case] expected: Value) {
        let mut context = context_with_constant();
        assert_eq!(eval(text, &mut context), (expected, String::new()));
    }

    #[test]
    fn test_with_variable_restores_scopes() {
        let mut context = context_with_constant();
        let depth = context.scope_count();
        assert_eq!(eval("with_variable('a', 5, a + 1)", &mut context).0, Value::Int(6));
        assert_eq!(context.scope_count(), depth);
        assert_eq!(eval("var('a')", &mut context).0, Value::Null);

        let (value, error) = eval("with_variable('a', 5, eval('1 +'))", &mut context);
        assert_eq!(value, Value::Null);
        assert!(!error.is_empty());
        assert_eq!(context.scope_count(), depth);
    }

    #[test]
    fn test_eval_propagates_inner_error() {
        let (value, error) = eval("eval('1 / to_int(''x'')')", &mut EvaluationContext::new());
        assert_eq!(value, Value::Null);
        assert!(!error.is_empty());
    }

    #[test]
    fn test_env() {
        let (value, _) = eval(
            "env('FEATURE_EXPRESSION_SURELY_UNSET_VARIABLE')",
            &mut EvaluationContext::new(),
        );
        assert_eq!(value, Value::Null);
        if let Ok(path) = std::env::var("PATH") {
            assert_eq!(eval("env('PATH')", &mut EvaluationContext::new()).0, Value::String(path));
        }
    }

    #[test]
    fn test_layer_property() {
        let fields = Arc::new(Fields::from_names(["code"]));
        let layer = Arc::new(MemoryLayer::new("zones_1", "zones", fields));
        let store = Arc::new(LayerStore::new());
        store.add_layer(layer.clone());
        let mut context = EvaluationContext::from_scopes(vec![layer_scope(layer)]);
        context.set_layer_store(store);

        assert_eq!(eval("layer_property('zones', 'id')", &mut context).0, Value::from("zones_1"));
        assert_eq!(eval("layer_property(@layer, 'name')", &mut context).0, Value::from("zones"));
        assert_eq!(eval("layer_property('zones', 'feature_count')", &mut context).0, Value::Int(0));
        assert_eq!(eval("layer_property('zones', 'colour')", &mut context).0, Value::Null);
        assert_eq!(eval("layer_property('rivers', 'name')", &mut context).0, Value::Null);
    }

    #[rstest]
    #[case("var('answer')", true)]
    #[case("var('moving')", false)]
    #[case("var('missing')", false)]
    #[case("eval('1 + @answer')", true)]
    #[case("eval('@moving')", false)]
    #[case("with_variable('a', 5, @a + 1)", true)]
    #[case("with_variable('a', @moving, @a)", false)]
    #[case("with_variable('a', 5, @a + $id)", false)]
    fn test_static_ness(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(is_static(text, &mut context_with_constant()), expected);
    }

    #[test]
    fn test_prepare_binds_temporary_variable() {
        let mut context = context_with_constant();
        context.set_fields(Fields::from_names(["code"]));
        let mut expression = Expression::new("with_variable('a', 5, a + code)");
        assert!(expression.prepare(&mut context));
        assert_eq!(context.scope_count(), 1);
    }
}
