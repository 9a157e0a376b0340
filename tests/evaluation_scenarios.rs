//! End-to-end behavior of the expression handle and context

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{cities, city, city_fields, eval};
use feature_expression::evaluator::feature_context;
use feature_expression::{
    ContextScope, EvaluationContext, Expression, FunctionBuilder, FunctionGroup, FunctionRegistry,
    Value, VectorLayer,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case("1 + 1", Value::Int(2))]
#[case("coalesce(NULL, NULL, 'x')", Value::from("x"))]
#[case("min(3, NULL, 1)", Value::Null)]
#[case("round(2.345, 2)", Value::Double(2.35))]
#[case("log(10, 0)", Value::Null)]
#[case("if(true, 1, to_int('boom'))", Value::Int(1))]
#[case("if(false, to_int('boom'), 2)", Value::Int(2))]
#[case("with_variable('a', 5, a + 1)", Value::Int(6))]
fn test_concrete_scenarios(#[case] text: &str, #[case] expected: Value) {
    let mut context = EvaluationContext::new();
    assert_eq!(eval(text, &mut context), (expected, String::new()));
}

#[test]
fn test_with_variable_does_not_leak() {
    let mut context = EvaluationContext::new();
    let depth = context.scope_count();

    assert_eq!(eval("with_variable('a', 5, a + 1)", &mut context).0, Value::Int(6));
    assert_eq!(context.scope_count(), depth);

    let (value, error) = eval("a", &mut context);
    assert_eq!(value, Value::Null);
    assert!(!error.is_empty());
    assert_eq!(eval("@a", &mut context), (Value::Null, String::new()));
}

#[test]
fn test_with_variable_pops_scope_on_error() {
    let mut context = EvaluationContext::from_scopes(vec![ContextScope::new("base")]);
    let (value, error) = eval("with_variable('a', 5, to_int('x' || @a))", &mut context);
    assert_eq!(value, Value::Null);
    assert!(!error.is_empty());
    assert_eq!(context.scope_count(), 1);
}

static STUB_CALLS: AtomicUsize = AtomicUsize::new(0);

#[test]
fn test_null_arguments_skip_native_logic() {
    let stub = FunctionBuilder::new("null_propagation_stub", FunctionGroup::Custom)
        .parameter("first")
        .parameter("second")
        .implementation(|call| {
            STUB_CALLS.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(call.text(0) + &call.text(1)))
        })
        .build();
    assert!(FunctionRegistry::global().register(Arc::new(stub), true));

    let mut context = EvaluationContext::new();
    assert_eq!(eval("null_propagation_stub(NULL, 'b')", &mut context).0, Value::Null);
    assert_eq!(eval("null_propagation_stub('a', NULL)", &mut context).0, Value::Null);
    assert_eq!(STUB_CALLS.load(Ordering::SeqCst), 0);

    assert_eq!(eval("null_propagation_stub('a', 'b')", &mut context).0, Value::from("ab"));
    assert_eq!(STUB_CALLS.load(Ordering::SeqCst), 1);
    assert!(FunctionRegistry::global().unregister("null_propagation_stub"));
}

/// Every built-in that does not handle nulls returns null for null input
#[test]
fn test_builtins_propagate_null() {
    let registry = FunctionRegistry::global();
    let mut context = EvaluationContext::new();
    for function in registry.functions() {
        let signature = function.signature();
        let skipped = !registry.is_builtin(function.name())
            || function.handles_null()
            || function.lazy_eval()
            || signature.is_variadic();
        if skipped {
            continue;
        }
        let count = signature.max_args().unwrap_or_default();
        if count == 0 {
            continue;
        }
        let text = format!("{}({})", function.name(), vec!["NULL"; count].join(", "));
        assert_eq!(eval(&text, &mut context), (Value::Null, String::new()), "{text}");
    }
}

#[test]
fn test_feature_attributes_and_fields() {
    let fields = city_fields();
    let mut context = feature_context(city(&fields, 7, "Bodo", 52, "north"), fields);

    assert_eq!(
        eval("\"name\" || ' (' || \"pop\" || ')'", &mut context).0,
        Value::from("Bodo (52)")
    );
    assert_eq!(eval("$id", &mut context).0, Value::Int(7));
    assert_eq!(eval("\"region\" IN ('north', 'south')", &mut context).0, Value::Bool(true));

    let (value, error) = eval("\"altitude\"", &mut context);
    assert_eq!(value, Value::Null);
    assert_eq!(error, "Column 'altitude' not found");
}

#[test]
fn test_prepare_then_evaluate_per_feature() {
    let (layer, mut context) = cities();
    let fields = city_fields();
    context.set_fields(fields.clone());

    let mut expression = Expression::new("\"pop\" * 100 / sum(\"pop\")");
    assert!(expression.prepare(&mut context), "{}", expression.eval_error_string());

    let shares: Vec<Value> = (1..=4)
        .filter_map(|id| layer.get_feature(id))
        .map(|feature| {
            context.set_feature(feature);
            expression.evaluate(&mut context)
        })
        .collect();
    assert_eq!(shares.len(), 4);
    assert!(shares.iter().all(|share| matches!(share, Value::Double(_))));
    assert_eq!(layer.aggregate_calls(), 1);
}

#[test]
fn test_retry_parse_at_prepare() {
    let mut expression = Expression::new("late_registered_twice(21)");
    assert!(expression.has_parser_error());

    let late = FunctionBuilder::new("late_registered_twice", FunctionGroup::Custom)
        .parameter("value")
        .implementation(|call| Ok(Value::Int(call.int(0)? * 2)))
        .build();
    assert!(FunctionRegistry::global().register(Arc::new(late), true));

    let mut context = EvaluationContext::new();
    assert!(expression.prepare(&mut context));
    assert!(!expression.has_parser_error());
    assert_eq!(expression.evaluate(&mut context), Value::Int(42));
    assert!(FunctionRegistry::global().unregister("late_registered_twice"));
}

#[test]
fn test_error_state_is_cleared_between_evaluations() {
    let mut context = EvaluationContext::new();
    context.append_scope(ContextScope::new("values"));
    let mut expression = Expression::new("to_int(@input)");

    if let Some(scope) = context.last_scope_mut() {
        scope.set_variable("input", "nope", false);
    }
    assert_eq!(expression.evaluate(&mut context), Value::Null);
    assert!(expression.has_eval_error());

    if let Some(scope) = context.last_scope_mut() {
        scope.set_variable("input", "12", false);
    }
    assert_eq!(expression.evaluate(&mut context), Value::Int(12));
    assert!(!expression.has_eval_error());
}
