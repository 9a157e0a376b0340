//! Quoted literals and column references read back as what was quoted

use feature_expression::evaluator::feature_context;
use feature_expression::{
    EvaluationContext, Expression, Feature, Fields, Value, quoted_column_ref, quoted_string,
    quoted_value,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::sync::Arc;

fn evaluate(text: &str, context: &mut EvaluationContext) -> Value {
    let mut expression = Expression::new(text);
    assert!(expression.is_valid(), "{text}: {}", expression.parser_error_string());
    expression.evaluate(context)
}

#[rstest]
#[case("plain")]
#[case("")]
#[case("it's")]
#[case("''")]
#[case("back\\slash")]
#[case("trailing\\")]
#[case("line\nbreak")]
#[case("tab\tstop")]
#[case("mixed 'quotes', \\n literal and \t real tab")]
#[case("unicode ✓ ünïcödé")]
fn test_quoted_string_round_trips(#[case] original: &str) {
    let text = quoted_string(original);
    assert_eq!(
        evaluate(&text, &mut EvaluationContext::new()),
        Value::from(original),
        "{text}"
    );
}

#[rstest]
#[case(Value::Null)]
#[case(Value::Bool(true))]
#[case(Value::Int(-42))]
#[case(Value::Double(2.5))]
#[case(Value::from("o'clock"))]
#[case(Value::Array(vec![Value::Int(1), Value::from("a\\b"), Value::Array(vec![Value::Null])]))]
fn test_quoted_value_round_trips(#[case] original: Value) {
    let text = quoted_value(&original);
    assert_eq!(evaluate(&text, &mut EvaluationContext::new()), original, "{text}");
}

#[rstest]
#[case("name")]
#[case("with space")]
#[case("quote\"inside")]
fn test_quoted_column_ref_reads_the_column(#[case] column: &str) {
    let fields = Arc::new(Fields::from_names([column]));
    let feature = Feature::new(1, fields.clone()).with_attributes(vec![Value::from("found")]);
    let mut context = feature_context(feature, fields);
    assert_eq!(
        evaluate(&quoted_column_ref(column), &mut context),
        Value::from("found")
    );
}

#[test]
fn test_field_equality_filters_match() {
    let text = Expression::create_field_equality_expression("label", &Value::from("a'b"));
    let fields = Arc::new(Fields::from_names(["label"]));
    let feature = Feature::new(1, fields.clone()).with_attributes(vec![Value::from("a'b")]);
    let mut context = feature_context(feature, fields);
    assert_eq!(evaluate(&text, &mut context), Value::Bool(true));
}
