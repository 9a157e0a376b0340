//! The expression handle: source text, parsed tree and error state
//!
//! An [`Expression`] is parsed once at construction. Evaluation never
//! panics or returns `Err`: failures are recorded on the handle and the
//! result is null, so callers check [`Expression::has_eval_error`] the same
//! way after every call.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::config::ExpressionConfig;
use super::context::EvaluationContext;
use super::scopes::global_scope;
use crate::ast::ExpressionNode;
use crate::core::{EX0051, EX0054, ExpressionError, Result, Value};
use crate::feature::Fields;
use crate::geometry::{AreaUnit, DistanceArea, DistanceUnit};
use crate::parser;
use crate::quoting::{quoted_column_ref, quoted_value};
use crate::registry::{ALL_ATTRIBUTES, ColumnSet, FunctionRegistry};

const NO_ROOT_NODE: &str = "No root node! Parsing failed?";

/// Longest text shown by [`Expression::format_preview_string`] before truncation
const MAX_PREVIEW: usize = 60;

static EXPRESSION_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[%([^\]]+)%\]").expect("expression block pattern is valid"));

/// A parsed expression plus its error state and measurement settings.
///
/// Cloning shares the parsed tree; [`Expression::set_expression`] builds a
/// fresh one.
#[derive(Clone)]
pub struct Expression {
    root: Option<Arc<ExpressionNode>>,
    /// Source text; `None` for handles built from a node
    source: Option<String>,
    parser_error: Option<ExpressionError>,
    eval_error: Option<String>,
    calculator: Option<Arc<dyn DistanceArea>>,
    distance_unit: DistanceUnit,
    area_unit: AreaUnit,
    config: ExpressionConfig,
}

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_config(text, ExpressionConfig::default())
    }

    pub fn with_config(text: impl Into<String>, config: ExpressionConfig) -> Self {
        let mut expression = Self {
            root: None,
            source: None,
            parser_error: None,
            eval_error: None,
            calculator: None,
            distance_unit: config.distance_unit,
            area_unit: config.area_unit,
            config,
        };
        expression.set_expression(text);
        expression
    }

    /// Handle around an already built tree
    pub fn from_node(node: ExpressionNode) -> Self {
        let config = ExpressionConfig::default();
        Self {
            root: Some(Arc::new(node)),
            source: None,
            parser_error: None,
            eval_error: None,
            calculator: None,
            distance_unit: config.distance_unit,
            area_unit: config.area_unit,
            config,
        }
    }

    /// Replace the source text and re-parse; clears the evaluation error
    pub fn set_expression(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.eval_error = None;
        self.parse_source(&text);
        self.source = Some(text);
    }

    fn parse_source(&mut self, text: &str) {
        match parser::parse_with_config(text, self.config.parser) {
            Ok(node) => {
                self.root = Some(Arc::new(node));
                self.parser_error = None;
            }
            Err(error) => {
                log::debug!("failed to parse expression '{text}': {error}");
                self.root = None;
                self.parser_error = Some(error.into_expression_error(text));
            }
        }
    }

    /// Source text, or the dump of the tree for node-built handles
    pub fn expression(&self) -> String {
        match &self.source {
            Some(text) => text.clone(),
            None => self.dump(),
        }
    }

    pub fn config(&self) -> &ExpressionConfig {
        &self.config
    }

    pub fn is_valid(&self) -> bool {
        self.root.is_some()
    }

    pub fn has_parser_error(&self) -> bool {
        self.parser_error.is_some()
    }

    /// Parser error message, empty when parsing succeeded
    pub fn parser_error_string(&self) -> String {
        self.parser_error
            .as_ref()
            .map(|e| e.message().to_string())
            .unwrap_or_default()
    }

    pub fn parser_error(&self) -> Option<&ExpressionError> {
        self.parser_error.as_ref()
    }

    pub fn root_node(&self) -> Option<&ExpressionNode> {
        self.root.as_deref()
    }

    /// One-time setup against `context` before evaluating many features.
    ///
    /// A handle whose constructor-time parse failed is parsed again first,
    /// since functions may have been registered in the meantime.
    pub fn prepare(&mut self, context: &mut EvaluationContext) -> bool {
        self.eval_error = None;
        if self.root.is_none() && self.config.retry_parse_on_prepare {
            if let Some(text) = self.source.clone() {
                log::debug!("retrying parse of '{text}' at prepare time");
                self.parse_source(&text);
            }
        }

        let Some(root) = self.root.clone() else {
            self.eval_error = Some(NO_ROOT_NODE.to_string());
            return false;
        };
        match root.prepare(self, context) {
            Ok(()) => true,
            Err(error) => {
                self.eval_error = Some(error.into_message());
                false
            }
        }
    }

    /// Evaluate against `context`; null plus an eval error on failure
    pub fn evaluate(&mut self, context: &mut EvaluationContext) -> Value {
        self.eval_error = None;
        let Some(root) = self.root.clone() else {
            self.eval_error = Some(NO_ROOT_NODE.to_string());
            return Value::Null;
        };
        match root.eval(self, context) {
            Ok(value) => value,
            Err(error) => {
                self.eval_error = Some(error.into_message());
                Value::Null
            }
        }
    }

    /// Evaluate against an empty context
    pub fn evaluate_without_context(&mut self) -> Value {
        self.evaluate(&mut EvaluationContext::new())
    }

    pub fn has_eval_error(&self) -> bool {
        self.eval_error.is_some()
    }

    /// Evaluation error message, empty when the last evaluation succeeded
    pub fn eval_error_string(&self) -> String {
        self.eval_error.clone().unwrap_or_default()
    }

    pub fn set_eval_error_string(&mut self, message: impl Into<String>) {
        self.eval_error = Some(message.into());
    }

    /// Source-equivalent text of the tree, empty without one
    pub fn dump(&self) -> String {
        self.root.as_ref().map(|r| r.dump()).unwrap_or_default()
    }

    pub fn referenced_columns(&self) -> ColumnSet {
        self.root
            .as_ref()
            .map(|r| r.referenced_columns())
            .unwrap_or_default()
    }

    pub fn referenced_variables(&self) -> BTreeSet<String> {
        self.root
            .as_ref()
            .map(|r| r.referenced_variables())
            .unwrap_or_default()
    }

    pub fn referenced_functions(&self) -> BTreeSet<String> {
        self.root
            .as_ref()
            .map(|r| r.referenced_functions())
            .unwrap_or_default()
    }

    /// Indexes into `fields` of the referenced columns; every index when
    /// all attributes are referenced. Unknown names are skipped.
    pub fn referenced_attribute_indexes(&self, fields: &Fields) -> BTreeSet<usize> {
        let columns = self.referenced_columns();
        if columns.contains(ALL_ATTRIBUTES) {
            return (0..fields.len()).collect();
        }
        columns
            .iter()
            .filter_map(|name| fields.lookup_field(name))
            .collect()
    }

    pub fn needs_geometry(&self) -> bool {
        self.root.as_ref().is_some_and(|r| r.needs_geometry())
    }

    /// True when the whole expression is a single column reference
    pub fn is_field(&self) -> bool {
        matches!(self.root.as_deref(), Some(ExpressionNode::ColumnRef(_)))
    }

    // Measurement settings

    pub fn set_geom_calculator(&mut self, calculator: Option<Arc<dyn DistanceArea>>) {
        self.calculator = calculator;
    }

    pub fn geom_calculator(&self) -> Option<&Arc<dyn DistanceArea>> {
        self.calculator.as_ref()
    }

    pub fn distance_units(&self) -> DistanceUnit {
        self.distance_unit
    }

    pub fn set_distance_units(&mut self, unit: DistanceUnit) {
        self.distance_unit = unit;
    }

    pub fn area_units(&self) -> AreaUnit {
        self.area_unit
    }

    pub fn set_area_units(&mut self, unit: AreaUnit) {
        self.area_unit = unit;
    }

    // Associated helpers

    /// Parse and prepare `text`, reporting the parser error if any
    pub fn check_expression(text: &str, context: &mut EvaluationContext) -> Result<()> {
        let mut expression = Expression::new(text);
        expression.prepare(context);
        match expression.parser_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Replace every `[% expression %]` block in `text` by its value.
    ///
    /// Blocks that fail to parse or evaluate are left as written.
    pub fn replace_expression_text(
        text: &str,
        context: &mut EvaluationContext,
        calculator: Option<Arc<dyn DistanceArea>>,
    ) -> String {
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for captures in EXPRESSION_BLOCK.captures_iter(text) {
            let (Some(block), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            result.push_str(&text[last..block.start()]);
            last = block.end();

            let mut expression = Expression::new(inner.as_str().trim());
            if expression.has_parser_error() {
                log::warn!(
                    "expression parser error in '{}': {}",
                    inner.as_str(),
                    expression.parser_error_string()
                );
                result.push_str(block.as_str());
                continue;
            }
            if calculator.is_some() {
                expression.set_geom_calculator(calculator.clone());
            }
            let value = expression.evaluate(context);
            if expression.has_eval_error() {
                log::warn!(
                    "expression eval error in '{}': {}",
                    inner.as_str(),
                    expression.eval_error_string()
                );
                result.push_str(block.as_str());
                continue;
            }
            result.push_str(&value.to_text());
        }
        result.push_str(&text[last..]);
        result
    }

    /// `text` as a number, or the value of `text` as an expression, or `fallback`
    pub fn evaluate_to_double(text: &str, fallback: f64) -> f64 {
        if let Ok(value) = text.trim().parse::<f64>() {
            return value;
        }
        let mut expression = Expression::new(text);
        let mut context = EvaluationContext::from_scopes(vec![global_scope()]);
        let value = expression.evaluate(&mut context);
        if expression.has_eval_error() {
            return fallback;
        }
        value.to_double().unwrap_or(fallback)
    }

    /// `"field" IS NULL` for null values, `"field" = <quoted value>` otherwise
    pub fn create_field_equality_expression(field: &str, value: &Value) -> String {
        if value.is_null() {
            format!("{} IS NULL", quoted_column_ref(field))
        } else {
            format!("{} = {}", quoted_column_ref(field), quoted_value(value))
        }
    }

    /// Short human-readable form of a result value
    pub fn format_preview_string(value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Geometry(geometry) if geometry.is_empty() => "<empty geometry>".to_string(),
            Value::Geometry(geometry) => {
                let wkt = geometry.to_wkt();
                let kind = wkt.split([' ', '(']).next().unwrap_or_default();
                format!("<geometry: {kind}>")
            }
            Value::Feature(feature) => format!("<feature: {}>", feature.id()),
            Value::Layer(layer) => format!("<layer: {}>", layer.name()),
            Value::Interval(interval) => format!("<interval: {} days>", interval.days()),
            Value::Date(date) => format!("<date: {}>", date.format("%Y-%m-%d")),
            Value::Time(time) => format!("<time: {}>", time.format("%H:%M:%S")),
            Value::DateTime(dt) => format!("<datetime: {}>", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::String(text) => {
                if text.chars().count() > MAX_PREVIEW + 3 {
                    format!("'{}...'", truncate_chars(text, MAX_PREVIEW))
                } else {
                    format!("'{text}'")
                }
            }
            Value::Map(map) => {
                let entries = map
                    .iter()
                    .map(|(key, value)| format!("{key}: {}", Self::format_preview_string(value)));
                format!("<map: {}>", join_preview(entries))
            }
            Value::Array(items) => {
                let entries = items.iter().map(Self::format_preview_string);
                format!("<array: {}>", join_preview(entries))
            }
            other => other.to_text(),
        }
    }

    pub fn is_function_name(name: &str) -> bool {
        FunctionRegistry::global().is_function_name(name)
    }

    /// Error for hosts that want a `Result` instead of the error string
    pub fn eval_error(&self) -> Option<ExpressionError> {
        self.eval_error.as_ref().map(|message| {
            let code = if message == NO_ROOT_NODE { EX0054 } else { EX0051 };
            ExpressionError::evaluation_error(code, message.clone())
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Join preview entries, cutting off once the text grows past the preview limit
fn join_preview(entries: impl Iterator<Item = String>) -> String {
    let mut joined = String::new();
    for entry in entries {
        if !joined.is_empty() {
            joined.push_str(", ");
        }
        joined.push_str(&entry);
        if joined.chars().count() > MAX_PREVIEW + 3 {
            return format!("{}...", truncate_chars(&joined, MAX_PREVIEW));
        }
    }
    joined
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("expression", &self.expression())
            .field("parser_error", &self.parser_error)
            .field("eval_error", &self.eval_error)
            .finish()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression())
    }
}

/// Handles are equal when they share a tree or have the same text
impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
            _ => self.expression() == other.expression(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::ContextScope;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_error_is_permanent_until_reset() {
        let mut expression = Expression::new("1 +");
        assert!(!expression.is_valid());
        assert!(expression.has_parser_error());
        assert_eq!(expression.evaluate_without_context(), Value::Null);
        assert_eq!(expression.eval_error_string(), NO_ROOT_NODE);

        expression.set_expression("1 + 1");
        assert!(expression.is_valid());
        assert!(!expression.has_parser_error());
        assert!(!expression.has_eval_error());
        assert_eq!(expression.evaluate_without_context(), Value::Int(2));
    }

    #[test]
    fn test_prepare_without_root_sets_error() {
        let mut expression = Expression::new("(");
        assert!(!expression.prepare(&mut EvaluationContext::new()));
        assert_eq!(expression.eval_error_string(), NO_ROOT_NODE);
    }

    #[test]
    fn test_eval_error_clears_on_next_evaluate() {
        let mut expression = Expression::new("\"missing\"");
        let mut context = EvaluationContext::new();
        assert_eq!(expression.evaluate(&mut context), Value::Null);
        assert!(expression.has_eval_error());

        context.append_scope({
            let mut scope = ContextScope::new("vars");
            scope.set_variable("missing", 4, false);
            scope
        });
        assert_eq!(expression.evaluate(&mut context), Value::Int(4));
        assert!(!expression.has_eval_error());
    }

    #[test]
    fn test_node_built_handle_dumps_as_text() {
        let expression = Expression::from_node(ExpressionNode::column("name"));
        assert_eq!(expression.expression(), "\"name\"");
        assert!(expression.is_field());
    }

    #[test]
    fn test_replace_expression_text() {
        let mut context = EvaluationContext::new();
        assert_eq!(
            Expression::replace_expression_text("a [% 1 + 2 %] b [% 1 + %] c", &mut context, None),
            "a 3 b [% 1 + %] c"
        );
    }

    #[test]
    fn test_evaluate_to_double() {
        assert_eq!(Expression::evaluate_to_double("2.5", 0.0), 2.5);
        assert_eq!(Expression::evaluate_to_double("1 + 1.5", 0.0), 2.5);
        assert_eq!(Expression::evaluate_to_double("'abc'", 9.0), 9.0);
    }

    #[test]
    fn test_create_field_equality_expression() {
        assert_eq!(
            Expression::create_field_equality_expression("name", &Value::Null),
            "\"name\" IS NULL"
        );
        assert_eq!(
            Expression::create_field_equality_expression("na\"me", &Value::from("x")),
            "\"na\"\"me\" = 'x'"
        );
    }

    #[test]
    fn test_format_preview_string() {
        assert_eq!(Expression::format_preview_string(&Value::Null), "NULL");
        assert_eq!(Expression::format_preview_string(&Value::from("ab")), "'ab'");
        let long = "x".repeat(70);
        assert_eq!(
            Expression::format_preview_string(&Value::from(long.as_str())),
            format!("'{}...'", "x".repeat(60))
        );
        assert_eq!(
            Expression::format_preview_string(&Value::Array(vec![Value::Int(1), Value::from("a")])),
            "<array: 1, 'a'>"
        );
    }

    #[test]
    fn test_referenced_attribute_indexes() {
        let fields = Fields::from_names(["a", "b", "c"]);
        let expression = Expression::new("\"c\" + \"a\" + \"zzz\"");
        assert_eq!(
            expression.referenced_attribute_indexes(&fields),
            BTreeSet::from([0, 2])
        );
    }

    #[test]
    fn test_check_expression() {
        let mut context = EvaluationContext::new();
        assert!(Expression::check_expression("1 = 1", &mut context).is_ok());
        let error = Expression::check_expression("nope(", &mut context).unwrap_err();
        assert!(!error.message().is_empty());
    }
}
