//! Function descriptors and call dispatch
//!
//! Every callable known to the expression language is an
//! [`ExpressionFunction`]. The trait carries the descriptor metadata
//! (parameters, flags, call-site hooks) and a provided [`ExpressionFunction::run`]
//! method implementing argument evaluation with error short-circuiting and
//! null propagation. Built-ins are [`StaticFunction`]s assembled by the
//! [`FunctionBuilder`](super::builder::FunctionBuilder).

use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::ast::{ExpressionNode, FunctionCallNode};
use crate::core::{EvalResult, Interval, Value, ValueMap};
use crate::evaluator::{EvaluationContext, Expression};
use crate::feature::Feature;
use crate::geometry::Geometry;

/// Referenced-columns marker meaning "every attribute may be read"
pub const ALL_ATTRIBUTES: &str = "#!allattributes!#";

/// Set of attribute names a call may read
pub type ColumnSet = BTreeSet<String>;

/// Column set containing only [`ALL_ATTRIBUTES`]
pub fn all_attributes() -> ColumnSet {
    ColumnSet::from([ALL_ATTRIBUTES.to_string()])
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub optional: bool,
    /// Filled in by the parser when an optional argument is omitted
    pub default_value: Value,
    /// Evaluated against other features, so its columns are not the call's own
    pub sub_expression: bool,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            default_value: Value::Null,
            sub_expression: false,
        }
    }

    pub fn optional(name: impl Into<String>, default_value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            optional: true,
            default_value: default_value.into(),
            sub_expression: false,
        }
    }

    /// Mark the parameter as a sub-expression evaluated over other features
    pub fn as_sub_expression(mut self) -> Self {
        self.sub_expression = true;
        self
    }
}

/// Declared shape of a function's argument list
#[derive(Debug, Clone, PartialEq)]
pub enum Signature {
    /// Named parameters, optional ones last
    Parameters(Vec<Parameter>),
    /// Bare argument count; `-1` accepts any number
    Arity(i32),
}

impl Signature {
    pub const VARIADIC: i32 = -1;

    pub fn parameters(&self) -> &[Parameter] {
        match self {
            Signature::Parameters(params) => params,
            Signature::Arity(_) => &[],
        }
    }

    /// Declared parameter count, `-1` for variadic functions
    pub fn param_count(&self) -> i32 {
        match self {
            Signature::Parameters(params) => params.len() as i32,
            Signature::Arity(n) => *n,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self, Signature::Arity(n) if *n < 0)
    }

    pub fn min_args(&self) -> usize {
        match self {
            Signature::Parameters(params) => params.iter().filter(|p| !p.optional).count(),
            Signature::Arity(n) if *n < 0 => 0,
            Signature::Arity(n) => *n as usize,
        }
    }

    pub fn max_args(&self) -> Option<usize> {
        match self {
            Signature::Parameters(params) => Some(params.len()),
            Signature::Arity(n) if *n < 0 => None,
            Signature::Arity(n) => Some(*n as usize),
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args() && self.max_args().is_none_or(|max| count <= max)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters()
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// An argument as handed to a native callable
#[derive(Debug, Clone)]
pub enum Argument<'a> {
    /// Eagerly evaluated value
    Value(Value),
    /// Unevaluated sub-expression, passed to lazy functions
    Node(&'a ExpressionNode),
}

/// Argument list of one call
#[derive(Debug, Clone, Default)]
pub struct FunctionArgs<'a> {
    args: SmallVec<[Argument<'a>; 4]>,
}

impl<'a> FunctionArgs<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, argument: Argument<'a>) {
        self.args.push(argument);
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument<'a>> {
        self.args.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument<'a>> {
        self.args.iter()
    }
}

impl<'a> FromIterator<Argument<'a>> for FunctionArgs<'a> {
    fn from_iter<T: IntoIterator<Item = Argument<'a>>>(iter: T) -> Self {
        Self {
            args: iter.into_iter().collect(),
        }
    }
}

static NULL: Value = Value::Null;

/// Everything a native callable can reach during one call
pub struct FunctionContext<'a> {
    pub args: FunctionArgs<'a>,
    pub context: &'a mut EvaluationContext,
    pub parent: &'a Expression,
    pub node: &'a FunctionCallNode,
}

impl<'a> FunctionContext<'a> {
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Evaluated argument `index`; null when absent or unevaluated
    pub fn value(&self, index: usize) -> &Value {
        match self.args.get(index) {
            Some(Argument::Value(value)) => value,
            _ => &NULL,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.args.iter().map(|arg| match arg {
            Argument::Value(value) => value,
            Argument::Node(_) => &NULL,
        })
    }

    /// Unevaluated node for argument `index` of a lazy function
    pub fn node(&self, index: usize) -> Option<&'a ExpressionNode> {
        match self.args.get(index) {
            Some(Argument::Node(node)) => Some(*node),
            _ => None,
        }
    }

    /// Evaluate argument `index` now, whatever form it was passed in
    pub fn eval_arg(&mut self, index: usize) -> EvalResult<Value> {
        match self.args.get(index) {
            Some(Argument::Value(value)) => Ok(value.clone()),
            Some(Argument::Node(node)) => {
                let node = *node;
                node.eval(self.parent, self.context)
            }
            None => Ok(Value::Null),
        }
    }

    pub fn double(&self, index: usize) -> EvalResult<f64> {
        self.value(index).to_double()
    }

    pub fn int(&self, index: usize) -> EvalResult<i64> {
        self.value(index).to_int()
    }

    pub fn text(&self, index: usize) -> String {
        self.value(index).to_text()
    }

    /// Truthiness of argument `index`; null counts as false
    pub fn bool(&self, index: usize) -> EvalResult<bool> {
        Ok(self.value(index).to_tvl()? == crate::core::Tvl::True)
    }

    pub fn array(&self, index: usize) -> EvalResult<Vec<Value>> {
        self.value(index).to_array()
    }

    pub fn map(&self, index: usize) -> EvalResult<ValueMap> {
        self.value(index).to_map()
    }

    pub fn geometry(&self, index: usize) -> EvalResult<Arc<Geometry>> {
        self.value(index).to_geometry()
    }

    pub fn feature(&self, index: usize) -> EvalResult<Arc<Feature>> {
        self.value(index).to_feature()
    }

    pub fn datetime(&self, index: usize) -> EvalResult<chrono::NaiveDateTime> {
        self.value(index).to_datetime()
    }

    pub fn date(&self, index: usize) -> EvalResult<chrono::NaiveDate> {
        self.value(index).to_date()
    }

    pub fn time(&self, index: usize) -> EvalResult<chrono::NaiveTime> {
        self.value(index).to_time()
    }

    pub fn interval(&self, index: usize) -> EvalResult<Interval> {
        self.value(index).to_interval()
    }
}

/// A callable known to the expression language
pub trait ExpressionFunction: Send + Sync {
    fn name(&self) -> &str;

    fn signature(&self) -> &Signature;

    /// Documentation groups; no behavioral effect apart from `"deprecated"`
    fn groups(&self) -> &[String];

    fn help_text(&self) -> &str {
        ""
    }

    /// Alternative names, matched case-insensitively like the name itself
    fn aliases(&self) -> &[String] {
        &[]
    }

    /// Receive arguments as unevaluated nodes
    fn lazy_eval(&self) -> bool {
        false
    }

    /// Receive null arguments instead of short-circuiting to null
    fn handles_null(&self) -> bool {
        false
    }

    fn is_deprecated(&self) -> bool {
        self.groups().iter().any(|g| g == "deprecated")
    }

    /// Whether evaluating this call needs the feature geometry
    fn uses_geometry(&self, _node: &FunctionCallNode) -> bool {
        true
    }

    /// Attribute columns this call reads, on top of its arguments' columns
    fn referenced_columns(&self, _node: &FunctionCallNode) -> ColumnSet {
        all_attributes()
    }

    /// Whether this call yields the same value for every feature
    fn is_static(
        &self,
        _node: &FunctionCallNode,
        _parent: &Expression,
        _context: &mut EvaluationContext,
    ) -> bool {
        false
    }

    /// One-time setup before row-by-row evaluation
    fn prepare(
        &self,
        _node: &FunctionCallNode,
        _parent: &Expression,
        _context: &mut EvaluationContext,
    ) -> bool {
        true
    }

    /// The native callable
    fn func(&self, call: &mut FunctionContext<'_>) -> EvalResult<Value>;

    /// Evaluate a call site.
    ///
    /// Lazy functions receive their argument nodes untouched. Otherwise
    /// arguments are evaluated left to right; an evaluation error aborts
    /// immediately, and a null argument returns null without evaluating the
    /// remaining arguments unless the function handles nulls itself.
    fn run(
        &self,
        node: &FunctionCallNode,
        context: &mut EvaluationContext,
        parent: &Expression,
    ) -> EvalResult<Value> {
        let mut args = FunctionArgs::new();
        if self.lazy_eval() {
            for argument in &node.arguments {
                args.push(Argument::Node(argument));
            }
        } else {
            for argument in &node.arguments {
                let value = argument.eval(parent, context)?;
                if value.is_null() && !self.handles_null() {
                    return Ok(Value::Null);
                }
                args.push(Argument::Value(value));
            }
        }

        let mut call = FunctionContext {
            args,
            context,
            parent,
            node,
        };
        self.func(&mut call)
    }
}

impl fmt::Debug for dyn ExpressionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionFunction")
            .field("name", &self.name())
            .field("signature", self.signature())
            .finish()
    }
}

/// True when every argument of the call is itself static
pub fn all_params_static(
    node: &FunctionCallNode,
    parent: &Expression,
    context: &mut EvaluationContext,
) -> bool {
    node.arguments
        .iter()
        .all(|argument| argument.is_static(parent, context))
}

/// Native implementation of a [`StaticFunction`]
pub type FunctionImpl = Arc<dyn Fn(&mut FunctionContext<'_>) -> EvalResult<Value> + Send + Sync>;

/// Predicate consulted per call site and context
pub type ContextPredicate =
    Arc<dyn Fn(&FunctionCallNode, &Expression, &mut EvaluationContext) -> bool + Send + Sync>;

/// A descriptor hook that is either constant or computed per call site
#[derive(Clone)]
pub enum CallSiteHook<T> {
    Fixed(T),
    PerCall(Arc<dyn Fn(&FunctionCallNode) -> T + Send + Sync>),
}

impl<T: Clone> CallSiteHook<T> {
    pub fn resolve(&self, node: &FunctionCallNode) -> T {
        match self {
            CallSiteHook::Fixed(value) => value.clone(),
            CallSiteHook::PerCall(hook) => hook(node),
        }
    }
}

/// How a [`StaticFunction`] decides static-ness
#[derive(Clone)]
pub enum StaticPolicy {
    Fixed(bool),
    AllParamsStatic,
    Custom(ContextPredicate),
}

/// Descriptor whose behavior hooks are stored values or boxed callables
#[derive(Clone)]
pub struct StaticFunction {
    pub(crate) name: String,
    pub(crate) signature: Signature,
    pub(crate) groups: Vec<String>,
    pub(crate) help: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) lazy_eval: bool,
    pub(crate) handles_null: bool,
    pub(crate) uses_geometry: CallSiteHook<bool>,
    pub(crate) referenced_columns: CallSiteHook<ColumnSet>,
    pub(crate) is_static: StaticPolicy,
    pub(crate) prepare: Option<ContextPredicate>,
    pub(crate) implementation: FunctionImpl,
}

impl ExpressionFunction for StaticFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn groups(&self) -> &[String] {
        &self.groups
    }

    fn help_text(&self) -> &str {
        &self.help
    }

    fn aliases(&self) -> &[String] {
        &self.aliases
    }

    fn lazy_eval(&self) -> bool {
        self.lazy_eval
    }

    fn handles_null(&self) -> bool {
        self.handles_null
    }

    fn uses_geometry(&self, node: &FunctionCallNode) -> bool {
        self.uses_geometry.resolve(node)
    }

    fn referenced_columns(&self, node: &FunctionCallNode) -> ColumnSet {
        self.referenced_columns.resolve(node)
    }

    fn is_static(
        &self,
        node: &FunctionCallNode,
        parent: &Expression,
        context: &mut EvaluationContext,
    ) -> bool {
        match &self.is_static {
            StaticPolicy::Fixed(value) => *value,
            StaticPolicy::AllParamsStatic => all_params_static(node, parent, context),
            StaticPolicy::Custom(check) => check(node, parent, context),
        }
    }

    fn prepare(
        &self,
        node: &FunctionCallNode,
        parent: &Expression,
        context: &mut EvaluationContext,
    ) -> bool {
        match &self.prepare {
            Some(hook) => hook(node, parent, context),
            None => true,
        }
    }

    fn func(&self, call: &mut FunctionContext<'_>) -> EvalResult<Value> {
        (self.implementation)(call)
    }
}

impl fmt::Debug for StaticFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFunction")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("groups", &self.groups)
            .field("aliases", &self.aliases)
            .field("lazy_eval", &self.lazy_eval)
            .field("handles_null", &self.handles_null)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_bounds() {
        let params = Signature::Parameters(vec![
            Parameter::new("value"),
            Parameter::optional("places", 0),
        ]);
        assert_eq!(params.min_args(), 1);
        assert_eq!(params.max_args(), Some(2));
        assert!(params.accepts(1));
        assert!(!params.accepts(3));
        assert_eq!(params.parameter_index("PLACES"), Some(1));

        let variadic = Signature::Arity(Signature::VARIADIC);
        assert!(variadic.is_variadic());
        assert!(variadic.accepts(0));
        assert!(variadic.accepts(12));
        assert_eq!(Signature::Arity(3).param_count(), 3);
    }

    #[test]
    fn test_all_attributes_marker() {
        assert!(all_attributes().contains(ALL_ATTRIBUTES));
    }
}
