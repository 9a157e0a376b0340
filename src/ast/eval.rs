//! Tree-walking evaluation, preparation and static analysis of AST nodes

use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;
use std::sync::Arc;

use super::expression::{ExpressionNode, FunctionCallNode};
use super::operator::{BinaryOperator, UnaryOperator};
use crate::core::{EvalError, EvalResult, Interval, Tvl, Value};
use crate::evaluator::{EvaluationContext, Expression};
use crate::registry::{ExpressionFunction, FunctionRegistry};

impl FunctionCallNode {
    /// Descriptor for this call: a scope-provided function of the same name
    /// wins over the registry entry
    pub fn resolve(&self, context: &EvaluationContext) -> EvalResult<Arc<dyn ExpressionFunction>> {
        context
            .function(&self.name)
            .or_else(|| FunctionRegistry::global().find(&self.name))
            .ok_or_else(|| EvalError::new(format!("Function '{}' is not known", self.name)))
    }

    pub fn eval(&self, parent: &Expression, context: &mut EvaluationContext) -> EvalResult<Value> {
        let function = self.resolve(context)?;
        context.enter_evaluation(parent.config().max_recursion_depth)?;
        let result = function.run(self, context, parent);
        context.leave_evaluation();
        result
    }

    pub fn prepare(&self, parent: &Expression, context: &mut EvaluationContext) -> EvalResult<()> {
        let function = self.resolve(context)?;
        if !function.prepare(self, parent, context) {
            return Err(EvalError::new(format!(
                "Could not prepare function '{}'",
                self.name
            )));
        }
        // lazy functions prepare their own arguments
        if function.lazy_eval() {
            return Ok(());
        }
        let parameters = function.signature().parameters();
        for (index, argument) in self.arguments.iter().enumerate() {
            if parameters.get(index).is_some_and(|p| p.sub_expression) {
                continue;
            }
            argument.prepare(parent, context)?;
        }
        Ok(())
    }
}

impl ExpressionNode {
    /// Evaluate against the current context.
    ///
    /// Errors surface as `Err` and abort evaluation of every enclosing node;
    /// the owning [`Expression`] turns them into its evaluation error string.
    pub fn eval(&self, parent: &Expression, context: &mut EvaluationContext) -> EvalResult<Value> {
        match self {
            ExpressionNode::Literal(literal) => Ok(literal.to_value()),
            ExpressionNode::ColumnRef(name) => eval_column(name, context),
            ExpressionNode::Variable(name) => Ok(context.variable(name)),
            ExpressionNode::FunctionCall(call) => call.eval(parent, context),
            ExpressionNode::UnaryOperation { op, operand } => {
                let value = operand.eval(parent, context)?;
                eval_unary(*op, value)
            }
            ExpressionNode::BinaryOperation { op, left, right } => match op {
                BinaryOperator::And => {
                    let left = left.eval(parent, context)?.to_tvl()?;
                    if left == Tvl::False {
                        return Ok(Value::Bool(false));
                    }
                    let right = right.eval(parent, context)?.to_tvl()?;
                    Ok(left.and(right).to_value())
                }
                BinaryOperator::Or => {
                    let left = left.eval(parent, context)?.to_tvl()?;
                    if left == Tvl::True {
                        return Ok(Value::Bool(true));
                    }
                    let right = right.eval(parent, context)?.to_tvl()?;
                    Ok(left.or(right).to_value())
                }
                _ => {
                    let left = left.eval(parent, context)?;
                    let right = right.eval(parent, context)?;
                    eval_binary(*op, left, right)
                }
            },
            ExpressionNode::InOperation {
                node,
                list,
                negated,
            } => {
                let value = node.eval(parent, context)?;
                if value.is_null() {
                    return Ok(Value::Null);
                }
                let mut list_has_null = false;
                for item in list {
                    let candidate = item.eval(parent, context)?;
                    if candidate.is_null() {
                        list_has_null = true;
                    } else if values_equal(&value, &candidate) {
                        return Ok(Value::Bool(!negated));
                    }
                }
                Ok(if list_has_null {
                    Value::Null
                } else {
                    Value::Bool(*negated)
                })
            }
            ExpressionNode::Condition {
                branches,
                else_branch,
            } => {
                for branch in branches {
                    if branch.when.eval(parent, context)?.to_tvl()? == Tvl::True {
                        return branch.then.eval(parent, context);
                    }
                }
                match else_branch {
                    Some(node) => node.eval(parent, context),
                    None => Ok(Value::Null),
                }
            }
        }
    }

    /// One-time setup before evaluating many features with the same context
    pub fn prepare(&self, parent: &Expression, context: &mut EvaluationContext) -> EvalResult<()> {
        match self {
            ExpressionNode::ColumnRef(name) => {
                let missing = context
                    .fields()
                    .is_some_and(|fields| fields.lookup_field(name).is_none());
                if missing && !context.has_variable(name) {
                    return Err(EvalError::new(format!("Column '{name}' not found")));
                }
                Ok(())
            }
            ExpressionNode::FunctionCall(call) => call.prepare(parent, context),
            other => {
                for child in other.children() {
                    child.prepare(parent, context)?;
                }
                Ok(())
            }
        }
    }

    /// Whether this tree yields the same value for every feature
    pub fn is_static(&self, parent: &Expression, context: &mut EvaluationContext) -> bool {
        match self {
            ExpressionNode::Literal(_) => true,
            ExpressionNode::ColumnRef(_) => false,
            ExpressionNode::Variable(name) => context
                .active_scope_for_variable(name)
                .is_some_and(|scope| scope.is_static(name)),
            ExpressionNode::FunctionCall(call) => match call.resolve(context) {
                Ok(function) => function.is_static(call, parent, context),
                Err(_) => false,
            },
            other => other
                .children()
                .into_iter()
                .all(|child| child.is_static(parent, context)),
        }
    }
}

fn eval_column(name: &str, context: &EvaluationContext) -> EvalResult<Value> {
    match context.feature() {
        Some(feature) => match feature.attribute(name) {
            Some(value) => Ok(value.clone()),
            None if context.has_variable(name) => Ok(context.variable(name)),
            None => Err(EvalError::new(format!("Column '{name}' not found"))),
        },
        None if context.has_variable(name) => Ok(context.variable(name)),
        None => Err(EvalError::new(format!(
            "No feature available for field '{name}' evaluation"
        ))),
    }
}

fn eval_unary(op: UnaryOperator, value: Value) -> EvalResult<Value> {
    match op {
        UnaryOperator::Not => Ok(value.to_tvl()?.not().to_value()),
        UnaryOperator::Minus | UnaryOperator::Plus => {
            if value.is_null() {
                return Ok(Value::Null);
            }
            let negate = op == UnaryOperator::Minus;
            if let Some(i) = int_safe(&value) {
                return Ok(if negate {
                    i.checked_neg()
                        .map(Value::Int)
                        .unwrap_or(Value::Double(-(i as f64)))
                } else {
                    Value::Int(i)
                });
            }
            match value.to_double() {
                Ok(d) => Ok(Value::Double(if negate { -d } else { d })),
                Err(_) => Err(EvalError::new("Unary minus only for numeric values.")),
            }
        }
    }
}

fn eval_binary(op: BinaryOperator, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        BinaryOperator::Is | BinaryOperator::IsNot => {
            let same = match (left.is_null(), right.is_null()) {
                (true, true) => true,
                (true, false) | (false, true) => false,
                (false, false) => values_equal(&left, &right),
            };
            Ok(Value::Bool(same == (op == BinaryOperator::Is)))
        }
        _ if left.is_null() || right.is_null() => Ok(Value::Null),
        BinaryOperator::Concat => Ok(Value::String(left.to_text() + &right.to_text())),
        BinaryOperator::Equal => Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOperator::LessThan
        | BinaryOperator::GreaterThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThanOrEqual => {
            let ordering = left.compare(&right);
            Ok(Value::Bool(match op {
                BinaryOperator::LessThan => ordering == Some(Ordering::Less),
                BinaryOperator::GreaterThan => ordering == Some(Ordering::Greater),
                BinaryOperator::LessThanOrEqual => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            }))
        }
        BinaryOperator::Regexp => {
            let pattern = right.to_text();
            let regex = Regex::new(&pattern).map_err(|e| {
                EvalError::new(format!("Invalid regular expression '{pattern}': {e}"))
            })?;
            Ok(Value::Bool(regex.is_match(&left.to_text())))
        }
        BinaryOperator::Like
        | BinaryOperator::NotLike
        | BinaryOperator::ILike
        | BinaryOperator::NotILike => {
            let insensitive = matches!(op, BinaryOperator::ILike | BinaryOperator::NotILike);
            let negated = matches!(op, BinaryOperator::NotLike | BinaryOperator::NotILike);
            let pattern = right.to_text();
            let regex = like_regex(&pattern, insensitive).map_err(|e| {
                EvalError::new(format!("Invalid regular expression '{pattern}': {e}"))
            })?;
            Ok(Value::Bool(regex.is_match(&left.to_text()) != negated))
        }
        _ => eval_arithmetic(op, left, right),
    }
}

/// Equality used by `=`, `IN` and `IS`: numeric when both sides look
/// numeric, structural for collections and geometries, textual otherwise
pub(crate) fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Array(_), _)
        | (_, Value::Array(_))
        | (Value::Map(_), _)
        | (_, Value::Map(_))
        | (Value::Geometry(_), _)
        | (Value::Feature(_), _) => left == right,
        _ => left.compare(right) == Some(Ordering::Equal),
    }
}

/// Integer view of a value, for operations that stay integral
fn int_safe(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Translate `%` and `_` wildcards into an anchored regular expression;
/// `\%` and `\_` match literally
fn like_regex(pattern: &str, insensitive: bool) -> Result<Regex, regex::Error> {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('%' | '_')) => {
                if let Some(next) = chars.next() {
                    translated.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => translated.push_str(".*"),
            '_' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');
    RegexBuilder::new(&translated)
        .case_insensitive(insensitive)
        .dot_matches_new_line(true)
        .build()
}

fn eval_arithmetic(op: BinaryOperator, left: Value, right: Value) -> EvalResult<Value> {
    if op == BinaryOperator::Plus {
        if let (Value::String(a), Value::String(b)) = (&left, &right) {
            return Ok(Value::String(format!("{a}{b}")));
        }
    }
    if let Some(result) = temporal_arithmetic(op, &left, &right)? {
        return Ok(result);
    }
    if op != BinaryOperator::Divide {
        if let (Some(a), Some(b)) = (int_safe(&left), int_safe(&right)) {
            return Ok(int_arithmetic(op, a, b));
        }
    }
    let a = left.to_double()?;
    let b = right.to_double()?;
    Ok(double_arithmetic(op, a, b))
}

fn int_arithmetic(op: BinaryOperator, a: i64, b: i64) -> Value {
    let widened = || double_arithmetic(op, a as f64, b as f64);
    match op {
        BinaryOperator::Plus => a.checked_add(b).map(Value::Int).unwrap_or_else(widened),
        BinaryOperator::Minus => a.checked_sub(b).map(Value::Int).unwrap_or_else(widened),
        BinaryOperator::Multiply => a.checked_mul(b).map(Value::Int).unwrap_or_else(widened),
        BinaryOperator::IntDivide if b == 0 => Value::Null,
        BinaryOperator::IntDivide => Value::Int((a as f64 / b as f64).floor() as i64),
        BinaryOperator::Modulo if b == 0 => Value::Null,
        BinaryOperator::Modulo => a.checked_rem(b).map(Value::Int).unwrap_or_else(widened),
        BinaryOperator::Power => u32::try_from(b)
            .ok()
            .and_then(|exponent| a.checked_pow(exponent))
            .map(Value::Int)
            .unwrap_or_else(widened),
        _ => widened(),
    }
}

fn double_arithmetic(op: BinaryOperator, a: f64, b: f64) -> Value {
    match op {
        BinaryOperator::Plus => Value::Double(a + b),
        BinaryOperator::Minus => Value::Double(a - b),
        BinaryOperator::Multiply => Value::Double(a * b),
        BinaryOperator::Divide | BinaryOperator::IntDivide | BinaryOperator::Modulo if b == 0.0 => {
            Value::Null
        }
        BinaryOperator::Divide => Value::Double(a / b),
        BinaryOperator::IntDivide => Value::Int((a / b).floor() as i64),
        BinaryOperator::Modulo => Value::Double(a % b),
        BinaryOperator::Power => Value::Double(a.powf(b)),
        _ => Value::Null,
    }
}

fn interval_delta(interval: &Interval) -> EvalResult<TimeDelta> {
    TimeDelta::try_milliseconds((interval.seconds() * 1000.0).round() as i64)
        .ok_or_else(|| EvalError::new("Interval out of range"))
}

fn shift_datetime(dt: NaiveDateTime, delta: TimeDelta, subtract: bool) -> EvalResult<Value> {
    let shifted = if subtract {
        dt.checked_sub_signed(delta)
    } else {
        dt.checked_add_signed(delta)
    };
    shifted
        .map(Value::DateTime)
        .ok_or_else(|| EvalError::new("Date arithmetic out of range"))
}

fn shift_time(time: NaiveTime, delta: TimeDelta, subtract: bool) -> Value {
    let delta = if subtract { -delta } else { delta };
    Value::Time(time.overflowing_add_signed(delta).0)
}

fn seconds_between(later: NaiveDateTime, earlier: NaiveDateTime) -> Value {
    let delta = later - earlier;
    Value::Interval(Interval::from_seconds(delta.num_milliseconds() as f64 / 1000.0))
}

/// Arithmetic between dates, times and intervals; `None` when neither
/// operand is temporal
fn temporal_arithmetic(
    op: BinaryOperator,
    left: &Value,
    right: &Value,
) -> EvalResult<Option<Value>> {
    let subtract = match op {
        BinaryOperator::Plus => false,
        BinaryOperator::Minus => true,
        _ => return Ok(None),
    };
    let result = match (left, right) {
        (Value::DateTime(_) | Value::Date(_), Value::Interval(interval)) => {
            shift_datetime(left.to_datetime()?, interval_delta(interval)?, subtract)?
        }
        (Value::Interval(interval), Value::DateTime(_) | Value::Date(_)) if !subtract => {
            shift_datetime(right.to_datetime()?, interval_delta(interval)?, false)?
        }
        (Value::Time(time), Value::Interval(interval)) => {
            shift_time(*time, interval_delta(interval)?, subtract)
        }
        (Value::DateTime(_) | Value::Date(_), Value::DateTime(_) | Value::Date(_)) if subtract => {
            seconds_between(left.to_datetime()?, right.to_datetime()?)
        }
        (Value::Time(a), Value::Time(b)) if subtract => {
            let delta = *a - *b;
            Value::Interval(Interval::from_seconds(delta.num_milliseconds() as f64 / 1000.0))
        }
        (Value::Interval(a), Value::Interval(b)) => Value::Interval(Interval::from_seconds(
            if subtract {
                a.seconds() - b.seconds()
            } else {
                a.seconds() + b.seconds()
            },
        )),
        _ => return Ok(None),
    };
    Ok(Some(result))
}
