//! Expression AST node definitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::operator::{BinaryOperator, UnaryOperator};
use crate::core::Value;
use crate::quoting::{quoted_column_ref, quoted_value};
use crate::registry::{ColumnSet, FunctionRegistry};

/// AST representation of a parsed expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionNode {
    /// Literal value (string, number, boolean or NULL)
    Literal(LiteralValue),

    /// Attribute of the current feature, by field name
    ColumnRef(String),

    /// Context variable reference (`@name`)
    Variable(String),

    /// Function call with resolved canonical name and arguments
    FunctionCall(FunctionCallNode),

    /// Unary operation (NOT, negation)
    UnaryOperation {
        /// The operator
        op: UnaryOperator,
        /// The operand
        operand: Box<ExpressionNode>,
    },

    /// Binary operation (arithmetic, comparison, logical)
    BinaryOperation {
        /// The operator
        op: BinaryOperator,
        /// Left operand
        left: Box<ExpressionNode>,
        /// Right operand
        right: Box<ExpressionNode>,
    },

    /// Membership test (`x IN (a, b)` / `x NOT IN (a, b)`)
    InOperation {
        /// Tested value
        node: Box<ExpressionNode>,
        /// Candidate values
        list: Vec<ExpressionNode>,
        /// True for NOT IN
        negated: bool,
    },

    /// `CASE WHEN ... THEN ... [ELSE ...] END`
    Condition {
        /// Condition/result pairs, tried in order
        branches: Vec<WhenThen>,
        /// Fallback result
        else_branch: Option<Box<ExpressionNode>>,
    },
}

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    /// NULL
    Null,
    /// Boolean literal
    Boolean(bool),
    /// Integer literal
    Integer(i64),
    /// Floating point literal
    Double(f64),
    /// String literal, escapes already resolved
    String(String),
}

impl LiteralValue {
    pub fn to_value(&self) -> Value {
        match self {
            LiteralValue::Null => Value::Null,
            LiteralValue::Boolean(b) => Value::Bool(*b),
            LiteralValue::Integer(i) => Value::Int(*i),
            LiteralValue::Double(d) => Value::Double(*d),
            LiteralValue::String(s) => Value::String(s.clone()),
        }
    }

    /// Literal for a parameter default; values without literal syntax become NULL
    pub fn from_value(value: &Value) -> LiteralValue {
        match value {
            Value::Bool(b) => LiteralValue::Boolean(*b),
            Value::Int(i) => LiteralValue::Integer(*i),
            Value::Double(d) => LiteralValue::Double(*d),
            Value::String(s) => LiteralValue::String(s.clone()),
            _ => LiteralValue::Null,
        }
    }
}

/// One `WHEN ... THEN ...` arm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenThen {
    pub when: ExpressionNode,
    pub then: ExpressionNode,
}

/// A call site: the canonical function name and the argument nodes, with
/// omitted optional parameters already filled in by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallNode {
    pub name: String,
    pub arguments: Vec<ExpressionNode>,
}

impl FunctionCallNode {
    pub fn new(name: impl Into<String>, arguments: Vec<ExpressionNode>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Literal string value of argument `index`, if it is one
    pub fn literal_string_arg(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index) {
            Some(ExpressionNode::Literal(LiteralValue::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn dump(&self) -> String {
        if self.name.starts_with('$') && self.arguments.is_empty() {
            return self.name.clone();
        }
        let args: Vec<String> = self.arguments.iter().map(ExpressionNode::dump).collect();
        format!("{}({})", self.name, args.join(", "))
    }

    /// Columns read by this call: the descriptor's own columns plus those of
    /// every argument that is not a sub-expression over other features
    pub fn referenced_columns(&self) -> ColumnSet {
        let Some(function) = FunctionRegistry::global().find(&self.name) else {
            return self.arguments.iter().flat_map(|a| a.referenced_columns()).collect();
        };
        let mut columns = function.referenced_columns(self);
        let parameters = function.signature().parameters();
        for (index, argument) in self.arguments.iter().enumerate() {
            let sub_expression = parameters.get(index).is_some_and(|p| p.sub_expression);
            if !sub_expression {
                columns.extend(argument.referenced_columns());
            }
        }
        columns
    }

    pub fn needs_geometry(&self) -> bool {
        let uses_geometry = FunctionRegistry::global()
            .find(&self.name)
            .is_some_and(|function| function.uses_geometry(self));
        uses_geometry || self.arguments.iter().any(ExpressionNode::needs_geometry)
    }
}

impl ExpressionNode {
    /// Create a literal node
    pub fn literal(value: LiteralValue) -> Self {
        Self::Literal(value)
    }

    /// Create a column reference node
    pub fn column(name: impl Into<String>) -> Self {
        Self::ColumnRef(name.into())
    }

    /// Create a variable reference node
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable(name.into())
    }

    /// Create a function call node
    pub fn function_call(name: impl Into<String>, arguments: Vec<ExpressionNode>) -> Self {
        Self::FunctionCall(FunctionCallNode::new(name, arguments))
    }

    /// Create a unary operation node
    pub fn unary_op(op: UnaryOperator, operand: ExpressionNode) -> Self {
        Self::UnaryOperation {
            op,
            operand: Box::new(operand),
        }
    }

    /// Create a binary operation node
    pub fn binary_op(op: BinaryOperator, left: ExpressionNode, right: ExpressionNode) -> Self {
        Self::BinaryOperation {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Create an IN / NOT IN node
    pub fn in_op(node: ExpressionNode, list: Vec<ExpressionNode>, negated: bool) -> Self {
        Self::InOperation {
            node: Box::new(node),
            list,
            negated,
        }
    }

    /// Create a CASE node
    pub fn condition(branches: Vec<WhenThen>, else_branch: Option<ExpressionNode>) -> Self {
        Self::Condition {
            branches,
            else_branch: else_branch.map(Box::new),
        }
    }

    /// True for a NULL literal, the marker of an omitted optional argument
    pub fn is_null_literal(&self) -> bool {
        matches!(self, ExpressionNode::Literal(LiteralValue::Null))
    }

    /// Direct child nodes
    pub fn children(&self) -> Vec<&ExpressionNode> {
        match self {
            ExpressionNode::Literal(_)
            | ExpressionNode::ColumnRef(_)
            | ExpressionNode::Variable(_) => {
                Vec::new()
            }
            ExpressionNode::FunctionCall(call) => call.arguments.iter().collect(),
            ExpressionNode::UnaryOperation { operand, .. } => vec![operand],
            ExpressionNode::BinaryOperation { left, right, .. } => vec![left, right],
            ExpressionNode::InOperation { node, list, .. } => {
                std::iter::once(node.as_ref()).chain(list.iter()).collect()
            }
            ExpressionNode::Condition {
                branches,
                else_branch,
            } => branches
                .iter()
                .flat_map(|b| [&b.when, &b.then])
                .chain(else_branch.as_deref())
                .collect(),
        }
    }

    /// How tightly this node binds when printed as an operand
    fn binding_precedence(&self) -> u8 {
        match self {
            ExpressionNode::BinaryOperation { op, .. } => op.precedence(),
            ExpressionNode::UnaryOperation {
                op: UnaryOperator::Not,
                ..
            } => 3,
            ExpressionNode::InOperation { .. } => 4,
            _ => u8::MAX,
        }
    }

    /// Source-equivalent text; parsing it yields an equivalent tree
    pub fn dump(&self) -> String {
        match self {
            ExpressionNode::Literal(literal) => quoted_value(&literal.to_value()),
            ExpressionNode::ColumnRef(name) => quoted_column_ref(name),
            ExpressionNode::Variable(name) => format!("@{name}"),
            ExpressionNode::FunctionCall(call) => call.dump(),
            ExpressionNode::UnaryOperation { op, operand } => match operand.as_ref() {
                ExpressionNode::BinaryOperation { .. } => {
                    format!("{}({})", op.as_str(), operand.dump())
                }
                _ => format!("{}{}", op.as_str(), operand.dump()),
            },
            ExpressionNode::BinaryOperation { op, left, right } => {
                let precedence = op.precedence();
                let left_binding = left.binding_precedence();
                let right_binding = right.binding_precedence();
                let left_text = if left_binding < precedence
                    || (left_binding == precedence && op.is_right_associative())
                {
                    format!("({})", left.dump())
                } else {
                    left.dump()
                };
                let right_text = if right_binding < precedence
                    || (right_binding == precedence && !op.is_right_associative())
                {
                    format!("({})", right.dump())
                } else {
                    right.dump()
                };
                format!("{left_text} {} {right_text}", op.as_str())
            }
            ExpressionNode::InOperation {
                node,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(ExpressionNode::dump).collect();
                format!(
                    "{} {}IN ({})",
                    node.dump(),
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            ExpressionNode::Condition {
                branches,
                else_branch,
            } => {
                let mut text = String::from("CASE");
                for branch in branches {
                    text.push_str(&format!(
                        " WHEN {} THEN {}",
                        branch.when.dump(),
                        branch.then.dump()
                    ));
                }
                if let Some(else_branch) = else_branch {
                    text.push_str(&format!(" ELSE {}", else_branch.dump()));
                }
                text.push_str(" END");
                text
            }
        }
    }

    /// Attribute columns read when evaluating this tree
    pub fn referenced_columns(&self) -> ColumnSet {
        match self {
            ExpressionNode::ColumnRef(name) => ColumnSet::from([name.clone()]),
            ExpressionNode::FunctionCall(call) => call.referenced_columns(),
            other => other
                .children()
                .into_iter()
                .flat_map(ExpressionNode::referenced_columns)
                .collect(),
        }
    }

    /// Context variables read by this tree.
    ///
    /// A `var()` call whose name is not a literal string contributes the
    /// empty string, meaning "some variable that cannot be known statically".
    pub fn referenced_variables(&self) -> BTreeSet<String> {
        let mut variables = BTreeSet::new();
        self.collect_variables(&mut variables);
        variables
    }

    fn collect_variables(&self, variables: &mut BTreeSet<String>) {
        match self {
            ExpressionNode::Variable(name) => {
                variables.insert(name.clone());
            }
            ExpressionNode::FunctionCall(call) if call.name == "var" => {
                match call.literal_string_arg(0) {
                    Some(name) => variables.insert(name.to_string()),
                    None => variables.insert(String::new()),
                };
                for argument in &call.arguments {
                    argument.collect_variables(variables);
                }
            }
            other => {
                for child in other.children() {
                    child.collect_variables(variables);
                }
            }
        }
    }

    /// Names of every function called in this tree
    pub fn referenced_functions(&self) -> BTreeSet<String> {
        let mut functions = BTreeSet::new();
        if let ExpressionNode::FunctionCall(call) = self {
            functions.insert(call.name.clone());
        }
        for child in self.children() {
            functions.extend(child.referenced_functions());
        }
        functions
    }

    /// Whether evaluating this tree needs the feature geometry
    pub fn needs_geometry(&self) -> bool {
        match self {
            ExpressionNode::FunctionCall(call) => call.needs_geometry(),
            other => other.children().into_iter().any(ExpressionNode::needs_geometry),
        }
    }

    /// Number of nodes in this tree
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(ExpressionNode::node_count)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> ExpressionNode {
        ExpressionNode::literal(LiteralValue::Integer(i))
    }

    #[test]
    fn test_dump_parenthesizes_by_precedence() {
        let sum = ExpressionNode::binary_op(BinaryOperator::Plus, int(1), int(2));
        let product = ExpressionNode::binary_op(BinaryOperator::Multiply, sum, int(3));
        assert_eq!(product.dump(), "(1 + 2) * 3");

        let nested = ExpressionNode::binary_op(
            BinaryOperator::Minus,
            int(1),
            ExpressionNode::binary_op(BinaryOperator::Minus, int(2), int(3)),
        );
        assert_eq!(nested.dump(), "1 - (2 - 3)");
    }

    #[test]
    fn test_dump_literals_and_references() {
        let node = ExpressionNode::in_op(
            ExpressionNode::column("my col"),
            vec![
                ExpressionNode::literal(LiteralValue::String("it's".into())),
                ExpressionNode::variable("x"),
            ],
            true,
        );
        assert_eq!(node.dump(), "\"my col\" NOT IN ('it''s', @x)");
    }

    #[test]
    fn test_dump_case() {
        let node = ExpressionNode::condition(
            vec![WhenThen {
                when: ExpressionNode::literal(LiteralValue::Boolean(true)),
                then: int(1),
            }],
            Some(ExpressionNode::literal(LiteralValue::Null)),
        );
        assert_eq!(node.dump(), "CASE WHEN TRUE THEN 1 ELSE NULL END");
    }

    #[test]
    fn test_node_count() {
        let node = ExpressionNode::binary_op(
            BinaryOperator::And,
            ExpressionNode::column("a"),
            ExpressionNode::unary_op(UnaryOperator::Not, ExpressionNode::column("b")),
        );
        assert_eq!(node.node_count(), 4);
    }
}
