//! Abstract Syntax Tree (AST) definitions for expressions
//!
//! Nodes are immutable once parsed. Evaluation, preparation and the static
//! analyses used by hosts (referenced columns and variables, geometry
//! needs, static-ness) are implemented directly on [`ExpressionNode`].

mod eval;
mod expression;
mod operator;

pub use expression::*;
pub use operator::*;

pub(crate) use eval::values_equal;
