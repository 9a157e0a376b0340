//! Operator definitions for the expression AST

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary operators, in the order of the grammar's precedence table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    // Logical
    /// Three-valued `OR`
    Or,
    /// Three-valued `AND`
    And,

    // Comparison
    /// Equality (=)
    Equal,
    /// Inequality (<> or !=)
    NotEqual,
    /// Less or equal (<=)
    LessThanOrEqual,
    /// Greater or equal (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Greater than (>)
    GreaterThan,
    /// Regular expression search (~)
    Regexp,
    /// SQL-style wildcard match (LIKE)
    Like,
    /// Negated wildcard match (NOT LIKE)
    NotLike,
    /// Case-insensitive wildcard match (ILIKE)
    ILike,
    /// Negated case-insensitive wildcard match (NOT ILIKE)
    NotILike,
    /// Null-aware equality (IS)
    Is,
    /// Null-aware inequality (IS NOT)
    IsNot,

    // Arithmetic
    /// Addition or string concatenation (+)
    Plus,
    /// Subtraction (-)
    Minus,
    /// Multiplication (*)
    Multiply,
    /// Division (/)
    Divide,
    /// Integer division (//)
    IntDivide,
    /// Modulo (%)
    Modulo,
    /// Exponentiation (^)
    Power,

    // String
    /// Null-propagating concatenation (||)
    Concat,
}

impl BinaryOperator {
    /// Binding strength; higher binds tighter
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThanOrEqual
            | BinaryOperator::GreaterThanOrEqual
            | BinaryOperator::LessThan
            | BinaryOperator::GreaterThan
            | BinaryOperator::Regexp
            | BinaryOperator::Like
            | BinaryOperator::NotLike
            | BinaryOperator::ILike
            | BinaryOperator::NotILike
            | BinaryOperator::Is
            | BinaryOperator::IsNot => 4,
            BinaryOperator::Plus | BinaryOperator::Minus | BinaryOperator::Concat => 5,
            BinaryOperator::Multiply
            | BinaryOperator::Divide
            | BinaryOperator::IntDivide
            | BinaryOperator::Modulo => 6,
            BinaryOperator::Power => 7,
        }
    }

    pub fn is_right_associative(self) -> bool {
        self == BinaryOperator::Power
    }

    pub fn is_comparison(self) -> bool {
        self.precedence() == 4
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::IntDivide
                | BinaryOperator::Modulo
                | BinaryOperator::Power
        )
    }

    /// Source text of the operator
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::And => "AND",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::Regexp => "~",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::NotLike => "NOT LIKE",
            BinaryOperator::ILike => "ILIKE",
            BinaryOperator::NotILike => "NOT ILIKE",
            BinaryOperator::Is => "IS",
            BinaryOperator::IsNot => "IS NOT",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::IntDivide => "//",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Power => "^",
            BinaryOperator::Concat => "||",
        }
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOperator {
    /// Three-valued negation (NOT)
    Not,
    /// Arithmetic negation (-)
    Minus,
    /// Numeric identity (+)
    Plus,
}

impl UnaryOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOperator::Not => "NOT ",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
        }
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str().trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_ordering() {
        assert!(BinaryOperator::Power.precedence() > BinaryOperator::Multiply.precedence());
        assert!(BinaryOperator::Multiply.precedence() > BinaryOperator::Plus.precedence());
        assert!(BinaryOperator::Plus.precedence() > BinaryOperator::Equal.precedence());
        assert!(BinaryOperator::Equal.precedence() > BinaryOperator::And.precedence());
        assert!(BinaryOperator::And.precedence() > BinaryOperator::Or.precedence());
        assert_eq!(BinaryOperator::Concat.precedence(), BinaryOperator::Minus.precedence());
    }

    #[test]
    fn test_only_power_is_right_associative() {
        assert!(BinaryOperator::Power.is_right_associative());
        assert!(!BinaryOperator::Minus.is_right_associative());
    }
}
