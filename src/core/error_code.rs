//! Error code system modelled on compiler diagnostics (EX0001, EX0002, etc.)
//!
//! Codes are grouped by the subsystem that raises them so that hosts can
//! filter or document them without inspecting the message text.

use std::fmt;

/// Error categories for organizing error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Parser errors (EX0001-EX0050)
    Parser,
    /// Evaluation errors (EX0051-EX0100)
    Evaluation,
    /// Function registry errors (EX0101-EX0150)
    Registry,
    /// Layer and data provider errors (EX0151-EX0200)
    Provider,
}

/// Error code in the `EX0001` style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub code: u16,
}

impl ErrorCode {
    /// Create a new error code
    pub const fn new(code: u16) -> Self {
        Self { code }
    }

    /// Get the full error code string (e.g., "EX0001")
    pub fn code_str(&self) -> String {
        format!("EX{:04}", self.code)
    }

    /// Get error category for this error code
    pub fn category(&self) -> ErrorCategory {
        match self.code {
            1..=50 => ErrorCategory::Parser,
            51..=100 => ErrorCategory::Evaluation,
            101..=150 => ErrorCategory::Registry,
            _ => ErrorCategory::Provider,
        }
    }

    /// Short human-readable title
    pub fn title(&self) -> &'static str {
        match self.code {
            1 => "Syntax error",
            2 => "Unexpected end of expression",
            3 => "Invalid literal",
            4 => "Unknown function",
            5 => "Invalid argument count",
            6 => "Invalid named parameter",
            7 => "Expression nested too deeply",
            51 => "Evaluation failed",
            52 => "Type conversion failed",
            53 => "Maximum evaluation depth exceeded",
            54 => "Expression has no root node",
            101 => "Function already registered",
            102 => "Built-in function cannot be removed",
            103 => "Function not found",
            151 => "Layer not found",
            152 => "Unknown aggregate",
            153 => "Aggregate calculation failed",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EX{:04}", self.code)
    }
}

// Parser errors
pub const EX0001: ErrorCode = ErrorCode::new(1);
pub const EX0002: ErrorCode = ErrorCode::new(2);
pub const EX0003: ErrorCode = ErrorCode::new(3);
pub const EX0004: ErrorCode = ErrorCode::new(4);
pub const EX0005: ErrorCode = ErrorCode::new(5);
pub const EX0006: ErrorCode = ErrorCode::new(6);
pub const EX0007: ErrorCode = ErrorCode::new(7);

// Evaluation errors
pub const EX0051: ErrorCode = ErrorCode::new(51);
pub const EX0052: ErrorCode = ErrorCode::new(52);
pub const EX0053: ErrorCode = ErrorCode::new(53);
pub const EX0054: ErrorCode = ErrorCode::new(54);

// Registry errors
pub const EX0101: ErrorCode = ErrorCode::new(101);
pub const EX0102: ErrorCode = ErrorCode::new(102);
pub const EX0103: ErrorCode = ErrorCode::new(103);

// Provider errors
pub const EX0151: ErrorCode = ErrorCode::new(151);
pub const EX0152: ErrorCode = ErrorCode::new(152);
pub const EX0153: ErrorCode = ErrorCode::new(153);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_formatting() {
        assert_eq!(EX0004.to_string(), "EX0004");
        assert_eq!(EX0153.code_str(), "EX0153");
    }

    #[test]
    fn test_categories() {
        assert_eq!(EX0001.category(), ErrorCategory::Parser);
        assert_eq!(EX0053.category(), ErrorCategory::Evaluation);
        assert_eq!(EX0101.category(), ErrorCategory::Registry);
        assert_eq!(EX0152.category(), ErrorCategory::Provider);
    }
}
