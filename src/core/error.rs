//! Core error types with error code system

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use super::error_code::*;

/// Source location for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Character offset from start (0-based)
    pub offset: usize,
    /// Length of the problematic text
    pub length: usize,
}

impl SourceLocation {
    pub fn new(offset: usize, length: usize) -> Self {
        Self { offset, length }
    }

    pub fn point(offset: usize) -> Self {
        Self::new(offset, 1)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.offset)
    }
}

/// Main error type for everything outside the row-by-row evaluation path
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    /// Parse error with source location
    #[error("{error_code}: {message}")]
    ParseError {
        error_code: ErrorCode,
        message: String,
        expression: String,
        location: Option<SourceLocation>,
    },

    /// Evaluation error surfaced outside an expression handle
    #[error("{error_code}: {message}")]
    EvaluationError {
        error_code: ErrorCode,
        message: String,
        expression: Option<String>,
    },

    /// Function registry error
    #[error("{error_code}: {message}")]
    FunctionError {
        error_code: ErrorCode,
        message: String,
        function_name: Option<String>,
    },

    /// Layer or data provider error
    #[error("{error_code}: {message}")]
    ProviderError {
        error_code: ErrorCode,
        message: String,
        layer: Option<String>,
    },
}

impl ExpressionError {
    /// Create a parse error
    pub fn parse_error(
        error_code: ErrorCode,
        message: impl Into<String>,
        expression: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::ParseError {
            error_code,
            message: message.into(),
            expression: expression.into(),
            location,
        }
    }

    /// Create an evaluation error
    pub fn evaluation_error(error_code: ErrorCode, message: impl Into<String>) -> Self {
        Self::EvaluationError {
            error_code,
            message: message.into(),
            expression: None,
        }
    }

    /// Create a function registry error
    pub fn function_error(
        error_code: ErrorCode,
        message: impl Into<String>,
        function_name: Option<String>,
    ) -> Self {
        Self::FunctionError {
            error_code,
            message: message.into(),
            function_name,
        }
    }

    /// Create a provider error
    pub fn provider_error(
        error_code: ErrorCode,
        message: impl Into<String>,
        layer: Option<String>,
    ) -> Self {
        Self::ProviderError {
            error_code,
            message: message.into(),
            layer,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ParseError { error_code, .. }
            | Self::EvaluationError { error_code, .. }
            | Self::FunctionError { error_code, .. }
            | Self::ProviderError { error_code, .. } => *error_code,
        }
    }

    /// The bare message without the error code prefix
    pub fn message(&self) -> &str {
        match self {
            Self::ParseError { message, .. }
            | Self::EvaluationError { message, .. }
            | Self::FunctionError { message, .. }
            | Self::ProviderError { message, .. } => message,
        }
    }
}

/// Soft failure raised while evaluating a single expression.
///
/// Native functions return `Err(EvalError)` where a host would expect
/// "null result plus an error string on the expression". The expression
/// handle turns it back into exactly that.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

impl From<ExpressionError> for EvalError {
    fn from(error: ExpressionError) -> Self {
        Self::new(error.message())
    }
}

impl From<String> for EvalError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for EvalError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Result type for crate operations
pub type Result<T> = std::result::Result<T, ExpressionError>;

/// Result type for evaluation operations
pub type EvalResult<T> = std::result::Result<T, EvalError>;
