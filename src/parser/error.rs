//! Parser error types

use thiserror::Error;

use crate::core::{
    EX0001, EX0002, EX0003, EX0004, EX0005, EX0006, EX0007, ErrorCode, ExpressionError,
    SourceLocation,
};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Parse error with location information
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Syntax error at a specific location
    #[error("Syntax error at position {position}: {message}")]
    SyntaxError {
        /// Position where the error occurred
        position: usize,
        /// Error message describing the syntax error
        message: String,
    },

    /// Unexpected token
    #[error("Unexpected token '{token}' at position {position}")]
    UnexpectedToken {
        /// The unexpected token that was found
        token: String,
        /// Position where the token was found
        position: usize,
    },

    /// Unexpected end of input
    #[error("Unexpected end of expression")]
    UnexpectedEof {
        /// Position where more input was expected
        position: usize,
    },

    /// Invalid literal value
    #[error("Invalid {literal_type} literal at position {position}: {value}")]
    InvalidLiteral {
        /// Type of literal that failed to parse
        literal_type: String,
        /// The invalid value that was encountered
        value: String,
        /// Position where the invalid literal was found
        position: usize,
    },

    /// Unclosed string literal or quoted column name
    #[error("Unclosed string literal starting at position {position}")]
    UnclosedString {
        /// Position where the unclosed string started
        position: usize,
    },

    /// Call to a function the registry does not know
    #[error("Function '{name}' is not known")]
    UnknownFunction {
        /// Function name as written
        name: String,
        /// Position of the name
        position: usize,
    },

    /// Argument list does not fit the function's declared parameters
    #[error("{message}")]
    InvalidArguments {
        /// Canonical function name
        function: String,
        /// Description of the mismatch
        message: String,
        /// Position of the call
        position: usize,
    },

    /// Named argument that matches no declared parameter
    #[error("'{parameter}' is not a valid parameter name for function '{function}'")]
    InvalidParameterName {
        /// Name as written
        parameter: String,
        /// Canonical function name
        function: String,
        /// Position of the argument
        position: usize,
    },

    /// Nesting exceeds the configured parser depth
    #[error("Expression is nested too deeply")]
    TooDeep {
        /// Position where the limit was hit
        position: usize,
    },
}

impl ParseError {
    /// Byte offset the error refers to
    pub fn position(&self) -> usize {
        match self {
            ParseError::SyntaxError { position, .. }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEof { position }
            | ParseError::InvalidLiteral { position, .. }
            | ParseError::UnclosedString { position }
            | ParseError::UnknownFunction { position, .. }
            | ParseError::InvalidArguments { position, .. }
            | ParseError::InvalidParameterName { position, .. }
            | ParseError::TooDeep { position } => *position,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParseError::SyntaxError { .. } | ParseError::UnexpectedToken { .. } => EX0001,
            ParseError::UnexpectedEof { .. } | ParseError::UnclosedString { .. } => EX0002,
            ParseError::InvalidLiteral { .. } => EX0003,
            ParseError::UnknownFunction { .. } => EX0004,
            ParseError::InvalidArguments { .. } => EX0005,
            ParseError::InvalidParameterName { .. } => EX0006,
            ParseError::TooDeep { .. } => EX0007,
        }
    }

    /// Convert into the crate-level error, attaching the source text
    pub fn into_expression_error(self, expression: &str) -> ExpressionError {
        let location = Some(SourceLocation::point(self.position()));
        ExpressionError::parse_error(self.error_code(), self.to_string(), expression, location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let error = ParseError::UnknownFunction {
            name: "foo".into(),
            position: 0,
        };
        assert_eq!(error.to_string(), "Function 'foo' is not known");

        let error = ParseError::InvalidParameterName {
            parameter: "x".into(),
            function: "round".into(),
            position: 6,
        };
        assert_eq!(
            error.to_string(),
            "'x' is not a valid parameter name for function 'round'"
        );
    }

    #[test]
    fn test_conversion_keeps_code_and_location() {
        let error = ParseError::TooDeep { position: 3 }.into_expression_error("((((1))))");
        assert_eq!(error.error_code(), EX0007);
        match error {
            ExpressionError::ParseError { location, .. } => {
                assert_eq!(location, Some(SourceLocation::point(3)));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
