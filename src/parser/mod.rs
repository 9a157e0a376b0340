//! Expression parser
//!
//! Converts expression text into an [`ExpressionNode`] tree using a
//! hand-written tokenizer and Pratt parser.

pub mod error;
pub mod pratt;
pub mod tokenizer;

pub use error::{ParseError, ParseResult};
pub use pratt::{parse_expression_pratt, process_string_escapes};
pub use tokenizer::{Spanned, Token, Tokenizer};

use crate::ast::ExpressionNode;

/// Parser limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Maximum nesting of sub-expressions
    pub max_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_depth: 128 }
    }
}

/// Parse expression text with the default configuration
pub fn parse(input: &str) -> ParseResult<ExpressionNode> {
    parse_with_config(input, ParserConfig::default())
}

pub fn parse_with_config(input: &str, config: ParserConfig) -> ParseResult<ExpressionNode> {
    parse_expression_pratt(input, config)
}
