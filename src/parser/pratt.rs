//! Pratt parser for the expression grammar
//!
//! Binding powers, lowest to highest:
//! `OR`, `AND`, prefix `NOT`, comparisons (including `LIKE`, `IS`, `IN`),
//! `+ - ||`, `* / // %`, `^` (right associative), unary `-`/`+`.
//!
//! Function names are resolved through the global registry while parsing so
//! that argument lists can be validated and completed with parameter defaults.

use std::sync::Arc;

use super::ParserConfig;
use super::error::{ParseError, ParseResult};
use super::tokenizer::{Spanned, Token, Tokenizer};
use crate::ast::{
    BinaryOperator, ExpressionNode, FunctionCallNode, LiteralValue, UnaryOperator, WhenThen,
};
use crate::registry::{ExpressionFunction, FunctionRegistry, Signature};

/// Operator precedence levels (higher = tighter binding)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    /// Logical OR
    Or = 1,
    /// Logical AND
    And = 2,
    /// Prefix NOT
    Not = 3,
    /// Comparison, pattern matching and membership
    Comparison = 4,
    /// Additive operators (+, -, ||)
    Additive = 5,
    /// Multiplicative operators (*, /, //, %)
    Multiplicative = 6,
    /// Exponentiation (^), right associative
    Power = 7,
    /// Unary minus and plus
    Unary = 8,
}

impl Precedence {
    #[inline(always)]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Next higher precedence level for left-associative operators
    #[inline(always)]
    pub const fn next_level(self) -> Self {
        match self {
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Not,
            Precedence::Not => Precedence::Comparison,
            Precedence::Comparison => Precedence::Additive,
            Precedence::Additive => Precedence::Multiplicative,
            Precedence::Multiplicative => Precedence::Power,
            Precedence::Power => Precedence::Unary,
            Precedence::Unary => Precedence::Unary,
        }
    }

    #[inline(always)]
    pub const fn is_right_associative(self) -> bool {
        matches!(self, Precedence::Power)
    }
}

/// Infix form found at the current position
enum Infix {
    Binary(BinaryOperator),
    In { negated: bool },
}

impl Infix {
    fn precedence(&self) -> Precedence {
        match self {
            Infix::In { .. } => Precedence::Comparison,
            Infix::Binary(op) => match op.precedence() {
                1 => Precedence::Or,
                2 => Precedence::And,
                4 => Precedence::Comparison,
                5 => Precedence::Additive,
                6 => Precedence::Multiplicative,
                _ => Precedence::Power,
            },
        }
    }
}

/// Recursive-descent Pratt parser over a pre-tokenized input
pub struct PrattParser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
    input_len: usize,
    depth: usize,
    config: ParserConfig,
}

impl<'input> PrattParser<'input> {
    pub fn new(input: &'input str, config: ParserConfig) -> ParseResult<Self> {
        let tokens = Tokenizer::new(input).tokenize_all()?;
        Ok(Self {
            tokens,
            pos: 0,
            input_len: input.len(),
            depth: 0,
            config,
        })
    }

    #[inline]
    fn current(&self) -> Option<&Token<'input>> {
        self.tokens.get(self.pos).map(|t| &t.value)
    }

    #[inline]
    fn peek(&self, offset: usize) -> Option<&Token<'input>> {
        self.tokens.get(self.pos + offset).map(|t| &t.value)
    }

    /// Byte offset of the current token, or the end of input
    #[inline]
    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.input_len, |t| t.start)
    }

    #[inline]
    fn advance(&mut self) -> Option<Token<'input>> {
        let token = self.tokens.get(self.pos).map(|t| t.value.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self) -> ParseError {
        match self.current() {
            Some(token) => ParseError::UnexpectedToken {
                token: token.describe(),
                position: self.position(),
            },
            None => ParseError::UnexpectedEof {
                position: self.input_len,
            },
        }
    }

    fn expect(&mut self, expected: Token<'static>) -> ParseResult<()> {
        if self.current() == Some(&expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    /// Parse the whole input as one expression
    pub fn parse(&mut self) -> ParseResult<ExpressionNode> {
        let expression = self.parse_expression_with_precedence(Precedence::Or)?;
        if self.current().is_some() {
            return Err(self.unexpected());
        }
        Ok(expression)
    }

    fn parse_expression_with_precedence(
        &mut self,
        min_precedence: Precedence,
    ) -> ParseResult<ExpressionNode> {
        self.depth += 1;
        if self.depth > self.config.max_depth {
            return Err(ParseError::TooDeep {
                position: self.position(),
            });
        }
        let result = self.parse_binary(min_precedence);
        self.depth -= 1;
        result
    }

    fn parse_binary(&mut self, min_precedence: Precedence) -> ParseResult<ExpressionNode> {
        let mut left = self.parse_primary()?;

        while let Some(infix) = self.peek_infix() {
            let precedence = infix.precedence();
            if precedence < min_precedence {
                break;
            }
            self.consume_infix(&infix);

            left = match infix {
                Infix::In { negated } => {
                    let list = self.parse_in_list()?;
                    ExpressionNode::in_op(left, list, negated)
                }
                Infix::Binary(op) => {
                    let next = if precedence.is_right_associative() {
                        precedence
                    } else {
                        precedence.next_level()
                    };
                    let right = self.parse_expression_with_precedence(next)?;
                    ExpressionNode::binary_op(op, left, right)
                }
            };
        }

        Ok(left)
    }

    /// Infix operator at the current position, without consuming it
    fn peek_infix(&self) -> Option<Infix> {
        let op = match self.current()? {
            Token::Or => BinaryOperator::Or,
            Token::And => BinaryOperator::And,
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::LessThan => BinaryOperator::LessThan,
            Token::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
            Token::GreaterThan => BinaryOperator::GreaterThan,
            Token::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
            Token::Tilde => BinaryOperator::Regexp,
            Token::Like => BinaryOperator::Like,
            Token::ILike => BinaryOperator::ILike,
            Token::Is => match self.peek(1) {
                Some(Token::Not) => BinaryOperator::IsNot,
                _ => BinaryOperator::Is,
            },
            Token::In => return Some(Infix::In { negated: false }),
            Token::Not => match self.peek(1)? {
                Token::Like => BinaryOperator::NotLike,
                Token::ILike => BinaryOperator::NotILike,
                Token::In => return Some(Infix::In { negated: true }),
                _ => return None,
            },
            Token::Plus => BinaryOperator::Plus,
            Token::Minus => BinaryOperator::Minus,
            Token::Concat => BinaryOperator::Concat,
            Token::Multiply => BinaryOperator::Multiply,
            Token::Divide => BinaryOperator::Divide,
            Token::IntDivide => BinaryOperator::IntDivide,
            Token::Modulo => BinaryOperator::Modulo,
            Token::Power => BinaryOperator::Power,
            _ => return None,
        };
        Some(Infix::Binary(op))
    }

    fn consume_infix(&mut self, infix: &Infix) {
        let width = match infix {
            Infix::In { negated: true }
            | Infix::Binary(BinaryOperator::NotLike)
            | Infix::Binary(BinaryOperator::NotILike)
            | Infix::Binary(BinaryOperator::IsNot) => 2,
            _ => 1,
        };
        self.pos += width;
    }

    fn parse_in_list(&mut self) -> ParseResult<Vec<ExpressionNode>> {
        self.expect(Token::LeftParen)?;
        let mut list = vec![self.parse_expression_with_precedence(Precedence::Or)?];
        while self.current() == Some(&Token::Comma) {
            self.advance();
            list.push(self.parse_expression_with_precedence(Precedence::Or)?);
        }
        self.expect(Token::RightParen)?;
        Ok(list)
    }

    fn parse_primary(&mut self) -> ParseResult<ExpressionNode> {
        let position = self.position();
        let Some(token) = self.advance() else {
            return Err(ParseError::UnexpectedEof {
                position: self.input_len,
            });
        };

        match token {
            Token::Integer(i) => Ok(ExpressionNode::literal(LiteralValue::Integer(i))),
            Token::Double(d) => Ok(ExpressionNode::literal(LiteralValue::Double(d))),
            Token::String(raw) => Ok(ExpressionNode::literal(LiteralValue::String(
                process_string_escapes(raw),
            ))),
            Token::True => Ok(ExpressionNode::literal(LiteralValue::Boolean(true))),
            Token::False => Ok(ExpressionNode::literal(LiteralValue::Boolean(false))),
            Token::Null => Ok(ExpressionNode::literal(LiteralValue::Null)),
            Token::QuotedColumn(raw) => Ok(ExpressionNode::column(raw.replace("\"\"", "\""))),
            Token::Variable(name) => Ok(ExpressionNode::variable(name)),
            Token::Identifier(name) => {
                if self.current() == Some(&Token::LeftParen) {
                    self.advance();
                    self.parse_function_call(name, position)
                } else if name.starts_with('$') {
                    self.build_function_call(name, Vec::new(), position)
                } else {
                    Ok(ExpressionNode::column(name))
                }
            }
            Token::Not => {
                let operand = self.parse_expression_with_precedence(Precedence::Not)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Not, operand))
            }
            Token::Minus => {
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Minus, operand))
            }
            Token::Plus => {
                let operand = self.parse_expression_with_precedence(Precedence::Unary)?;
                Ok(ExpressionNode::unary_op(UnaryOperator::Plus, operand))
            }
            Token::LeftParen => {
                let expression = self.parse_expression_with_precedence(Precedence::Or)?;
                self.expect(Token::RightParen)?;
                Ok(expression)
            }
            Token::Case => self.parse_case(position),
            other => Err(ParseError::UnexpectedToken {
                token: other.describe(),
                position,
            }),
        }
    }

    fn parse_case(&mut self, position: usize) -> ParseResult<ExpressionNode> {
        let mut branches = Vec::new();
        while self.current() == Some(&Token::When) {
            self.advance();
            let when = self.parse_expression_with_precedence(Precedence::Or)?;
            self.expect(Token::Then)?;
            let then = self.parse_expression_with_precedence(Precedence::Or)?;
            branches.push(WhenThen { when, then });
        }
        if branches.is_empty() {
            return Err(ParseError::SyntaxError {
                position,
                message: "CASE requires at least one WHEN clause".to_string(),
            });
        }
        let else_branch = if self.current() == Some(&Token::Else) {
            self.advance();
            Some(self.parse_expression_with_precedence(Precedence::Or)?)
        } else {
            None
        };
        self.expect(Token::End)?;
        Ok(ExpressionNode::condition(branches, else_branch))
    }

    /// Argument list after the opening parenthesis
    fn parse_function_call(&mut self, name: &str, position: usize) -> ParseResult<ExpressionNode> {
        let mut arguments = Vec::new();
        if self.current() == Some(&Token::RightParen) {
            self.advance();
            return self.build_function_call(name, arguments, position);
        }
        loop {
            let arg_position = self.position();
            let named = match (self.current(), self.peek(1)) {
                (Some(Token::Identifier(param)), Some(Token::NamedAssign)) => {
                    let param = (*param).to_string();
                    self.pos += 2;
                    Some(param)
                }
                _ => None,
            };
            let value = self.parse_expression_with_precedence(Precedence::Or)?;
            arguments.push(CallArgument {
                name: named,
                value,
                position: arg_position,
            });
            match self.current() {
                Some(Token::Comma) => {
                    self.advance();
                }
                Some(Token::RightParen) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.unexpected()),
            }
        }
        self.build_function_call(name, arguments, position)
    }

    fn build_function_call(
        &self,
        name: &str,
        arguments: Vec<CallArgument>,
        position: usize,
    ) -> ParseResult<ExpressionNode> {
        let Some(function) = FunctionRegistry::global().find(name) else {
            log::debug!("parse: unknown function '{name}'");
            return Err(ParseError::UnknownFunction {
                name: name.to_string(),
                position,
            });
        };
        let arguments = bind_arguments(&function, arguments, position)?;
        Ok(ExpressionNode::FunctionCall(FunctionCallNode::new(
            function.name(),
            arguments,
        )))
    }
}

/// A call argument as written, before binding to parameters
struct CallArgument {
    name: Option<String>,
    value: ExpressionNode,
    position: usize,
}

fn wrong_count(function: &dyn ExpressionFunction, count: usize, position: usize) -> ParseError {
    let signature = function.signature();
    let min = signature.min_args();
    let message = match signature.max_args() {
        Some(max) if max == min => format!(
            "{} function is called with wrong number of arguments. Expected {} but got {}.",
            function.name(),
            min,
            count
        ),
        Some(max) => format!(
            "{} function is called with wrong number of arguments. Expected between {} and {} parameters but {} were provided.",
            function.name(),
            min,
            max,
            count
        ),
        None => format!(
            "{} function is called with wrong number of arguments. Expected at least {} but got {}.",
            function.name(),
            min,
            count
        ),
    };
    ParseError::InvalidArguments {
        function: function.name().to_string(),
        message,
        position,
    }
}

/// Map written arguments onto declared parameters, filling omitted optional
/// parameters with their default literal
fn bind_arguments(
    function: &Arc<dyn ExpressionFunction>,
    arguments: Vec<CallArgument>,
    position: usize,
) -> ParseResult<Vec<ExpressionNode>> {
    let signature = function.signature();
    let count = arguments.len();

    let Signature::Parameters(parameters) = signature else {
        if let Some(named) = arguments.iter().find(|a| a.name.is_some()) {
            return Err(ParseError::InvalidParameterName {
                parameter: named.name.clone().unwrap_or_default(),
                function: function.name().to_string(),
                position: named.position,
            });
        }
        if !signature.accepts(count) {
            return Err(wrong_count(function.as_ref(), count, position));
        }
        return Ok(arguments.into_iter().map(|a| a.value).collect());
    };

    let has_named = arguments.iter().any(|a| a.name.is_some());
    if count > parameters.len() || (!has_named && !signature.accepts(count)) {
        return Err(wrong_count(function.as_ref(), count, position));
    }

    let mut slots: Vec<Option<ExpressionNode>> = vec![None; parameters.len()];
    let mut seen_named = false;
    for (index, argument) in arguments.into_iter().enumerate() {
        let slot = match &argument.name {
            None if seen_named => {
                return Err(ParseError::InvalidArguments {
                    function: function.name().to_string(),
                    message: "All parameters following a named parameter must also be named."
                        .to_string(),
                    position: argument.position,
                });
            }
            None => index,
            Some(name) => {
                seen_named = true;
                let Some(slot) = signature.parameter_index(name) else {
                    return Err(ParseError::InvalidParameterName {
                        parameter: name.clone(),
                        function: function.name().to_string(),
                        position: argument.position,
                    });
                };
                if slots[slot].is_some() {
                    return Err(ParseError::InvalidArguments {
                        function: function.name().to_string(),
                        message: format!(
                            "Duplicate parameter '{}' specified for function '{}'",
                            parameters[slot].name,
                            function.name()
                        ),
                        position: argument.position,
                    });
                }
                slot
            }
        };
        slots[slot] = Some(argument.value);
    }

    slots
        .into_iter()
        .zip(parameters)
        .map(|(slot, parameter)| match slot {
            Some(node) => Ok(node),
            None if parameter.optional => Ok(ExpressionNode::literal(LiteralValue::from_value(
                &parameter.default_value,
            ))),
            None => Err(ParseError::InvalidArguments {
                function: function.name().to_string(),
                message: format!(
                    "No value specified for parameter '{}' for {}",
                    parameter.name,
                    function.name()
                ),
                position,
            }),
        })
        .collect()
}

/// Resolve escapes in a single-quoted literal body: `''` and backslash forms
pub fn process_string_escapes(raw: &str) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some(other) => result.push(other),
                None => result.push('\\'),
            },
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                result.push('\'');
            }
            other => result.push(other),
        }
    }
    result
}

/// Parse expression text with the given configuration
pub fn parse_expression_pratt(input: &str, config: ParserConfig) -> ParseResult<ExpressionNode> {
    PrattParser::new(input, config)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn parse(input: &str) -> ParseResult<ExpressionNode> {
        parse_expression_pratt(input, ParserConfig::default())
    }

    fn dump(input: &str) -> String {
        parse(input).unwrap().dump()
    }

    #[rstest]
    #[case("1 + 2 * 3", "1 + 2 * 3")]
    #[case("(1 + 2) * 3", "(1 + 2) * 3")]
    #[case("2 ^ 3 ^ 2", "2 ^ 3 ^ 2")]
    #[case("(2 ^ 3) ^ 2", "(2 ^ 3) ^ 2")]
    #[case("1 - (2 - 3)", "1 - (2 - 3)")]
    #[case("a and b or c", "\"a\" AND \"b\" OR \"c\"")]
    #[case("not a = 1", "NOT (\"a\" = 1)")]
    #[case("(not a) = 1", "(NOT \"a\") = 1")]
    #[case("x is not null", "\"x\" IS NOT NULL")]
    #[case("x not like 'a%'", "\"x\" NOT LIKE 'a%'")]
    #[case("x not in (1, 2)", "\"x\" NOT IN (1, 2)")]
    #[case("'it''s'", "'it''s'")]
    #[case("@layer_name || 'x'", "@layer_name || 'x'")]
    #[case("case when 1 then 'a' else 'b' end", "CASE WHEN 1 THEN 'a' ELSE 'b' END")]
    fn test_round_trips_through_dump(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(dump(input), expected);
    }

    #[test]
    fn test_unary_minus_binds_tighter_than_power() {
        let node = parse("-2 ^ 2").unwrap();
        match node {
            ExpressionNode::BinaryOperation { op, left, .. } => {
                assert_eq!(op, BinaryOperator::Power);
                assert!(matches!(*left, ExpressionNode::UnaryOperation { .. }));
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(process_string_escapes(r"a\nb"), "a\nb");
        assert_eq!(process_string_escapes(r"it\'s"), "it's");
        assert_eq!(process_string_escapes("it''s"), "it's");
        assert_eq!(process_string_escapes(r"back\\slash"), "back\\slash");
    }

    #[test]
    fn test_quoted_column() {
        assert_eq!(
            parse("\"a \"\"b\"\"\"").unwrap(),
            ExpressionNode::column("a \"b\"")
        );
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            parse("no_such_function(1)").unwrap_err().to_string(),
            "Function 'no_such_function' is not known"
        );
    }

    #[test]
    fn test_optional_parameters_are_filled() {
        let node = parse("round(1.234)").unwrap();
        match node {
            ExpressionNode::FunctionCall(call) => {
                assert_eq!(call.name, "round");
                assert_eq!(call.arguments.len(), 2);
                assert_eq!(
                    call.arguments[1],
                    ExpressionNode::literal(LiteralValue::Integer(0))
                );
            }
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn test_named_arguments() {
        let node = parse("round(places:=2, value:=1.234)").unwrap();
        assert_eq!(node.dump(), "round(1.234, 2)");
    }

    #[test]
    fn test_invalid_named_argument() {
        assert_eq!(
            parse("round(1.2, digits:=2)").unwrap_err().to_string(),
            "'digits' is not a valid parameter name for function 'round'"
        );
    }

    #[test]
    fn test_positional_after_named() {
        assert_eq!(
            parse("round(value:=1.2, 2)").unwrap_err().to_string(),
            "All parameters following a named parameter must also be named."
        );
    }

    #[test]
    fn test_wrong_argument_count() {
        assert_eq!(
            parse("sqrt(1, 2)").unwrap_err().to_string(),
            "sqrt function is called with wrong number of arguments. Expected 1 but got 2."
        );
    }

    #[test]
    fn test_dollar_function_without_parens() {
        let node = parse("$pi").unwrap();
        assert!(matches!(node, ExpressionNode::FunctionCall(ref call) if call.name == "pi"));
    }

    #[test]
    fn test_aliases_resolve_to_canonical_name() {
        let node = parse("toint('3')").unwrap();
        assert_eq!(node.dump(), "to_int('3')");
    }

    #[test]
    fn test_nesting_limit() {
        let config = ParserConfig { max_depth: 8 };
        let deep = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(
            parse_expression_pratt(&deep, config),
            Err(ParseError::TooDeep { .. })
        ));
    }

    #[rstest]
    #[case("")]
    #[case("1 +")]
    #[case("(1")]
    #[case("case else 1 end")]
    #[case("1 2")]
    fn test_syntax_errors(#[case] input: &str) {
        assert!(parse(input).is_err());
    }
}
