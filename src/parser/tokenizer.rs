//! Tokenizer for expression text
//!
//! Produces zero-copy tokens: string literals and quoted column names keep
//! their raw slice and are unescaped by the parser. Keywords are matched
//! case-insensitively. `--` line comments and `/* */` block comments are
//! skipped.

use super::error::{ParseError, ParseResult};

/// Tokens of the expression grammar
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'input> {
    // Literals
    /// Integer literal (e.g., 42)
    Integer(i64),
    /// Floating point literal (e.g., 3.14, 1e-3)
    Double(f64),
    /// String literal body between single quotes, still escaped
    String(&'input str),

    // References
    /// Bare identifier: column name or function name (may start with `$`)
    Identifier(&'input str),
    /// Double-quoted column name body, still escaped
    QuotedColumn(&'input str),
    /// Variable reference without the leading `@`
    Variable(&'input str),

    // Arithmetic
    /// Addition (+)
    Plus,
    /// Subtraction or negation (-)
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
    /// String concatenation (||)
    Concat,

    // Comparison
    /// Equality (=)
    Equal,
    /// Inequality (<> or !=)
    NotEqual,
    /// Less than (<)
    LessThan,
    /// Less or equal (<=)
    LessThanOrEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater or equal (>=)
    GreaterThanOrEqual,
    /// Regular expression match (~)
    Tilde,

    // Keywords
    /// AND
    And,
    /// OR
    Or,
    /// NOT
    Not,
    /// LIKE
    Like,
    /// ILIKE
    ILike,
    /// IS
    Is,
    /// IN
    In,
    /// CASE
    Case,
    /// WHEN
    When,
    /// THEN
    Then,
    /// ELSE
    Else,
    /// END
    End,
    /// TRUE
    True,
    /// FALSE
    False,
    /// NULL
    Null,

    // Punctuation
    /// Opening parenthesis
    LeftParen,
    /// Closing parenthesis
    RightParen,
    /// Argument separator
    Comma,
    /// Named argument assignment (:=)
    NamedAssign,
}

impl Token<'_> {
    /// Keyword token for an identifier, matched case-insensitively
    pub fn from_keyword(word: &str) -> Option<Token<'static>> {
        let token = match word.to_ascii_uppercase().as_str() {
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "LIKE" => Token::Like,
            "ILIKE" => Token::ILike,
            "IS" => Token::Is,
            "IN" => Token::In,
            "CASE" => Token::Case,
            "WHEN" => Token::When,
            "THEN" => Token::Then,
            "ELSE" => Token::Else,
            "END" => Token::End,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "NULL" => Token::Null,
            _ => return None,
        };
        Some(token)
    }

    /// Source text used in error messages
    pub fn describe(&self) -> String {
        match self {
            Token::Integer(i) => i.to_string(),
            Token::Double(d) => d.to_string(),
            Token::String(s) => format!("'{s}'"),
            Token::Identifier(s) => (*s).to_string(),
            Token::QuotedColumn(s) => format!("\"{s}\""),
            Token::Variable(s) => format!("@{s}"),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Multiply => "*".into(),
            Token::Divide => "/".into(),
            Token::IntDivide => "//".into(),
            Token::Modulo => "%".into(),
            Token::Power => "^".into(),
            Token::Concat => "||".into(),
            Token::Equal => "=".into(),
            Token::NotEqual => "<>".into(),
            Token::LessThan => "<".into(),
            Token::LessThanOrEqual => "<=".into(),
            Token::GreaterThan => ">".into(),
            Token::GreaterThanOrEqual => ">=".into(),
            Token::Tilde => "~".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::Like => "LIKE".into(),
            Token::ILike => "ILIKE".into(),
            Token::Is => "IS".into(),
            Token::In => "IN".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::True => "TRUE".into(),
            Token::False => "FALSE".into(),
            Token::Null => "NULL".into(),
            Token::LeftParen => "(".into(),
            Token::RightParen => ")".into(),
            Token::Comma => ",".into(),
            Token::NamedAssign => ":=".into(),
        }
    }
}

/// A token with its byte range in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub start: usize,
    pub end: usize,
}

/// Streaming tokenizer over an input string
pub struct Tokenizer<'input> {
    input: &'input str,
    pos: usize,
}

impl<'input> Tokenizer<'input> {
    pub fn new(input: &'input str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn is_id_start(c: char) -> bool {
        c.is_alphabetic() || c == '_' || c == '$'
    }

    fn is_id_continue(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    /// Skip whitespace and comments
    fn skip_trivia(&mut self) -> ParseResult<()> {
        loop {
            match (self.peek_char(), self.peek_char_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump();
                }
                (Some('-'), Some('-')) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.input[self.pos..].find("*/") {
                        Some(offset) => self.pos += offset + 2,
                        None => {
                            return Err(ParseError::SyntaxError {
                                position: start,
                                message: "Unclosed comment".to_string(),
                            });
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn scan_while(&mut self, predicate: impl Fn(char) -> bool) -> &'input str {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn parse_number(&mut self) -> ParseResult<Token<'input>> {
        let start = self.pos;
        self.scan_while(|c| c.is_ascii_digit());
        let mut is_double = false;
        if self.peek_char() == Some('.') {
            is_double = true;
            self.bump();
            self.scan_while(|c| c.is_ascii_digit());
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let exponent_digits = match self.peek_char_at(1) {
                Some('+' | '-') => self.peek_char_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_digits {
                is_double = true;
                self.bump();
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.bump();
                }
                self.scan_while(|c| c.is_ascii_digit());
            }
        }

        let text = &self.input[start..self.pos];
        let invalid = || ParseError::InvalidLiteral {
            literal_type: "number".to_string(),
            value: text.to_string(),
            position: start,
        };
        if is_double {
            text.parse::<f64>().map(Token::Double).map_err(|_| invalid())
        } else {
            match text.parse::<i64>() {
                Ok(i) => Ok(Token::Integer(i)),
                // too large for an integer, keep it as a double
                Err(_) => text.parse::<f64>().map(Token::Double).map_err(|_| invalid()),
            }
        }
    }

    /// Body of a quoted literal; the closing quote may be escaped by doubling,
    /// and inside single quotes by a backslash
    fn parse_quoted(&mut self, quote: char) -> ParseResult<&'input str> {
        let open = self.pos;
        self.bump();
        let start = self.pos;
        loop {
            match self.bump() {
                Some('\\') if quote == '\'' => {
                    self.bump();
                }
                Some(c) if c == quote => {
                    if self.peek_char() == Some(quote) {
                        self.bump();
                        continue;
                    }
                    return Ok(&self.input[start..self.pos - 1]);
                }
                Some(_) => {}
                None => return Err(ParseError::UnclosedString { position: open }),
            }
        }
    }

    /// Next token, or `None` at end of input
    pub fn next_token(&mut self) -> ParseResult<Option<Spanned<Token<'input>>>> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek_char() else {
            return Ok(None);
        };

        let token = match c {
            '0'..='9' => self.parse_number()?,
            '.' if self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                self.parse_number()?
            }
            '\'' => Token::String(self.parse_quoted('\'')?),
            '"' => Token::QuotedColumn(self.parse_quoted('"')?),
            '@' => {
                self.bump();
                let name = self.scan_while(Self::is_id_continue);
                if name.is_empty() {
                    return Err(ParseError::SyntaxError {
                        position: start,
                        message: "Expected variable name after '@'".to_string(),
                    });
                }
                Token::Variable(name)
            }
            c if Self::is_id_start(c) => {
                self.bump();
                self.scan_while(Self::is_id_continue);
                let word = &self.input[start..self.pos];
                Token::from_keyword(word).unwrap_or(Token::Identifier(word))
            }
            _ => {
                self.bump();
                let next = self.peek_char();
                let (token, consumed_next) = match (c, next) {
                    ('+', _) => (Token::Plus, false),
                    ('-', _) => (Token::Minus, false),
                    ('*', _) => (Token::Multiply, false),
                    ('/', Some('/')) => (Token::IntDivide, true),
                    ('/', _) => (Token::Divide, false),
                    ('%', _) => (Token::Modulo, false),
                    ('^', _) => (Token::Power, false),
                    ('|', Some('|')) => (Token::Concat, true),
                    ('=', _) => (Token::Equal, false),
                    ('!', Some('=')) => (Token::NotEqual, true),
                    ('<', Some('>')) => (Token::NotEqual, true),
                    ('<', Some('=')) => (Token::LessThanOrEqual, true),
                    ('<', _) => (Token::LessThan, false),
                    ('>', Some('=')) => (Token::GreaterThanOrEqual, true),
                    ('>', _) => (Token::GreaterThan, false),
                    ('~', _) => (Token::Tilde, false),
                    (':', Some('=')) => (Token::NamedAssign, true),
                    ('(', _) => (Token::LeftParen, false),
                    (')', _) => (Token::RightParen, false),
                    (',', _) => (Token::Comma, false),
                    (other, _) => {
                        return Err(ParseError::UnexpectedToken {
                            token: other.to_string(),
                            position: start,
                        });
                    }
                };
                if consumed_next {
                    self.bump();
                }
                token
            }
        };

        Ok(Some(Spanned {
            value: token,
            start,
            end: self.pos,
        }))
    }

    /// Tokenize the whole input
    pub fn tokenize_all(&mut self) -> ParseResult<Vec<Spanned<Token<'input>>>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}
