//! Restricted boolean expression language for playbook conditions
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | primary
//! primary := "(" or ")" | operand ( ( "==" | "!=" | "in" | "not in" ) operand )?
//! operand := path | 'string' | "string" | number | true | false | null | "[" operand, ... "]"
//! ```
//!
//! There are no function calls, assignments or loops. A path that does not
//! resolve is undefined, and touching an undefined value anywhere makes the
//! whole condition false.

use serde_json::Value;
use thiserror::Error;

/// Source of variable values for evaluation
pub trait Variables {
    fn lookup(&self, path: &str) -> Option<Value>;
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("condition syntax error at {position}: {message}")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

/// A parsed condition, ready to be evaluated any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some((position, token)) = parser.tokens.get(parser.pos) {
            return Err(ParseError {
                position: *position,
                message: format!("unexpected {:?}", token),
            });
        }
        Ok(Self { source: source.to_string(), expr })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fail-closed evaluation: undefined anywhere yields false
    pub fn evaluate(&self, vars: &dyn Variables) -> bool {
        self.expr.eval(vars).unwrap_or(false)
    }
}

/// Marker for "a comparison touched an undefined value"
#[derive(Debug)]
struct Undefined;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { left: Operand, op: CmpOp, right: Operand },
    Truthy(Operand),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(String),
    Literal(Value),
    List(Vec<Operand>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    In,
    NotIn,
}

impl Expr {
    fn eval(&self, vars: &dyn Variables) -> Result<bool, Undefined> {
        match self {
            // Both sides are always evaluated so an undefined reference on
            // either side poisons the result, regardless of short-circuiting.
            Expr::Or(a, b) => {
                let (a, b) = (a.eval(vars)?, b.eval(vars)?);
                Ok(a || b)
            }
            Expr::And(a, b) => {
                let (a, b) = (a.eval(vars)?, b.eval(vars)?);
                Ok(a && b)
            }
            Expr::Not(inner) => Ok(!inner.eval(vars)?),
            Expr::Truthy(operand) => Ok(operand.resolve(vars)? == Value::Bool(true)),
            Expr::Compare { left, op, right } => {
                let left = left.resolve(vars)?;
                let right = right.resolve(vars)?;
                Ok(match op {
                    CmpOp::Eq => values_equal(&left, &right),
                    CmpOp::Ne => !values_equal(&left, &right),
                    CmpOp::In => contains(&right, &left)?,
                    CmpOp::NotIn => !contains(&right, &left)?,
                })
            }
        }
    }
}

impl Operand {
    fn resolve(&self, vars: &dyn Variables) -> Result<Value, Undefined> {
        match self {
            Operand::Path(path) => vars.lookup(path).ok_or(Undefined),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::List(items) => items
                .iter()
                .map(|item| item.resolve(vars))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }
}

/// JSON equality with numeric normalization (1 == 1.0)
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Membership in an array, or substring membership in a string
fn contains(haystack: &Value, needle: &Value) -> Result<bool, Undefined> {
    match (haystack, needle) {
        (Value::Array(items), _) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(text), Value::String(part)) => Ok(text.contains(part.as_str())),
        _ => Err(Undefined),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Str(String),
    Num(f64),
    Ident(String),
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let error = |position: usize, message: &str| ParseError { position, message: message.to_string() };

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => { tokens.push((start, Token::LParen)); i += 1; }
            ')' => { tokens.push((start, Token::RParen)); i += 1; }
            '[' => { tokens.push((start, Token::LBracket)); i += 1; }
            ']' => { tokens.push((start, Token::RBracket)); i += 1; }
            ',' => { tokens.push((start, Token::Comma)); i += 1; }
            '&' if chars.get(i + 1) == Some(&'&') => { tokens.push((start, Token::And)); i += 2; }
            '|' if chars.get(i + 1) == Some(&'|') => { tokens.push((start, Token::Or)); i += 2; }
            '=' if chars.get(i + 1) == Some(&'=') => { tokens.push((start, Token::Eq)); i += 2; }
            '!' if chars.get(i + 1) == Some(&'=') => { tokens.push((start, Token::Ne)); i += 2; }
            '!' => { tokens.push((start, Token::Not)); i += 1; }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(error(start, "unterminated string")),
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or_else(|| error(i, "dangling escape"))?;
                            text.push(*escaped);
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((start, Token::Str(text)));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| error(start, "malformed number"))?;
                tokens.push((start, Token::Num(number)));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if ident.ends_with('.') || ident.contains("..") {
                    return Err(error(start, "malformed variable path"));
                }
                tokens.push((start, Token::Ident(ident)));
            }
            _ => return Err(error(start, &format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or_else(|| {
            self.tokens.last().map(|(p, _)| p + 1).unwrap_or(0)
        })
    }

    fn fail<T>(&self, message: impl Into<String>) -> Result<T, ParseError> {
        Err(ParseError { position: self.position(), message: message.into() })
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.peek() {
            Some(token) if *token == expected => {
                self.pos += 1;
                Ok(())
            }
            other => self.fail(format!("expected {:?}, found {:?}", expected, other)),
        }
    }

    fn is_keyword(&self, offset: usize, word: &str) -> bool {
        matches!(self.tokens.get(self.pos + offset), Some((_, Token::Ident(w))) if w == word)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            self.expect(Token::RParen)?;
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        let op = if self.peek() == Some(&Token::Eq) {
            Some(CmpOp::Eq)
        } else if self.peek() == Some(&Token::Ne) {
            Some(CmpOp::Ne)
        } else if self.is_keyword(0, "in") {
            Some(CmpOp::In)
        } else if self.is_keyword(0, "not") && self.is_keyword(1, "in") {
            self.pos += 1;
            Some(CmpOp::NotIn)
        } else {
            None
        };

        match op {
            Some(op) => {
                self.pos += 1;
                let right = self.parse_operand()?;
                Ok(Expr::Compare { left, op, right })
            }
            None => Ok(Expr::Truthy(left)),
        }
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        match self.advance() {
            Some(Token::Str(text)) => Ok(Operand::Literal(Value::String(text))),
            Some(Token::Num(n)) => Ok(Operand::Literal(
                serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
            )),
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "null" => Operand::Literal(Value::Null),
                "in" | "not" => {
                    self.pos -= 1;
                    return self.fail(format!("unexpected keyword '{}'", word));
                }
                _ => Operand::Path(word),
            }),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::RBracket) {
                    self.pos += 1;
                    return Ok(Operand::List(items));
                }
                loop {
                    items.push(self.parse_operand()?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        _ => {
                            self.pos -= 1;
                            return self.fail("expected ',' or ']' in list");
                        }
                    }
                }
                Ok(Operand::List(items))
            }
            other => {
                self.pos -= 1;
                self.fail(format!("expected a value, found {:?}", other))
            }
        }
    }
}
