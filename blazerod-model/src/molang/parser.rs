//! Molang syntax tree and Pratt parser

use super::ParseError;
use super::lexer::{Spanned, Token, tokenize};

/// Namespace of a dotted identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// `query.*` / `q.*`, read-only
    Query,
    /// `variable.*` / `v.*`, persists across evaluations of one playback
    Variable,
    /// `temp.*` / `t.*`, cleared before each evaluation
    Temp,
    /// `context.*` / `c.*`
    Context,
    /// `math.*`
    Math,
}

impl Scope {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "query" | "q" => Some(Self::Query),
            "variable" | "v" => Some(Self::Variable),
            "temp" | "t" => Some(Self::Temp),
            "context" | "c" => Some(Self::Context),
            "math" => Some(Self::Math),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    pub scope: Scope,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f32),
    Str(String),
    Ident(Path),
    Call(Path, Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `cond ? then : else`
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `cond ? then`, zero when the condition is false
    Conditional(Box<Expr>, Box<Expr>),
    Assign(Path, Box<Expr>),
    Return(Box<Expr>),
    Block(Vec<Expr>),
}

impl Expr {
    /// Fold an expression made only of literals and arithmetic
    pub fn constant_value(&self) -> Option<f32> {
        match self {
            Expr::Number(value) => Some(*value),
            Expr::Unary(UnaryOp::Negate, inner) => inner.constant_value().map(|v| -v),
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.constant_value()?, rhs.constant_value()?);
                match op {
                    BinaryOp::Add => Some(a + b),
                    BinaryOp::Sub => Some(a - b),
                    BinaryOp::Mul => Some(a * b),
                    BinaryOp::Div if b != 0.0 => Some(a / b),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Parsed statements plus whether the source was a multi-statement program
#[derive(Debug, Clone, PartialEq)]
pub(super) struct Parsed {
    pub statements: Vec<Expr>,
    pub complex: bool,
}

/// Deepest expression tree the parser builds, counting both nesting and
/// operator chains
pub(super) const MAX_DEPTH: usize = 128;

const ASSIGN_BP: (u8, u8) = (2, 1);
const TERNARY_BP: (u8, u8) = (4, 3);
const PREFIX_BP: u8 = 19;

fn infix_binding_power(token: &Token) -> Option<(u8, u8)> {
    let bp = match token {
        Token::Assign => ASSIGN_BP,
        Token::Question => TERNARY_BP,
        Token::Coalesce => (5, 6),
        Token::Or => (7, 8),
        Token::And => (9, 10),
        Token::Eq | Token::Ne => (11, 12),
        Token::Lt | Token::Le | Token::Gt | Token::Ge => (13, 14),
        Token::Plus | Token::Minus => (15, 16),
        Token::Star | Token::Slash => (17, 18),
        _ => return None,
    };
    Some(bp)
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    let op = match token {
        Token::Plus => BinaryOp::Add,
        Token::Minus => BinaryOp::Sub,
        Token::Star => BinaryOp::Mul,
        Token::Slash => BinaryOp::Div,
        Token::Eq => BinaryOp::Eq,
        Token::Ne => BinaryOp::Ne,
        Token::Lt => BinaryOp::Lt,
        Token::Le => BinaryOp::Le,
        Token::Gt => BinaryOp::Gt,
        Token::Ge => BinaryOp::Ge,
        Token::And => BinaryOp::And,
        Token::Or => BinaryOp::Or,
        Token::Coalesce => BinaryOp::Coalesce,
        _ => return None,
    };
    Some(op)
}

pub(super) fn parse(source: &str) -> Result<Parsed, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let (statements, complex) = parser.statements(&Token::Eof)?;
    if statements.is_empty() {
        return Err(ParseError::new(0, "empty expression"));
    }
    Ok(Parsed {
        statements,
        complex,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].0
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].1
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(
                self.offset(),
                format!("expected {expected:?}, found {:?}", self.peek()),
            ))
        }
    }

    /// Statements separated by `;` up to `end` (not consumed)
    fn statements(&mut self, end: &Token) -> Result<(Vec<Expr>, bool), ParseError> {
        let mut statements = Vec::new();
        let mut complex = false;
        while self.peek() != end {
            if *self.peek() == Token::Semicolon {
                self.advance();
                complex = true;
                continue;
            }
            statements.push(self.statement()?);
            match self.peek() {
                Token::Semicolon => {
                    self.advance();
                    complex = true;
                }
                token if token == end => {}
                token => {
                    return Err(ParseError::new(
                        self.offset(),
                        format!("expected ';', found {token:?}"),
                    ));
                }
            }
        }
        Ok((statements, complex))
    }

    fn statement(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek(), Token::Ident(name) if name == "return") {
            self.advance();
            let value = self.expr(0)?;
            return Ok(Expr::Return(Box::new(value)));
        }
        self.expr(0)
    }

    fn expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        self.depth += 1;
        let result = self.expr_inner(min_bp);
        self.depth -= 1;
        result
    }

    fn check_depth(&self, chain: usize) -> Result<(), ParseError> {
        if self.depth + chain > MAX_DEPTH {
            return Err(ParseError::new(
                self.offset(),
                format!("expression nested deeper than {MAX_DEPTH}"),
            ));
        }
        Ok(())
    }

    fn expr_inner(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        self.check_depth(0)?;
        let mut lhs = self.prefix()?;

        let mut chain = 0;
        loop {
            let token = self.peek().clone();
            let Some((left_bp, right_bp)) = infix_binding_power(&token) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            chain += 1;
            self.check_depth(chain)?;
            let offset = self.offset();
            self.advance();

            lhs = match token {
                Token::Assign => {
                    let Expr::Ident(path) = lhs else {
                        return Err(ParseError::new(offset, "left side of '=' is not a variable"));
                    };
                    if !matches!(path.scope, Scope::Variable | Scope::Temp) {
                        return Err(ParseError::new(offset, "only variable.* and temp.* are writable"));
                    }
                    Expr::Assign(path, Box::new(self.expr(right_bp)?))
                }
                Token::Question => {
                    let then_branch = self.expr(0)?;
                    if *self.peek() == Token::Colon {
                        self.advance();
                        let else_branch = self.expr(right_bp)?;
                        Expr::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch))
                    } else {
                        Expr::Conditional(Box::new(lhs), Box::new(then_branch))
                    }
                }
                _ => {
                    let op = binary_op(&token)
                        .ok_or_else(|| ParseError::new(offset, format!("unexpected {token:?}")))?;
                    Expr::Binary(op, Box::new(lhs), Box::new(self.expr(right_bp)?))
                }
            };
        }

        Ok(lhs)
    }

    fn prefix(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Token::Number(value) => Ok(Expr::Number(value)),
            Token::Str(value) => Ok(Expr::Str(value)),
            Token::Minus => Ok(Expr::Unary(UnaryOp::Negate, Box::new(self.expr(PREFIX_BP)?))),
            Token::Plus => self.expr(PREFIX_BP),
            Token::Not => Ok(Expr::Unary(UnaryOp::Not, Box::new(self.expr(PREFIX_BP)?))),
            Token::LParen => {
                let inner = self.expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::LBrace => {
                let (statements, _) = self.statements(&Token::RBrace)?;
                self.expect(&Token::RBrace)?;
                Ok(Expr::Block(statements))
            }
            Token::Ident(name) => self.identifier(name, offset),
            token => Err(ParseError::new(offset, format!("unexpected {token:?}"))),
        }
    }

    fn identifier(&mut self, name: String, offset: usize) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => return Ok(Expr::Number(1.0)),
            "false" => return Ok(Expr::Number(0.0)),
            _ => {}
        }
        let Some((prefix, rest)) = name.split_once('.') else {
            return Err(ParseError::new(offset, format!("unknown identifier {name:?}")));
        };
        let scope = Scope::from_prefix(prefix)
            .ok_or_else(|| ParseError::new(offset, format!("unknown namespace {prefix:?}")))?;
        let path = Path {
            scope,
            name: rest.to_string(),
        };

        if *self.peek() != Token::LParen {
            return Ok(Expr::Ident(path));
        }
        self.advance();
        let mut args = Vec::new();
        if *self.peek() != Token::RParen {
            loop {
                args.push(self.expr(0)?);
                if *self.peek() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::Call(path, args))
    }
}
