//! Molang expression values
//!
//! Animation inputs are either a plain constant or a procedural Molang
//! expression evaluated every frame against a live context.
//!
//! ```text
//! "math.sin(query.anim_time * 360) * 10"  ->  MolangValue::Expression
//! 12.5 / "12.5" / "-(4 * 2)"              ->  MolangValue::Plain
//! ```

mod eval;
mod lexer;
mod parser;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use glam::Vec3;

pub use eval::{EvalError, QueryProvider, Runtime, Variables};
pub use parser::{BinaryOp, Expr, Path, Scope, UnaryOp};

/// Molang syntax error with the byte offset it was found at
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

#[derive(Debug)]
struct ProgramInner {
    source: String,
    statements: Vec<Expr>,
    complex: bool,
}

/// A parsed Molang program, cheap to clone
#[derive(Debug, Clone)]
pub struct Program(Arc<ProgramInner>);

impl Program {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let parsed = parser::parse(source)?;
        Ok(Self(Arc::new(ProgramInner {
            source: source.to_string(),
            statements: parsed.statements,
            complex: parsed.complex,
        })))
    }

    pub fn source(&self) -> &str {
        &self.0.source
    }

    pub fn statements(&self) -> &[Expr] {
        &self.0.statements
    }

    /// Whether the source had more than one statement
    pub fn is_complex(&self) -> bool {
        self.0.complex
    }

    /// Value of a program that is a single constant expression
    pub fn constant_value(&self) -> Option<f32> {
        match self.statements() {
            [single] if !self.is_complex() => single.constant_value(),
            _ => None,
        }
    }
}

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.statements == other.0.statements
    }
}

/// Scalar animation input
#[derive(Debug, Clone, PartialEq)]
pub enum MolangValue {
    Plain(f32),
    Expression(Program),
}

impl MolangValue {
    pub const ZERO: Self = Self::Plain(0.0);
    pub const ONE: Self = Self::Plain(1.0);

    /// Parse a Molang string
    ///
    /// Constant expressions fold to [`MolangValue::Plain`]. A malformed
    /// expression is logged and replaced by zero.
    pub fn parse(source: &str) -> Self {
        match Program::parse(source) {
            Ok(program) => match program.constant_value() {
                Some(value) => Self::Plain(value),
                None => Self::Expression(program),
            },
            Err(error) => {
                tracing::warn!("Failed to parse molang string {:?}: {}", source, error);
                Self::ZERO
            }
        }
    }

    pub fn as_plain(&self) -> Option<f32> {
        match self {
            Self::Plain(value) => Some(*value),
            Self::Expression(_) => None,
        }
    }

    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain(_))
    }
}

/// Three-component animation input
#[derive(Debug, Clone, PartialEq)]
pub struct MolangVec3 {
    pub x: MolangValue,
    pub y: MolangValue,
    pub z: MolangValue,
}

impl MolangVec3 {
    pub fn new(x: MolangValue, y: MolangValue, z: MolangValue) -> Self {
        Self { x, y, z }
    }

    pub fn splat(value: MolangValue) -> Self {
        Self {
            x: value.clone(),
            y: value.clone(),
            z: value,
        }
    }

    pub fn plain(value: Vec3) -> Self {
        Self::new(
            MolangValue::Plain(value.x),
            MolangValue::Plain(value.y),
            MolangValue::Plain(value.z),
        )
    }

    /// The constant vector, when every component is plain
    pub fn as_plain(&self) -> Option<Vec3> {
        Some(Vec3::new(
            self.x.as_plain()?,
            self.y.as_plain()?,
            self.z.as_plain()?,
        ))
    }

    pub fn components(&self) -> [&MolangValue; 3] {
        [&self.x, &self.y, &self.z]
    }

    pub fn evaluate(&self, runtime: &mut Runtime<'_>) -> Vec3 {
        Vec3::new(
            runtime.value(&self.x),
            runtime.value(&self.y),
            runtime.value(&self.z),
        )
    }
}
