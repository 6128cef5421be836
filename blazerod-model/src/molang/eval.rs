//! Molang evaluator
//!
//! Numbers are `f32`, booleans are `0.0`/`1.0`, strings only support equality.
//! Unknown queries and unset variables read as zero, matching how Bedrock
//! content is authored.

use std::sync::Arc;

use hashbrown::HashMap;
use rand::Rng;
use smallvec::SmallVec;

use super::parser::{BinaryOp, Expr, Path, Scope, UnaryOp};
use super::{MolangValue, Program};

/// Error raised while evaluating a Molang program
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("unknown function math.{0}")]
    UnknownFunction(String),

    #[error("unknown constant math.{0}")]
    UnknownConstant(String),

    #[error("math.{name} takes {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("operator {0:?} is not defined for strings")]
    StringOperand(BinaryOp),
}

/// Source of `query.*` values
pub trait QueryProvider {
    /// Look up a query by its lowercase name; `args` are the call arguments
    fn query(&self, name: &str, args: &[f32]) -> Option<f32>;
}

impl QueryProvider for () {
    fn query(&self, _name: &str, _args: &[f32]) -> Option<f32> {
        None
    }
}

/// `variable.*` storage, owned by whoever drives the evaluation
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: HashMap<String, f32>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }

    pub fn set(&mut self, name: impl Into<String>, value: f32) {
        self.values.insert(name.into(), value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Number(f32),
    Str(Arc<str>),
}

impl Scalar {
    fn number(&self) -> f32 {
        match self {
            Scalar::Number(value) => *value,
            Scalar::Str(_) => 0.0,
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Scalar::Number(value) => *value != 0.0,
            Scalar::Str(value) => !value.is_empty(),
        }
    }
}

fn flag(value: bool) -> Scalar {
    Scalar::Number(if value { 1.0 } else { 0.0 })
}

/// Non-local exit from expression evaluation
enum Interrupt {
    Return(Scalar),
    Error(EvalError),
}

impl From<EvalError> for Interrupt {
    fn from(error: EvalError) -> Self {
        Interrupt::Error(error)
    }
}

type Eval = Result<Scalar, Interrupt>;

/// One evaluation scope: queries, persistent variables and fresh temporaries
pub struct Runtime<'a> {
    queries: &'a dyn QueryProvider,
    variables: &'a mut Variables,
    temps: HashMap<String, f32>,
}

impl<'a> Runtime<'a> {
    pub fn new(queries: &'a dyn QueryProvider, variables: &'a mut Variables) -> Self {
        Self {
            queries,
            variables,
            temps: HashMap::new(),
        }
    }

    /// Evaluate a program
    ///
    /// Single-expression programs yield their value; multi-statement programs
    /// yield the value of the first executed `return`, or zero.
    pub fn eval(&mut self, program: &Program) -> Result<f32, EvalError> {
        self.temps.clear();
        let mut last = Scalar::Number(0.0);
        for statement in program.statements() {
            match self.expr(statement) {
                Ok(value) => last = value,
                Err(Interrupt::Return(value)) => return Ok(value.number()),
                Err(Interrupt::Error(error)) => return Err(error),
            }
        }
        if program.is_complex() {
            Ok(0.0)
        } else {
            Ok(last.number())
        }
    }

    /// Evaluate a program, logging failures and falling back to zero
    pub fn eval_or_zero(&mut self, program: &Program) -> f32 {
        match self.eval(program) {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!("Error evaluating Molang {:?}: {}", program.source(), error);
                0.0
            }
        }
    }

    /// Resolve a value, evaluating it when it is an expression
    pub fn value(&mut self, value: &MolangValue) -> f32 {
        match value {
            MolangValue::Plain(value) => *value,
            MolangValue::Expression(program) => self.eval_or_zero(program),
        }
    }

    fn read(&self, path: &Path) -> Result<Option<f32>, EvalError> {
        Ok(match path.scope {
            Scope::Query => self.queries.query(&path.name, &[]),
            Scope::Variable => self.variables.get(&path.name),
            Scope::Temp => self.temps.get(&path.name).copied(),
            Scope::Context => None,
            Scope::Math => Some(math_constant(&path.name)?),
        })
    }

    fn expr(&mut self, expr: &Expr) -> Eval {
        match expr {
            Expr::Number(value) => Ok(Scalar::Number(*value)),
            Expr::Str(value) => Ok(Scalar::Str(Arc::from(value.as_str()))),
            Expr::Ident(path) => Ok(Scalar::Number(self.read(path)?.unwrap_or(0.0))),
            Expr::Call(path, args) => self.call(path, args),
            Expr::Unary(op, inner) => {
                let value = self.expr(inner)?;
                Ok(match op {
                    UnaryOp::Negate => Scalar::Number(-value.number()),
                    UnaryOp::Not => flag(!value.truthy()),
                })
            }
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Ternary(cond, then_branch, else_branch) => {
                if self.expr(cond)?.truthy() {
                    self.expr(then_branch)
                } else {
                    self.expr(else_branch)
                }
            }
            Expr::Conditional(cond, then_branch) => {
                if self.expr(cond)?.truthy() {
                    self.expr(then_branch)
                } else {
                    Ok(Scalar::Number(0.0))
                }
            }
            Expr::Assign(path, value) => {
                let value = self.expr(value)?.number();
                match path.scope {
                    Scope::Variable => self.variables.set(path.name.clone(), value),
                    Scope::Temp => {
                        self.temps.insert(path.name.clone(), value);
                    }
                    // Rejected by the parser
                    Scope::Query | Scope::Context | Scope::Math => {}
                }
                Ok(Scalar::Number(value))
            }
            Expr::Return(value) => {
                let value = self.expr(value)?;
                Err(Interrupt::Return(value))
            }
            Expr::Block(statements) => {
                for statement in statements {
                    self.expr(statement)?;
                }
                Ok(Scalar::Number(0.0))
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Eval {
        match op {
            BinaryOp::And => {
                let result = self.expr(lhs)?.truthy() && self.expr(rhs)?.truthy();
                return Ok(flag(result));
            }
            BinaryOp::Or => {
                let result = self.expr(lhs)?.truthy() || self.expr(rhs)?.truthy();
                return Ok(flag(result));
            }
            BinaryOp::Coalesce => {
                let defined = match lhs {
                    Expr::Ident(path) => self.read(path)?,
                    other => Some(self.expr(other)?.number()),
                };
                return match defined {
                    Some(value) => Ok(Scalar::Number(value)),
                    None => self.expr(rhs),
                };
            }
            _ => {}
        }

        let a = self.expr(lhs)?;
        let b = self.expr(rhs)?;
        if let (Scalar::Str(_), _) | (_, Scalar::Str(_)) = (&a, &b) {
            return match op {
                BinaryOp::Eq => Ok(flag(a == b)),
                BinaryOp::Ne => Ok(flag(a != b)),
                _ => Err(EvalError::StringOperand(op).into()),
            };
        }

        let (a, b) = (a.number(), b.number());
        Ok(match op {
            BinaryOp::Add => Scalar::Number(a + b),
            BinaryOp::Sub => Scalar::Number(a - b),
            BinaryOp::Mul => Scalar::Number(a * b),
            // Molang division by zero yields zero instead of infinity
            BinaryOp::Div => Scalar::Number(if b == 0.0 { 0.0 } else { a / b }),
            BinaryOp::Eq => flag(a == b),
            BinaryOp::Ne => flag(a != b),
            BinaryOp::Lt => flag(a < b),
            BinaryOp::Le => flag(a <= b),
            BinaryOp::Gt => flag(a > b),
            BinaryOp::Ge => flag(a >= b),
            BinaryOp::And => flag(a != 0.0 && b != 0.0),
            BinaryOp::Or => flag(a != 0.0 || b != 0.0),
            BinaryOp::Coalesce => Scalar::Number(a),
        })
    }

    fn call(&mut self, path: &Path, args: &[Expr]) -> Eval {
        let mut values = SmallVec::<[f32; 4]>::new();
        for arg in args {
            values.push(self.expr(arg)?.number());
        }
        match path.scope {
            Scope::Math => Ok(Scalar::Number(math_function(&path.name, &values)?)),
            Scope::Query => Ok(Scalar::Number(
                self.queries.query(&path.name, &values).unwrap_or(0.0),
            )),
            Scope::Variable | Scope::Temp | Scope::Context => Ok(Scalar::Number(0.0)),
        }
    }
}

fn math_constant(name: &str) -> Result<f32, EvalError> {
    match name {
        "pi" => Ok(std::f32::consts::PI),
        _ => Err(EvalError::UnknownConstant(name.to_string())),
    }
}

fn arity(name: &str, args: &[f32], expected: usize) -> Result<(), EvalError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        })
    }
}

/// Wrap an angle in degrees into `[-180, 180)`
fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

fn random_range(low: f32, high: f32) -> f32 {
    if high > low {
        rand::rng().random_range(low..high)
    } else {
        low
    }
}

/// `math.*` functions; trigonometry works in degrees
fn math_function(name: &str, args: &[f32]) -> Result<f32, EvalError> {
    let unary = |f: fn(f32) -> f32| -> Result<f32, EvalError> {
        arity(name, args, 1)?;
        Ok(f(args[0]))
    };
    match name {
        "abs" => unary(f32::abs),
        "ceil" => unary(f32::ceil),
        "floor" => unary(f32::floor),
        "round" => unary(f32::round),
        "trunc" => unary(f32::trunc),
        "sqrt" => unary(f32::sqrt),
        "exp" => unary(f32::exp),
        "ln" => unary(f32::ln),
        "sin" => unary(|deg| deg.to_radians().sin()),
        "cos" => unary(|deg| deg.to_radians().cos()),
        "asin" => unary(|v| v.asin().to_degrees()),
        "acos" => unary(|v| v.acos().to_degrees()),
        "atan" => unary(|v| v.atan().to_degrees()),
        "min_angle" => unary(wrap_degrees),
        "hermite_blend" => unary(|t| 3.0 * t * t - 2.0 * t * t * t),
        "atan2" => {
            arity(name, args, 2)?;
            Ok(args[0].atan2(args[1]).to_degrees())
        }
        "pow" => {
            arity(name, args, 2)?;
            Ok(args[0].powf(args[1]))
        }
        "min" => {
            arity(name, args, 2)?;
            Ok(args[0].min(args[1]))
        }
        "max" => {
            arity(name, args, 2)?;
            Ok(args[0].max(args[1]))
        }
        "mod" => {
            arity(name, args, 2)?;
            Ok(if args[1] == 0.0 { 0.0 } else { args[0] % args[1] })
        }
        "clamp" => {
            arity(name, args, 3)?;
            Ok(args[0].max(args[1]).min(args[2]))
        }
        "lerp" => {
            arity(name, args, 3)?;
            Ok(args[0] + (args[1] - args[0]) * args[2])
        }
        "lerprotate" => {
            arity(name, args, 3)?;
            let delta = wrap_degrees(args[1] - args[0]);
            Ok(args[0] + delta * args[2])
        }
        "random" => {
            arity(name, args, 2)?;
            Ok(random_range(args[0], args[1]))
        }
        "random_integer" => {
            arity(name, args, 2)?;
            Ok(random_range(args[0].round(), args[1].round() + 1.0).floor())
        }
        "die_roll" => {
            arity(name, args, 3)?;
            let rolls = args[0].max(0.0) as u32;
            Ok((0..rolls).map(|_| random_range(args[1], args[2])).sum())
        }
        _ => Err(EvalError::UnknownFunction(name.to_string())),
    }
}
