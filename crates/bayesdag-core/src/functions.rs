//! Pure functions bound to deterministic nodes.

use std::fmt;

use crate::engine::errors::DomainError;
use crate::engine::value::Value;

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
        }
    }
}

/// A pure function of parent values.
///
/// `compute` must be deterministic and side-effect free: the graph calls it
/// lazily, possibly several times per proposal, and relies on equal inputs
/// producing equal outputs.
pub trait DagFunction: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn arity(&self) -> Arity;

    fn compute(&self, args: &[&Value]) -> Result<Value, DomainError>;

    fn clone_box(&self) -> Box<dyn DagFunction>;
}

impl Clone for Box<dyn DagFunction> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Elementary arithmetic over real scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFunction {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
    Ln,
    /// Rounds half away from zero and yields an integer.
    Round,
    /// Sums any number of scalars, or the elements of a single vector.
    Sum,
}

impl DagFunction for MathFunction {
    fn name(&self) -> &'static str {
        match self {
            MathFunction::Add => "add",
            MathFunction::Sub => "sub",
            MathFunction::Mul => "mul",
            MathFunction::Div => "div",
            MathFunction::Exp => "exp",
            MathFunction::Ln => "ln",
            MathFunction::Round => "round",
            MathFunction::Sum => "sum",
        }
    }

    fn arity(&self) -> Arity {
        match self {
            MathFunction::Add | MathFunction::Sub | MathFunction::Mul | MathFunction::Div => {
                Arity::Exact(2)
            }
            MathFunction::Exp | MathFunction::Ln | MathFunction::Round => Arity::Exact(1),
            MathFunction::Sum => Arity::AtLeast(1),
        }
    }

    fn compute(&self, args: &[&Value]) -> Result<Value, DomainError> {
        let x = |i: usize| args.get(i).ok_or(DomainError::Unbound(i)).and_then(|v| v.real());
        let out = match self {
            MathFunction::Add => x(0)? + x(1)?,
            MathFunction::Sub => x(0)? - x(1)?,
            MathFunction::Mul => x(0)? * x(1)?,
            MathFunction::Div => {
                let d = x(1)?;
                if d == 0.0 {
                    return Err(DomainError::Undefined("division by zero".into()));
                }
                x(0)? / d
            }
            MathFunction::Exp => x(0)?.exp(),
            MathFunction::Ln => {
                let a = x(0)?;
                if a <= 0.0 {
                    return Err(DomainError::Undefined(format!("ln of non-positive value {a}")));
                }
                a.ln()
            }
            MathFunction::Round => return Ok(Value::Integer(x(0)?.round() as i64)),
            MathFunction::Sum => match args {
                [Value::Vector(v)] => v.iter().sum(),
                _ => {
                    let mut total = 0.0;
                    for v in args {
                        total += v.real()?;
                    }
                    total
                }
            },
        };
        Ok(Value::Real(out))
    }

    fn clone_box(&self) -> Box<dyn DagFunction> {
        Box::new(*self)
    }
}
