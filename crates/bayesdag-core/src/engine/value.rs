//! Opaque values carried by graph nodes.
//!
//! The propagation protocol never inspects values; only distributions and
//! functions do. Values are owned by exactly one node and copied on snapshot,
//! clone and read-out.

use std::fmt;

use super::errors::DomainError;

/// A value held by a node.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Real(f64),
    Integer(i64),
    Bool(bool),
    Vector(Vec<f64>),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Real(_) => "real",
            Value::Integer(_) => "integer",
            Value::Bool(_) => "bool",
            Value::Vector(_) => "vector",
        }
    }

    /// Numeric scalar view; integers widen to reals.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(x) => Some(*x),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Like [`as_real`](Self::as_real) but reports a [`DomainError`] on mismatch.
    pub fn real(&self) -> Result<f64, DomainError> {
        self.as_real().ok_or(DomainError::TypeMismatch {
            expected: "real",
            found: self.type_name(),
        })
    }

    /// Like [`as_integer`](Self::as_integer) but reports a [`DomainError`] on mismatch.
    pub fn integer(&self) -> Result<i64, DomainError> {
        self.as_integer().ok_or(DomainError::TypeMismatch {
            expected: "integer",
            found: self.type_name(),
        })
    }

    /// Bit-level equality. Unlike `==`, NaN equals NaN with the same payload and
    /// `0.0` differs from `-0.0`.
    pub fn bit_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Vector(a), Value::Vector(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (a, b) => a == b,
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(x) => write!(f, "{x}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Vector(v) => {
                write!(f, "[ ")?;
                for (i, x) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, " ]")
            }
        }
    }
}
