//! Scalar values stored at a single path.

use std::fmt;

use serde_json::{Number, Value};

use super::errors::TreeError;

/// The value held directly by a tree node.
///
/// `Undefined` is distinct from `Null`: it means nothing was ever written at
/// the node, while `Null` is an explicit value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Leaf {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Leaf {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Leaf::Undefined)
    }

    /// Convert to a JSON value. `Undefined` has no JSON form.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Leaf::Undefined => None,
            Leaf::Null => Some(Value::Null),
            Leaf::Bool(b) => Some(Value::Bool(*b)),
            Leaf::Number(n) => Number::from_f64(*n).map(Value::Number),
            Leaf::String(s) => Some(Value::String(s.clone())),
        }
    }

    /// Convert a scalar JSON value. Arrays and objects are not leaves.
    pub fn from_json(value: &Value) -> Result<Self, TreeError> {
        match value {
            Value::Null => Ok(Leaf::Null),
            Value::Bool(b) => Ok(Leaf::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Leaf::Number)
                .ok_or(TreeError::UnsupportedValue { kind: "number" }),
            Value::String(s) => Ok(Leaf::String(s.clone())),
            Value::Array(_) => Err(TreeError::UnsupportedValue { kind: "array" }),
            Value::Object(_) => Err(TreeError::UnsupportedValue { kind: "object" }),
        }
    }

    /// Encode for storage at a physical key.
    pub(crate) fn to_stored(&self) -> Result<Vec<u8>, TreeError> {
        match self {
            Leaf::Undefined => Err(TreeError::UnsupportedValue { kind: "undefined" }),
            Leaf::Number(n) if !n.is_finite() => Err(TreeError::NonFiniteNumber { value: *n }),
            other => {
                let value = other
                    .to_json()
                    .ok_or(TreeError::UnsupportedValue { kind: "number" })?;
                Ok(serde_json::to_vec(&value)?)
            }
        }
    }

    /// Decode a value written by [`Leaf::to_stored`].
    pub(crate) fn from_stored(bytes: &[u8]) -> Result<Self, TreeError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_json(&value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Leaf::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Leaf::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Leaf::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leaf::Undefined => write!(f, "undefined"),
            Leaf::Null => write!(f, "null"),
            Leaf::Bool(b) => write!(f, "{b}"),
            Leaf::Number(n) => write!(f, "{n}"),
            Leaf::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Leaf {
    fn from(s: &str) -> Self {
        Leaf::String(s.to_string())
    }
}

impl From<String> for Leaf {
    fn from(s: String) -> Self {
        Leaf::String(s)
    }
}

impl From<f64> for Leaf {
    fn from(n: f64) -> Self {
        Leaf::Number(n)
    }
}

impl From<i64> for Leaf {
    fn from(n: i64) -> Self {
        Leaf::Number(n as f64)
    }
}

impl From<i32> for Leaf {
    fn from(n: i32) -> Self {
        Leaf::Number(f64::from(n))
    }
}

impl From<bool> for Leaf {
    fn from(b: bool) -> Self {
        Leaf::Bool(b)
    }
}
