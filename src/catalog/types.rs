//! Data types for arcset
//!
//! This module defines the closed set of column types and the conversion of
//! supplied values into a column's type.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};
use crate::storage::Value;

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type
    Boolean,
    /// 32-bit integer
    Int32,
    /// 64-bit integer
    Int64,
    /// Double-precision floating point
    Double,
    /// Unicode string
    String,
    /// Date and time (milliseconds since epoch)
    DateTime,
    /// Any value, stored as supplied
    Object,
}

impl DataType {
    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Int64 | DataType::Double)
    }

    /// Check if this type can carry an auto-increment sequence
    pub fn supports_auto_increment(&self) -> bool {
        self.is_numeric()
    }

    /// Check if values of this type can be related to values of `other`
    pub fn is_comparable_with(&self, other: &DataType) -> bool {
        self == other
    }

    /// Convert `value` into this type
    ///
    /// Nulls pass through untouched. Integers narrow with a range check,
    /// strings are parsed, and anything else that does not fit is a
    /// [`Error::TypeMismatch`].
    pub fn coerce(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = |v: &Value| Error::TypeMismatch {
            from: v.type_name().to_string(),
            to: self.to_string(),
        };
        match (self, &value) {
            (DataType::Object, _) => Ok(value),

            (DataType::Boolean, Value::Boolean(_)) => Ok(value),
            (DataType::Boolean, Value::Int32(_) | Value::Int64(_)) => {
                value.as_bool().map(Value::Boolean).ok_or_else(|| mismatch(&value))
            }
            (DataType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                _ => Err(mismatch(&value)),
            },

            (DataType::Int32, Value::Int32(_)) => Ok(value),
            (DataType::Int32, Value::Int64(_)) => {
                value.as_i32().map(Value::Int32).ok_or_else(|| mismatch(&value))
            }
            (DataType::Int32, Value::Double(f)) if f.fract() == 0.0 => {
                i32::try_from(*f as i64).map(Value::Int32).map_err(|_| mismatch(&value))
            }
            (DataType::Int32, Value::Boolean(b)) => Ok(Value::Int32(*b as i32)),
            (DataType::Int32, Value::String(s)) => {
                s.trim().parse().map(Value::Int32).map_err(|_| mismatch(&value))
            }

            (DataType::Int64, Value::Int32(i)) => Ok(Value::Int64(*i as i64)),
            (DataType::Int64, Value::Int64(_)) => Ok(value),
            (DataType::Int64, Value::Double(f)) if f.fract() == 0.0 => Ok(Value::Int64(*f as i64)),
            (DataType::Int64, Value::Boolean(b)) => Ok(Value::Int64(*b as i64)),
            (DataType::Int64, Value::String(s)) => {
                s.trim().parse().map(Value::Int64).map_err(|_| mismatch(&value))
            }

            (DataType::Double, Value::Double(_)) => Ok(value),
            (DataType::Double, Value::Int32(_) | Value::Int64(_)) => {
                value.as_f64().map(Value::Double).ok_or_else(|| mismatch(&value))
            }
            (DataType::Double, Value::String(s)) => {
                s.trim().parse().map(Value::Double).map_err(|_| mismatch(&value))
            }

            (DataType::String, Value::String(_)) => Ok(value),
            (DataType::String, _) => Ok(Value::String(value.to_string())),

            (DataType::DateTime, Value::DateTime(_)) => Ok(value),
            (DataType::DateTime, Value::Int64(t)) => Ok(Value::DateTime(*t)),

            _ => Err(mismatch(&value)),
        }
    }

    /// Express a raw auto-increment counter in this type
    ///
    /// `None` when the counter is out of the type's range.
    pub(crate) fn sequence_value(&self, raw: i64) -> Option<Value> {
        match self {
            DataType::Int32 => i32::try_from(raw).ok().map(Value::Int32),
            DataType::Double => Some(Value::Double(raw as f64)),
            _ => Some(Value::Int64(raw)),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::Double => write!(f, "Double"),
            DataType::String => write!(f, "String"),
            DataType::DateTime => write!(f, "DateTime"),
            DataType::Object => write!(f, "Object"),
        }
    }
}
