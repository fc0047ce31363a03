//! Dynamic SQL values and their wire type tags.

use serde::{Deserialize, Serialize};

use crate::error::{Error, TypeMismatch};

/// The type of a [`Value`], with its stable wire tag.
///
/// Tags are shared by parameter binding and column decoding and must not
/// change between releases: the worker process hard-codes the same codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValueType {
    /// NULL
    Null = 0,
    /// 32-bit signed integer
    Int32 = 1,
    /// 64-bit signed integer
    Int64 = 2,
    /// 64-bit IEEE-754 float
    Double = 3,
    /// UTF-8 text
    Text = 4,
    /// Binary data
    Blob = 5,
}

impl ValueType {
    /// The wire tag byte for this type.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Decode a wire tag byte. Returns `None` for unknown tags.
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueType::Null),
            1 => Some(ValueType::Int32),
            2 => Some(ValueType::Int64),
            3 => Some(ValueType::Double),
            4 => Some(ValueType::Text),
            5 => Some(ValueType::Blob),
            _ => None,
        }
    }

    /// Human-readable type name, used in error messages.
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Null => "NULL",
            ValueType::Int32 => "INT32",
            ValueType::Int64 => "INT64",
            ValueType::Double => "DOUBLE",
            ValueType::Text => "TEXT",
            ValueType::Blob => "BLOB",
        }
    }
}

/// A dynamically-typed SQL value.
///
/// This enum represents every value the wire protocol can carry and is
/// used both for binding parameters and for fetched column values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,

    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit signed integer
    Int64(i64),

    /// 64-bit floating point
    Double(f64),

    /// Text string
    Text(String),

    /// Binary data
    Blob(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The [`ValueType`] of this value.
    pub const fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Try to get this value as an i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Int32(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to convert this value to an i64. Widens `Int32`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get this value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a byte slice.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert a `u64` to `Value`, clamping to `i64::MAX` if it
    /// overflows. A warning is logged when clamping occurs.
    ///
    /// For strict conversion that errors on overflow, use
    /// `Value::try_from(u64)`.
    #[must_use]
    pub fn from_u64_clamped(v: u64) -> Self {
        if let Ok(signed) = i64::try_from(v) {
            Value::Int64(signed)
        } else {
            tracing::warn!(
                value = v,
                clamped_to = i64::MAX,
                "u64 value exceeds i64::MAX; clamping to i64::MAX"
            );
            Value::Int64(i64::MAX)
        }
    }
}

// Conversion implementations

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Convert a `u64` to `Value`, returning an error if the value exceeds
/// `i64::MAX`. The wire carries signed integers only; use
/// [`Value::from_u64_clamped`] for silent clamping instead.
impl TryFrom<u64> for Value {
    type Error = Error;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v).map(Value::Int64).map_err(|_| {
            Error::Type(TypeMismatch {
                expected: "u64 <= i64::MAX",
                actual: "u64 beyond i64::MAX",
            })
        })
    }
}

// TryFrom implementations for extracting values

impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int32(v) => Ok(v),
            other => Err(Error::Type(TypeMismatch {
                expected: "i32",
                actual: other.value_type().name(),
            })),
        }
    }
}

impl TryFrom<Value> for i64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Int32(v) => Ok(i64::from(v)),
            Value::Int64(v) => Ok(v),
            other => Err(Error::Type(TypeMismatch {
                expected: "i64",
                actual: other.value_type().name(),
            })),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Double(v) => Ok(v),
            other => Err(Error::Type(TypeMismatch {
                expected: "f64",
                actual: other.value_type().name(),
            })),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(Error::Type(TypeMismatch {
                expected: "String",
                actual: other.value_type().name(),
            })),
        }
    }
}

impl TryFrom<Value> for Vec<u8> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Blob(v) => Ok(v),
            other => Err(Error::Type(TypeMismatch {
                expected: "Vec<u8>",
                actual: other.value_type().name(),
            })),
        }
    }
}

/// `Option<T>` extraction: `Null` maps to `None`, anything else must
/// convert to `T`.
impl<T> TryFrom<Value> for Option<T>
where
    T: TryFrom<Value, Error = Error>,
{
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(None),
            v => T::try_from(v).map(Some),
        }
    }
}
