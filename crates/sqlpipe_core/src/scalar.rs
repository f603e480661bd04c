use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SqlPipeError};

/// A typed scalar value.
///
/// Used both for literals awaiting dialect specific rendering, and for cell
/// values returned by a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    /// Null of any type.
    Null,

    /// True or false value.
    Boolean(bool),

    /// Signed 64bit int.
    Int64(i64),

    /// 64bit float. May hold infinities and NaN.
    Float64(f64),

    /// Utf-8 encoded string.
    Utf8(String),

    /// Point in time with the offset it was created with.
    Timestamp(DateTime<FixedOffset>),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn try_as_bool(&self) -> Result<bool> {
        match self {
            Self::Boolean(b) => Ok(*b),
            Self::Int64(0) => Ok(false),
            Self::Int64(1) => Ok(true),
            other => Err(SqlPipeError::InvalidSetting(format!(
                "Not a bool: {other}"
            ))),
        }
    }

    pub fn try_as_i64(&self) -> Result<i64> {
        match self {
            Self::Int64(v) => Ok(*v),
            Self::Float64(v) if v.fract() == 0.0 && v.is_finite() => Ok(*v as i64),
            other => Err(SqlPipeError::InvalidSetting(format!(
                "Not an integer: {other}"
            ))),
        }
    }

    pub fn try_as_usize(&self) -> Result<usize> {
        let v = self.try_as_i64()?;
        usize::try_from(v)
            .map_err(|_| SqlPipeError::InvalidSetting(format!("Not a non-negative integer: {v}")))
    }

    pub fn try_as_str(&self) -> Result<&str> {
        match self {
            Self::Utf8(s) => Ok(s.as_str()),
            other => Err(SqlPipeError::InvalidSetting(format!(
                "Not a string: {other}"
            ))),
        }
    }

    /// Equality used for group keys.
    ///
    /// Nulls compare equal to each other, as do NaNs. Positive and negative
    /// zero are the same key.
    pub fn key_eq(&self, other: &ScalarValue) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (a, b) => a == b,
        }
    }

    fn key_hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => (),
            Self::Boolean(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::Float64(v) => {
                let bits = if v.is_nan() {
                    f64::NAN.to_bits()
                } else if *v == 0.0 {
                    0.0_f64.to_bits()
                } else {
                    v.to_bits()
                };
                bits.hash(state)
            }
            Self::Utf8(v) => v.hash(state),
            Self::Timestamp(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// Values of the group key columns for a single row, compared with
/// [`ScalarValue::key_eq`].
#[derive(Debug, Clone)]
pub struct GroupKey(pub Vec<ScalarValue>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(&other.0).all(|(a, b)| a.key_eq(b))
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.len().hash(state);
        for v in &self.0 {
            v.key_hash(state);
        }
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        ScalarValue::Boolean(value)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<usize> for ScalarValue {
    fn from(value: usize) -> Self {
        ScalarValue::Int64(value as i64)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<DateTime<FixedOffset>> for ScalarValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        ScalarValue::Timestamp(value)
    }
}

impl<T: Into<ScalarValue>> From<Option<T>> for ScalarValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => ScalarValue::Null,
        }
    }
}
