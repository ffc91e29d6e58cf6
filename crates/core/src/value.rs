//! Runtime field values of a typed row.

use core::cmp::Ordering;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::ScalarKind;

/// Text format used for the string projection of datetimes.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A typed field value (row side) or parsed literal (policy side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Int(i64),
    Decimal(Decimal),
    Double(f64),
    DateTime(NaiveDateTime),
    Bool(bool),
    Guid(Uuid),
    /// Enum variant name.
    Enum(String),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used by `In`/`NotIn` set membership on non-enum fields.
    ///
    /// `Null` has no projection and is never a member of any set.
    pub fn string_projection(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Int(v) => Some(v.to_string()),
            // Scale is kept, matching Postgres `numeric::text`.
            Value::Decimal(v) => Some(v.to_string()),
            Value::Double(v) => Some(v.to_string()),
            Value::DateTime(v) => Some(v.format(DATETIME_FORMAT).to_string()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Guid(v) => Some(v.hyphenated().to_string()),
            Value::Enum(v) | Value::Text(v) => Some(v.clone()),
        }
    }

    /// Compare two non-null values of compatible types.
    ///
    /// Integers and decimals compare numerically with each other; enum
    /// variants compare by ordinal under `kind`. Anything else across
    /// variants is incomparable.
    pub fn partial_compare(&self, other: &Value, kind: &ScalarKind) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Value::Decimal(a), Value::Int(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Guid(a), Value::Guid(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Enum(a), Value::Enum(b)) => {
                match (kind.enum_ordinal(a), kind.enum_ordinal(b)) {
                    (Some(x), Some(y)) => Some(x.cmp(&y)),
                    _ if a == b => Some(Ordering::Equal),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
