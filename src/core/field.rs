//! Field value types, kind tags and conversions

use crate::core::error::CoercionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

/// A polymorphic field value that can hold different types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Null,
}

/// The kind of a non-null [`FieldValue`]
///
/// Used by the model catalog to declare the value type of an entity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Uuid => "uuid",
            ValueKind::DateTime => "date_time",
        };
        f.write_str(name)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::String(s) => write!(f, "{:?}", s),
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Uuid(u) => write!(f, "{}", u),
            FieldValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            FieldValue::Null => f.write_str("null"),
        }
    }
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a UUID if possible
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// The kind of this value, `None` for `Null`
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            FieldValue::String(_) => Some(ValueKind::String),
            FieldValue::Integer(_) => Some(ValueKind::Integer),
            FieldValue::Float(_) => Some(ValueKind::Float),
            FieldValue::Boolean(_) => Some(ValueKind::Boolean),
            FieldValue::Uuid(_) => Some(ValueKind::Uuid),
            FieldValue::DateTime(_) => Some(ValueKind::DateTime),
            FieldValue::Null => None,
        }
    }

    /// Whether this value counts as "not yet assigned" for key generation
    ///
    /// Null, `0`, the empty string and the nil UUID are all unset.
    pub fn is_unset_key(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Integer(i) => *i == 0,
            FieldValue::String(s) => s.is_empty() || s == &Uuid::nil().to_string(),
            FieldValue::Uuid(u) => u.is_nil(),
            _ => false,
        }
    }

    /// Build a value from a JSON scalar
    ///
    /// Arrays and objects have no scalar form and map to `Null`.
    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => FieldValue::Null,
        }
    }

    /// Convert to the JSON form used in entity rows
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(x) => Value::from(*x),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::Null => Value::Null,
        }
    }

    /// Convert this value to `kind`
    pub fn coerce(&self, kind: ValueKind) -> Result<FieldValue, CoercionError> {
        let fail = || CoercionError {
            value: self.clone(),
            target: kind,
        };

        if self.kind() == Some(kind) {
            return Ok(self.clone());
        }

        match (self, kind) {
            (FieldValue::Null, _) => Err(fail()),
            (_, ValueKind::String) => Ok(FieldValue::String(self.display_string())),
            (FieldValue::Integer(i), ValueKind::Float) => Ok(FieldValue::Float(*i as f64)),
            (FieldValue::Float(x), ValueKind::Integer) => {
                if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x < i64::MAX as f64 {
                    Ok(FieldValue::Integer(*x as i64))
                } else {
                    Err(fail())
                }
            }
            (FieldValue::Integer(i), ValueKind::Boolean) => Ok(FieldValue::Boolean(*i != 0)),
            (FieldValue::Boolean(b), ValueKind::Integer) => Ok(FieldValue::Integer(i64::from(*b))),
            (FieldValue::String(s), ValueKind::Integer) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| fail()),
            (FieldValue::String(s), ValueKind::Float) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|_| fail()),
            (FieldValue::String(s), ValueKind::Boolean) => {
                match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(FieldValue::Boolean(true)),
                    "false" => Ok(FieldValue::Boolean(false)),
                    _ => Err(fail()),
                }
            }
            (FieldValue::String(s), ValueKind::Uuid) => Uuid::parse_str(s.trim())
                .map(FieldValue::Uuid)
                .map_err(|_| fail()),
            (FieldValue::String(s), ValueKind::DateTime) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| FieldValue::DateTime(dt.with_timezone(&Utc)))
                .map_err(|_| fail()),
            _ => Err(fail()),
        }
    }

    /// Compare two values
    ///
    /// Integers and floats compare numerically. When the kinds differ and one
    /// side is a string, the string is coerced to the other side's kind first,
    /// since rows carry UUIDs and timestamps in string form. Two strings that
    /// both parse as RFC 3339 timestamps compare chronologically. Null and
    /// incomparable pairs yield `None`.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, _) | (_, FieldValue::Null) => None,
            (FieldValue::String(a), FieldValue::String(b)) => {
                // Timestamps travel as RFC 3339 text, whose precision varies
                match (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                    (Ok(a), Ok(b)) => Some(a.cmp(&b)),
                    _ => Some(a.cmp(b)),
                }
            }
            (FieldValue::Integer(a), FieldValue::Integer(b)) => Some(a.cmp(b)),
            (FieldValue::Integer(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Boolean(a), FieldValue::Boolean(b)) => Some(a.cmp(b)),
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => Some(a.cmp(b)),
            (FieldValue::DateTime(a), FieldValue::DateTime(b)) => Some(a.cmp(b)),
            (FieldValue::String(_), rhs) => {
                let lhs = self.coerce(rhs.kind()?).ok()?;
                lhs.compare(rhs)
            }
            (lhs, FieldValue::String(_)) => {
                let rhs = other.coerce(lhs.kind()?).ok()?;
                lhs.compare(&rhs)
            }
            _ => None,
        }
    }

    /// Total order used for sorting: nulls and incomparable values first
    pub fn sort_cmp(&self, other: &FieldValue) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }

    /// Identity string used to track keys (no quoting, unlike `Display`)
    pub fn key_string(&self) -> String {
        self.display_string()
    }

    fn display_string(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
            other => other.to_string(),
        }
    }
}

/// Resolve a dot-separated path inside a JSON document
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::DateTime(value)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}
