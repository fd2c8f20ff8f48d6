//! Typed Field Values
//!
//! Every cell of a [`Record`](super::Record) holds a [`FieldValue`]. Values arrive
//! as JSON from a loading strategy and are coerced to the declared
//! [`FieldType`] of their field when field metadata is available.
//!
//! Ordering across values is total so that multi-field sorting is always
//! well defined: `Null < Bool < numbers < String < Object`. Integers and floats
//! compare numerically with each other.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A single typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects are carried opaquely
    Object(Value),
}

/// Declared element type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int,
    Float,
    #[default]
    String,
    Bool,
    Object,
}

impl FieldValue {
    /// Build a value from raw JSON, inferring the variant from the JSON shape
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::String(s.clone()),
            other => FieldValue::Object(other.clone()),
        }
    }

    /// Build a value from raw JSON, coercing it to the declared field type
    ///
    /// Coercion is lenient: numeric strings become numbers, numbers become
    /// strings, and anything that cannot be coerced falls back to
    /// [`FieldValue::from_json`]. `null` always stays `Null`.
    pub fn coerce(value: &Value, field_type: FieldType) -> Self {
        match (field_type, value) {
            (_, Value::Null) => FieldValue::Null,
            (FieldType::Int, Value::Number(n)) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Int(n.as_f64().unwrap_or_default() as i64),
            },
            (FieldType::Int, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(FieldValue::Int)
                .unwrap_or_else(|_| FieldValue::String(s.clone())),
            (FieldType::Int, Value::Bool(b)) => FieldValue::Int(i64::from(*b)),
            (FieldType::Float, Value::Number(n)) => {
                FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
            (FieldType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(FieldValue::Float)
                .unwrap_or_else(|_| FieldValue::String(s.clone())),
            (FieldType::String, Value::String(s)) => FieldValue::String(s.clone()),
            (FieldType::String, Value::Number(n)) => FieldValue::String(n.to_string()),
            (FieldType::String, Value::Bool(b)) => FieldValue::String(b.to_string()),
            (FieldType::Bool, Value::Bool(b)) => FieldValue::Bool(*b),
            (FieldType::Bool, Value::Number(n)) => {
                FieldValue::Bool(n.as_f64().is_some_and(|f| f != 0.0))
            }
            (FieldType::Bool, Value::String(s)) => match s.as_str() {
                "true" | "1" => FieldValue::Bool(true),
                "false" | "0" | "" => FieldValue::Bool(false),
                _ => FieldValue::String(s.clone()),
            },
            (FieldType::Object, other) => FieldValue::Object(other.clone()),
            (_, other) => FieldValue::from_json(other),
        }
    }

    /// Convert back to JSON for transport payloads
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Object(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            FieldValue::Null => 0,
            FieldValue::Bool(_) => 1,
            FieldValue::Int(_) | FieldValue::Float(_) => 2,
            FieldValue::String(_) => 3,
            FieldValue::Object(_) => 4,
        }
    }

    /// Total order used by sorting
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::String(a), FieldValue::String(b)) => a.cmp(b),
            (FieldValue::Object(a), FieldValue::Object(b)) => a.to_string().cmp(&b.to_string()),
            (a, b) if a.rank() == 2 && b.rank() == 2 => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    /// Ordering used by filter comparisons
    ///
    /// Returns `None` when the two values are of incomparable kinds, in which
    /// case ordered filter operators do not match.
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Null, _) | (_, FieldValue::Null) => None,
            (a, b) if a.rank() == b.rank() => Some(a.sort_cmp(b)),
            (FieldValue::String(s), n) | (n, FieldValue::String(s)) if n.rank() == 2 => {
                let parsed = s.trim().parse::<f64>().ok()?;
                let number = n.as_f64()?;
                let ordering = number.partial_cmp(&parsed)?;
                // keep the ordering relative to `self`
                if matches!(self, FieldValue::String(_)) {
                    Some(ordering.reverse())
                } else {
                    Some(ordering)
                }
            }
            _ => None,
        }
    }

    /// Equality used by lookups and filters: `1 == 1.0`
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::String(s) => f.write_str(s),
            FieldValue::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
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

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::from_json(&value)
    }
}
