use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::types::RecordId;

/// A single record field value as understood by the remote service.
///
/// Equality is structural: values of different kinds never compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Reference(RecordId),
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => {
                if fl.is_nan() {
                    write!(f, "NaN")
                } else if fl.is_infinite() {
                    if *fl > 0.0 {
                        write!(f, "Infinity")
                    } else {
                        write!(f, "-Infinity")
                    }
                } else {
                    write!(f, "{}", fl)
                }
            }
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Reference(id) => write!(f, "->{}", id),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        Self::Reference(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Float(3.5), Value::Float(3.5));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        assert_ne!(Value::Text("1".into()), Value::Integer(1));
    }

    #[test]
    fn test_value_equality_is_strict() {
        assert_ne!(Value::Integer(2), Value::Float(2.0));
        assert_ne!(Value::Float(0.0), Value::Float(1e-17));

        let big = 1i64 << 53;
        assert_ne!(Value::Integer(big + 1), Value::Float(big as f64));
        assert_eq!(
            Value::List(vec![Value::Float(0.5), Value::Null]),
            Value::List(vec![Value::Float(0.5), Value::Null])
        );
    }

    #[test]
    fn test_value_display() {
        let list = Value::List(vec![Value::Integer(1), Value::Text("a".into()), Value::Null]);
        assert_eq!(list.to_string(), "[1, a, NULL]");
        assert_eq!(Value::Float(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn test_value_serde_shape() {
        let json = serde_json::to_value(Value::Integer(7)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "integer", "value": 7}));

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, Value::Integer(7));
    }
}
