//! Column types.

use crate::value::Value;

/// Logical column type of a collection field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlType {
    /// Free text.
    #[default]
    Text,
    /// 64-bit integer.
    BigInt,
    /// Double precision float.
    Double,
    /// Boolean.
    Bool,
    /// RFC 3339 timestamp stored as text.
    Timestamp,
    /// JSON document.
    Json,
    /// Array of text values.
    TextArray,
}

impl SqlType {
    /// Portable SQL name (dialect specific names live in `tessera-schema`).
    pub const fn sql_name(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE PRECISION",
            SqlType::Bool => "BOOLEAN",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Json => "JSON",
            SqlType::TextArray => "TEXT[]",
        }
    }

    /// Whether `value` is acceptable for a column of this type. NULL is always
    /// accepted here; nullability is checked separately.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (SqlType::Text, Value::Text(_)) => true,
            (SqlType::BigInt, v) => v.as_i64().is_some(),
            (SqlType::Double, v) => v.is_numeric(),
            (SqlType::Bool, Value::Bool(_)) => true,
            (SqlType::Timestamp, Value::Text(s)) => {
                chrono::DateTime::parse_from_rfc3339(s).is_ok()
            }
            (SqlType::Json, _) => true,
            (SqlType::TextArray, v) => v
                .as_array()
                .is_some_and(|items| items.iter().all(|i| matches!(i, Value::Text(_)))),
            _ => false,
        }
    }

    /// Whether the type is numeric (eligible for `_sum`/`_avg`).
    pub const fn is_numeric(&self) -> bool {
        matches!(self, SqlType::BigInt | SqlType::Double)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts() {
        assert!(SqlType::BigInt.accepts(&Value::BigInt(1)));
        assert!(!SqlType::BigInt.accepts(&Value::Double(1.5)));
        assert!(SqlType::Double.accepts(&Value::BigInt(1)));
        assert!(SqlType::Timestamp.accepts(&Value::Text("2024-01-01T00:00:00Z".into())));
        assert!(!SqlType::Timestamp.accepts(&Value::Text("yesterday".into())));
        assert!(SqlType::TextArray.accepts(&Value::Array(vec![Value::Text("a".into())])));
        assert!(SqlType::Text.accepts(&Value::Null));
    }
}
