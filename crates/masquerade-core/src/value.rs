use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single SQL cell value, either read from the database or produced by a
/// generator.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Exact numeric kept in its textual form.
    Decimal(String),
    Text(String),
    /// Raw bytes of a binary column.
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(value) => Some(*value),
            SqlValue::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(value) | SqlValue::Decimal(value) => Some(value.as_str()),
            _ => None,
        }
    }

    /// Textual form written to staging files, bytes as lowercase hex;
    /// `None` for NULL.
    pub fn to_plain_string(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(value) => Some(if *value { "1" } else { "0" }.to_string()),
            SqlValue::Int(value) => Some(value.to_string()),
            SqlValue::Float(value) => Some(value.to_string()),
            SqlValue::Decimal(value) | SqlValue::Text(value) => Some(value.clone()),
            SqlValue::Bytes(value) => Some(hex::encode(value)),
            SqlValue::Uuid(value) => Some(value.to_string()),
            SqlValue::Date(value) => Some(value.format("%Y-%m-%d").to_string()),
            SqlValue::Time(value) => Some(value.format("%H:%M:%S%.f").to_string()),
            SqlValue::Timestamp(value) => Some(value.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }

    /// Truncate text to at most `max_chars` characters.
    pub fn truncated(self, max_chars: Option<u32>) -> Self {
        match (self, max_chars) {
            (SqlValue::Text(text), Some(max)) if text.chars().count() > max as usize => {
                SqlValue::Text(text.chars().take(max as usize).collect())
            }
            (value, _) => value,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            SqlValue::Null => JsonValue::Null,
            SqlValue::Bool(value) => JsonValue::Bool(*value),
            SqlValue::Int(value) => JsonValue::from(*value),
            SqlValue::Float(value) => JsonValue::from(*value),
            other => other
                .to_plain_string()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
        }
    }

    /// Convert a JSON scalar (generator params, expression results) into a
    /// value. Arrays and objects are kept as their JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => SqlValue::Null,
            JsonValue::Bool(value) => SqlValue::Bool(*value),
            JsonValue::Number(number) => number
                .as_i64()
                .map(SqlValue::Int)
                .or_else(|| number.as_f64().map(SqlValue::Float))
                .unwrap_or_else(|| SqlValue::Decimal(number.to_string())),
            JsonValue::String(text) => SqlValue::Text(text.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_plain_string() {
            Some(text) => f.write_str(&text),
            None => f.write_str("NULL"),
        }
    }
}
