use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use masquerade_core::{Engine, Result, SqlValue};

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Case-insensitive lookup; catalogs disagree on the case of aliases.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
            .and_then(|index| self.values.get(index))
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SqlValue::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            SqlValue::Decimal(text) | SqlValue::Text(text) => text.parse().ok(),
            other => other.as_i64(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    pub fn to_json(&self) -> JsonValue {
        let map: Map<String, JsonValue> = self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().map(SqlValue::to_json))
            .collect();
        JsonValue::Object(map)
    }
}

/// Connection capability used by introspection, expressions and the engine.
///
/// Implementations own a single connection and serialise access to it.
#[async_trait]
pub trait Database: Send + Sync {
    fn engine(&self) -> Engine;

    /// Host name the server was reached at.
    fn host(&self) -> &str;

    /// Execute a statement, returning the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    /// Run `prelude` then the bulk-load `statement` inside one transaction,
    /// feeding the delimited file at `path` as its data source. Nothing is
    /// committed unless every step succeeds. `epilogue` runs on the same
    /// session once the transaction is over, committed or not.
    async fn load_file(
        &self,
        prelude: &[String],
        statement: &str,
        epilogue: &[String],
        path: &Path,
    ) -> Result<u64>;
}
