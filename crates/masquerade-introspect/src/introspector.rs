use std::sync::Arc;

use async_trait::async_trait;

use masquerade_core::{ColumnInfo, Engine, Error, Result, SqlValue, TableSchema};

use crate::database::{Database, Row};
use crate::{mssql, mysql, postgres};

/// Column metadata as read from a catalog, before family mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    /// Declared type, including length or precision.
    pub sql_type: String,
    /// Bare type name used for family mapping.
    pub data_type: String,
    pub nullable: bool,
    pub max_length: Option<i64>,
}

/// Schema queries the engine needs about a table.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// The single primary key column of `table`.
    ///
    /// Tables without a primary key, or with a composite one, are rejected.
    async fn primary_key(&self, table: &str) -> Result<String>;

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    async fn table_schema(&self, table: &str) -> Result<TableSchema> {
        let columns = self.columns(table).await?;
        if columns.is_empty() {
            return Err(Error::schema(table, "table does not exist or has no columns"));
        }
        let primary_key = self.primary_key(table).await?;
        Ok(TableSchema {
            table: table.to_string(),
            primary_key,
            columns,
        })
    }
}

/// Introspector reading the engine's system catalogs through a [`Database`].
#[derive(Clone)]
pub struct CatalogIntrospector {
    db: Arc<dyn Database>,
}

impl CatalogIntrospector {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SchemaIntrospector for CatalogIntrospector {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let db = self.db.as_ref();
        match db.engine() {
            Engine::Postgres => postgres::queries::list_tables(db).await,
            Engine::Mysql => mysql::queries::list_tables(db).await,
            Engine::Mssql => mssql::queries::list_tables(db).await,
        }
    }

    async fn primary_key(&self, table: &str) -> Result<String> {
        let db = self.db.as_ref();
        let (schema, name) = split_table_name(table);
        let columns = match db.engine() {
            Engine::Postgres => postgres::queries::primary_key_columns(db, schema, name).await?,
            Engine::Mysql => mysql::queries::primary_key_columns(db, schema, name).await?,
            Engine::Mssql => mssql::queries::primary_key_columns(db, schema, name).await?,
        };
        single_primary_key(table, columns)
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let db = self.db.as_ref();
        let (schema, name) = split_table_name(table);
        let columns = match db.engine() {
            Engine::Postgres => {
                postgres::mapper::map_columns(postgres::queries::list_columns(db, schema, name).await?)
            }
            Engine::Mysql => {
                mysql::mapper::map_columns(mysql::queries::list_columns(db, schema, name).await?)
            }
            Engine::Mssql => {
                mssql::mapper::map_columns(mssql::queries::list_columns(db, schema, name).await?)
            }
        };
        Ok(columns)
    }
}

/// Split `schema.table` into its parts; bare names use the session default.
pub fn split_table_name(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table),
    }
}

fn single_primary_key(table: &str, mut columns: Vec<String>) -> Result<String> {
    match columns.len() {
        0 => Err(Error::schema(table, "table has no primary key")),
        1 => Ok(columns.remove(0)),
        _ => Err(Error::schema(
            table,
            format!(
                "composite primary key ({}) is not supported",
                columns.join(", ")
            ),
        )),
    }
}

pub(crate) fn optional_schema(schema: Option<&str>) -> SqlValue {
    schema.map_or(SqlValue::Null, |schema| SqlValue::Text(schema.to_string()))
}

pub(crate) fn rows_to_names(rows: Vec<Row>) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get_str("name").map(str::to_string))
        .collect()
}
