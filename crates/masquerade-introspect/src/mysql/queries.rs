use masquerade_core::{Result, SqlValue};

use crate::database::Database;
use crate::introspector::{RawColumn, optional_schema, rows_to_names};

const LIST_TABLES: &str = r#"
    SELECT TABLE_NAME AS name
    FROM information_schema.TABLES
    WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
    ORDER BY TABLE_NAME
"#;

const PRIMARY_KEY: &str = r#"
    SELECT k.COLUMN_NAME AS name
    FROM information_schema.TABLE_CONSTRAINTS t
    JOIN information_schema.KEY_COLUMN_USAGE k
      ON k.CONSTRAINT_NAME = t.CONSTRAINT_NAME
     AND k.TABLE_SCHEMA = t.TABLE_SCHEMA
     AND k.TABLE_NAME = t.TABLE_NAME
    WHERE t.CONSTRAINT_TYPE = 'PRIMARY KEY'
      AND t.TABLE_SCHEMA = COALESCE(?, DATABASE())
      AND t.TABLE_NAME = ?
    ORDER BY k.ORDINAL_POSITION
"#;

const COLUMNS: &str = r#"
    SELECT
      COLUMN_NAME AS name,
      COLUMN_TYPE AS sql_type,
      DATA_TYPE AS data_type,
      IS_NULLABLE AS is_nullable,
      CHARACTER_MAXIMUM_LENGTH AS max_length
    FROM information_schema.COLUMNS
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ?
    ORDER BY ORDINAL_POSITION
"#;

pub async fn list_tables(db: &dyn Database) -> Result<Vec<String>> {
    Ok(rows_to_names(db.fetch_all(LIST_TABLES, &[]).await?))
}

pub async fn primary_key_columns(
    db: &dyn Database,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<String>> {
    let params = [optional_schema(schema), SqlValue::Text(table.to_string())];
    Ok(rows_to_names(db.fetch_all(PRIMARY_KEY, &params).await?))
}

pub async fn list_columns(
    db: &dyn Database,
    schema: Option<&str>,
    table: &str,
) -> Result<Vec<RawColumn>> {
    let params = [optional_schema(schema), SqlValue::Text(table.to_string())];
    let rows = db.fetch_all(COLUMNS, &params).await?;
    Ok(rows
        .iter()
        .map(|row| RawColumn {
            name: row.get_str("name").unwrap_or_default().to_string(),
            sql_type: row.get_str("sql_type").unwrap_or_default().to_string(),
            data_type: row.get_str("data_type").unwrap_or_default().to_string(),
            nullable: row
                .get_str("is_nullable")
                .is_some_and(|flag| flag.eq_ignore_ascii_case("yes")),
            max_length: row.get_i64("max_length"),
        })
        .collect())
}
