use masquerade_core::{Result, SqlValue};

use crate::database::Database;
use crate::introspector::{RawColumn, optional_schema, rows_to_names};

const LIST_TABLES: &str = r#"
    select c.relname::text as name
    from pg_class c
    join pg_namespace n on n.oid = c.relnamespace
    where n.nspname = current_schema()
      and c.relkind in ('r', 'p')
    order by c.relname
"#;

const PRIMARY_KEY: &str = r#"
    select a.attname::text as name
    from pg_index i
    join pg_class c on c.oid = i.indrelid
    join pg_namespace n on n.oid = c.relnamespace
    join pg_attribute a on a.attrelid = c.oid and a.attnum = any(i.indkey)
    where i.indisprimary
      and n.nspname = coalesce($1::text, current_schema())
      and c.relname = $2
    order by a.attnum
"#;

const COLUMNS: &str = r#"
    select
      a.attname::text as name,
      pg_catalog.format_type(a.atttypid, a.atttypmod) as sql_type,
      t.typname::text as data_type,
      (not a.attnotnull) as nullable,
      case when a.atttypmod > 4 and t.typname in ('varchar', 'bpchar')
           then (a.atttypmod - 4)::int8
      end as max_length
    from pg_attribute a
    join pg_class c on c.oid = a.attrelid
    join pg_namespace n on n.oid = c.relnamespace
    join pg_type t on t.oid = a.atttypid
    where n.nspname = coalesce($1::text, current_schema())
      and c.relname = $2
      and a.attnum > 0
      and not a.attisdropped
    order by a.attnum
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
            nullable: matches!(row.get("nullable"), Some(SqlValue::Bool(true))),
            max_length: row.get_i64("max_length"),
        })
        .collect())
}
