use sqlx::postgres::PgRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use masquerade_core::{ColumnFamily, ColumnInfo, Error, Result, SqlValue};

use crate::database::Row;
use crate::introspector::RawColumn;

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<ColumnInfo> {
    raw.into_iter()
        .map(|column| ColumnInfo {
            family: family_for(&column.data_type),
            max_length: column.max_length.and_then(|len| u32::try_from(len).ok()),
            unsigned: false,
            nullable: column.nullable,
            name: column.name,
            sql_type: column.sql_type,
        })
        .collect()
}

/// Map a `pg_type.typname` to its column family.
pub fn family_for(udt_name: &str) -> ColumnFamily {
    match udt_name {
        "int2" | "int4" | "int8" | "oid" => ColumnFamily::Integer,
        "numeric" | "money" => ColumnFamily::Decimal,
        "float4" | "float8" => ColumnFamily::Float,
        "bool" => ColumnFamily::Boolean,
        "varchar" | "bpchar" | "text" | "name" | "citext" | "char" => ColumnFamily::Text,
        "bytea" => ColumnFamily::Binary,
        "date" => ColumnFamily::Date,
        "timestamp" | "timestamptz" => ColumnFamily::DateTime,
        "time" | "timetz" => ColumnFamily::Time,
        "uuid" => ColumnFamily::Uuid,
        "json" | "jsonb" => ColumnFamily::Json,
        _ => ColumnFamily::Other,
    }
}

pub fn decode_row(row: &PgRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (index, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, index)?);
    }
    Ok(Row::new(columns, values))
}

fn decode_value(row: &PgRow, index: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(index).map_err(Error::database)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = raw.type_info().name().to_string();

    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<bool, _>(index).map(SqlValue::Bool),
        "INT2" => row.try_get::<i16, _>(index).map(|v| SqlValue::Int(v.into())),
        "INT4" => row.try_get::<i32, _>(index).map(|v| SqlValue::Int(v.into())),
        "INT8" => row.try_get::<i64, _>(index).map(SqlValue::Int),
        "FLOAT4" => row.try_get::<f32, _>(index).map(|v| SqlValue::Float(v.into())),
        "FLOAT8" => row.try_get::<f64, _>(index).map(SqlValue::Float),
        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(index)
            .map(|v| SqlValue::Decimal(v.to_string())),
        "UUID" => row.try_get::<uuid::Uuid, _>(index).map(SqlValue::Uuid),
        "DATE" => row.try_get::<chrono::NaiveDate, _>(index).map(SqlValue::Date),
        "TIME" => row.try_get::<chrono::NaiveTime, _>(index).map(SqlValue::Time),
        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(index)
            .map(SqlValue::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(index)
            .map(|v| SqlValue::Timestamp(v.naive_utc())),
        "JSON" | "JSONB" => row
            .try_get::<serde_json::Value, _>(index)
            .map(|v| SqlValue::Text(v.to_string())),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(index)
            .map(|bytes| SqlValue::Text(hex_literal(&bytes))),
        _ => row
            .try_get_unchecked::<String, _>(index)
            .map(SqlValue::Text),
    };
    value.map_err(|err| Error::database(format!("column {index} ({type_name}): {err}")))
}

/// Postgres `bytea` hex input format.
fn hex_literal(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_catalog_types_to_families() {
        assert_eq!(family_for("int4"), ColumnFamily::Integer);
        assert_eq!(family_for("varchar"), ColumnFamily::Text);
        assert_eq!(family_for("timestamptz"), ColumnFamily::DateTime);
        assert_eq!(family_for("jsonb"), ColumnFamily::Json);
        assert_eq!(family_for("tsvector"), ColumnFamily::Other);
    }

    #[test]
    fn keeps_character_limits() {
        let columns = map_columns(vec![RawColumn {
            name: "username".to_string(),
            sql_type: "character varying(32)".to_string(),
            data_type: "varchar".to_string(),
            nullable: false,
            max_length: Some(32),
        }]);
        assert_eq!(columns[0].max_length, Some(32));
        assert_eq!(columns[0].family, ColumnFamily::Text);
        assert!(!columns[0].nullable);
    }

    #[test]
    fn encodes_bytea_as_hex() {
        assert_eq!(hex_literal(&[0xde, 0xad]), "\\xdead");
    }
}
