use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{ColumnData, FromSql, Query};

use masquerade_core::{ColumnFamily, ColumnInfo, Error, Result, SqlValue};

use crate::database::Row;
use crate::introspector::RawColumn;

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<ColumnInfo> {
    raw.into_iter()
        .map(|column| ColumnInfo {
            family: family_for(&column.data_type),
            // -1 marks (max) columns.
            max_length: column.max_length.and_then(|len| u32::try_from(len).ok()),
            unsigned: column.data_type.eq_ignore_ascii_case("tinyint"),
            nullable: column.nullable,
            name: column.name,
            sql_type: column.sql_type,
        })
        .collect()
}

pub fn family_for(data_type: &str) -> ColumnFamily {
    match data_type.to_ascii_lowercase().as_str() {
        "tinyint" | "smallint" | "int" | "bigint" => ColumnFamily::Integer,
        "decimal" | "numeric" | "money" | "smallmoney" => ColumnFamily::Decimal,
        "float" | "real" => ColumnFamily::Float,
        "bit" => ColumnFamily::Boolean,
        "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "xml" => ColumnFamily::Text,
        "binary" | "varbinary" | "image" => ColumnFamily::Binary,
        "date" => ColumnFamily::Date,
        "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => ColumnFamily::DateTime,
        "time" => ColumnFamily::Time,
        "uniqueidentifier" => ColumnFamily::Uuid,
        _ => ColumnFamily::Other,
    }
}

/// Render the declared type the way SSMS shows it, e.g. `nvarchar(50)`.
pub fn declared_type(data_type: &str, max_length: Option<i64>) -> String {
    match max_length {
        Some(-1) => format!("{data_type}(max)"),
        Some(len) => format!("{data_type}({len})"),
        None => data_type.to_string(),
    }
}

pub fn bind_query<'a>(sql: &'a str, params: &[SqlValue]) -> Query<'a> {
    let mut query = Query::new(sql);
    for param in params {
        match param.clone() {
            SqlValue::Null => query.bind(Option::<String>::None),
            SqlValue::Bool(value) => query.bind(value),
            SqlValue::Int(value) => query.bind(value),
            SqlValue::Float(value) => query.bind(value),
            SqlValue::Decimal(value) | SqlValue::Text(value) => query.bind(value),
            SqlValue::Bytes(value) => query.bind(value),
            SqlValue::Uuid(value) => query.bind(value),
            SqlValue::Date(value) => query.bind(value),
            SqlValue::Time(value) => query.bind(value),
            SqlValue::Timestamp(value) => query.bind(value),
        }
    }
    query
}

pub fn decode_row(row: tiberius::Row) -> Result<Row> {
    let columns = row
        .columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect();
    let values = row
        .into_iter()
        .map(decode_value)
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns, values))
}

pub fn decode_value(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(v.into())),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.map(|v| SqlValue::Text(v.into_owned())),
        ColumnData::Guid(v) => v.map(SqlValue::Uuid),
        ColumnData::Numeric(v) => v.map(|v| SqlValue::Decimal(v.to_string())),
        ColumnData::Binary(v) => v.map(|bytes| SqlValue::Text(hex_literal(&bytes))),
        other => decode_temporal(&other)?,
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn decode_temporal(data: &ColumnData<'static>) -> Result<Option<SqlValue>> {
    match data {
        ColumnData::Date(_) => Ok(NaiveDate::from_sql(data)
            .map_err(Error::database)?
            .map(SqlValue::Date)),
        ColumnData::Time(_) => Ok(NaiveTime::from_sql(data)
            .map_err(Error::database)?
            .map(SqlValue::Time)),
        ColumnData::DateTimeOffset(_) => Ok(DateTime::<Utc>::from_sql(data)
            .map_err(Error::database)?
            .map(|v| SqlValue::Timestamp(v.naive_utc()))),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            Ok(NaiveDateTime::from_sql(data)
                .map_err(Error::database)?
                .map(SqlValue::Timestamp))
        }
        _ => Err(Error::database("unsupported sql server column data")),
    }
}

fn hex_literal(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode_upper(bytes))
}
