use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::{Params, Value};

use masquerade_core::{ColumnFamily, ColumnInfo, SqlValue};

use crate::database::Row;
use crate::introspector::RawColumn;

pub fn map_columns(raw: Vec<RawColumn>) -> Vec<ColumnInfo> {
    raw.into_iter()
        .map(|column| {
            let sql_type = column.sql_type.to_ascii_lowercase();
            ColumnInfo {
                family: family_for(&column.data_type, &sql_type),
                max_length: column.max_length.and_then(|len| u32::try_from(len).ok()),
                unsigned: sql_type.contains("unsigned"),
                nullable: column.nullable,
                name: column.name,
                sql_type,
            }
        })
        .collect()
}

/// Map `DATA_TYPE` to a family; `tinyint(1)` is the conventional boolean.
pub fn family_for(data_type: &str, column_type: &str) -> ColumnFamily {
    if column_type.starts_with("tinyint(1)") {
        return ColumnFamily::Boolean;
    }
    match data_type.to_ascii_lowercase().as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            ColumnFamily::Integer
        }
        "decimal" | "numeric" => ColumnFamily::Decimal,
        "float" | "double" | "real" => ColumnFamily::Float,
        "bit" | "bool" | "boolean" => ColumnFamily::Boolean,
        "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum" | "set" => {
            ColumnFamily::Text
        }
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
            ColumnFamily::Binary
        }
        "date" => ColumnFamily::Date,
        "datetime" | "timestamp" => ColumnFamily::DateTime,
        "time" => ColumnFamily::Time,
        "json" => ColumnFamily::Json,
        _ => ColumnFamily::Other,
    }
}

pub fn to_params(params: &[SqlValue]) -> Params {
    Params::Positional(params.iter().map(to_value).collect())
}

fn to_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(flag) => Value::Int(i64::from(*flag)),
        SqlValue::Int(int) => Value::Int(*int),
        SqlValue::Float(float) => Value::Double(*float),
        SqlValue::Decimal(text) | SqlValue::Text(text) => Value::Bytes(text.clone().into_bytes()),
        SqlValue::Bytes(bytes) => Value::Bytes(bytes.clone()),
        SqlValue::Uuid(uuid) => Value::Bytes(uuid.to_string().into_bytes()),
        SqlValue::Date(date) => {
            Value::Date(date.year() as u16, date.month() as u8, date.day() as u8, 0, 0, 0, 0)
        }
        SqlValue::Time(time) => Value::Time(
            false,
            0,
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
            time.nanosecond() / 1_000,
        ),
        SqlValue::Timestamp(ts) => Value::Date(
            ts.year() as u16,
            ts.month() as u8,
            ts.day() as u8,
            ts.hour() as u8,
            ts.minute() as u8,
            ts.second() as u8,
            ts.nanosecond() / 1_000,
        ),
    }
}

/// Collation id of the `binary` character set.
const BINARY_COLLATION: u16 = 63;

pub fn decode_row(row: mysql_async::Row) -> Row {
    let meta: Vec<(String, ColumnType, bool)> = row
        .columns_ref()
        .iter()
        .map(|column| {
            (
                column.name_str().into_owned(),
                column.column_type(),
                column.character_set() == BINARY_COLLATION,
            )
        })
        .collect();
    let values = row
        .unwrap()
        .into_iter()
        .zip(meta.iter())
        .map(|(value, (_, column_type, binary))| decode_value(value, *column_type, *binary))
        .collect();
    let columns = meta.into_iter().map(|(name, _, _)| name).collect();
    Row::new(columns, values)
}

/// `binary` marks columns in the binary character set, whose bytes are
/// kept as they are.
pub fn decode_value(value: Value, column_type: ColumnType, binary: bool) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(int) => SqlValue::Int(int),
        Value::UInt(uint) => match i64::try_from(uint) {
            Ok(int) => SqlValue::Int(int),
            Err(_) => SqlValue::Decimal(uint.to_string()),
        },
        Value::Float(float) => SqlValue::Float(f64::from(float)),
        Value::Double(double) => SqlValue::Float(double),
        Value::Bytes(bytes) => match column_type {
            ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                SqlValue::Decimal(String::from_utf8_lossy(&bytes).into_owned())
            }
            ColumnType::MYSQL_TYPE_BIT => SqlValue::Bytes(bytes),
            _ if binary => SqlValue::Bytes(bytes),
            _ => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        },
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = NaiveDate::from_ymd_opt(year.into(), month.into(), day.into());
            let time = NaiveTime::from_hms_micro_opt(hour.into(), minute.into(), second.into(), micros);
            let date_only = matches!(
                column_type,
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
            );
            match (date, time) {
                (Some(date), _) if date_only => SqlValue::Date(date),
                (Some(date), Some(time)) => SqlValue::Timestamp(NaiveDateTime::new(date, time)),
                // Zero dates have no calendar form; keep the server's text.
                _ if date_only => SqlValue::Text(format!("{year:04}-{month:02}-{day:02}")),
                _ => SqlValue::Text(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                )),
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            match NaiveTime::from_hms_micro_opt(hours.into(), minutes.into(), seconds.into(), micros) {
                Some(time) if !negative && days == 0 => SqlValue::Time(time),
                _ => {
                    let sign = if negative { "-" } else { "" };
                    let total_hours = days * 24 + u32::from(hours);
                    SqlValue::Text(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
                }
            }
        }
    }
}
