use masquerade_core::{ColumnInfo, SqlValue};

use super::{is_plain_identifier, quote_text};

/// Unquoted names fold to lower case, so mixed-case names are quoted too.
pub(super) fn quote_ident(name: &str) -> String {
    if is_plain_identifier(name) && !name.chars().any(|c| c.is_ascii_uppercase()) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

pub(super) fn value_expression(placeholder: &str, column: &ColumnInfo) -> String {
    if column.sql_type.is_empty() {
        placeholder.to_string()
    } else {
        format!("CAST({placeholder} AS {})", column.sql_type)
    }
}

pub(super) fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(value) => value.to_string(),
        SqlValue::Float(value) if value.is_nan() => "'NaN'".to_string(),
        SqlValue::Float(value) if value.is_infinite() => {
            if *value > 0.0 { "'Infinity'" } else { "'-Infinity'" }.to_string()
        }
        SqlValue::Float(value) => value.to_string(),
        SqlValue::Decimal(value) => value.clone(),
        SqlValue::Bytes(value) => quote_text(&format!("\\x{}", hex::encode(value))),
        other => other
            .to_plain_string()
            .map(|text| quote_text(&text))
            .unwrap_or_else(|| "NULL".to_string()),
    }
}

pub(super) fn copy_statement(table: &str, columns: &str) -> String {
    format!(
        "COPY {table} ({columns}) FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '\"', NULL '\\N')"
    )
}
