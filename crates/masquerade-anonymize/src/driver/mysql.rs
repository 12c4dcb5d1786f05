use masquerade_core::{ColumnFamily, ColumnInfo, SqlValue};

use super::is_plain_identifier;

pub(super) const DISABLE_FOREIGN_KEYS: &str =
    "SET @masquerade_fk_checks = @@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS = 0";
pub(super) const RESTORE_FOREIGN_KEYS: &str = "SET FOREIGN_KEY_CHECKS = @masquerade_fk_checks";

pub(super) fn quote_ident(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Integer columns get an explicit signed or unsigned cast, fixed-point
/// columns a DECIMAL cast with the declared precision.
pub(super) fn value_expression(placeholder: &str, column: &ColumnInfo) -> String {
    match column.family {
        ColumnFamily::Integer if column.unsigned => format!("CAST({placeholder} AS UNSIGNED)"),
        ColumnFamily::Integer => format!("CAST({placeholder} AS SIGNED)"),
        ColumnFamily::Decimal => match precision(&column.sql_type) {
            Some(precision) => format!("CAST({placeholder} AS DECIMAL{precision})"),
            None => placeholder.to_string(),
        },
        _ => placeholder.to_string(),
    }
}

/// The `(p,s)` part of a declared type such as `decimal(10,2) unsigned`.
fn precision(sql_type: &str) -> Option<&str> {
    let start = sql_type.find('(')?;
    let end = sql_type[start..].find(')')? + start;
    Some(&sql_type[start..=end])
}

pub(super) fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(value) => value.to_string(),
        SqlValue::Float(value) if value.is_finite() => value.to_string(),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::Decimal(value) => value.clone(),
        SqlValue::Bytes(value) => format!("X'{}'", hex::encode(value)),
        other => other
            .to_plain_string()
            .map(|text| escape(&text))
            .unwrap_or_else(|| "NULL".to_string()),
    }
}

fn escape(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "''"))
}

/// Binary strings and BIT columns, whose bytes cannot travel as text.
pub(super) fn is_binary(column: &ColumnInfo) -> bool {
    column.family == ColumnFamily::Binary || column.sql_type.starts_with("bit")
}

/// Binary columns are read into user variables and decoded with `UNHEX`.
pub(super) fn load_data_statement(table: &str, path: &str, columns: &[ColumnInfo]) -> String {
    let mut targets = Vec::with_capacity(columns.len());
    let mut decoded = Vec::new();
    for (index, column) in columns.iter().enumerate() {
        let name = quote_ident(&column.name);
        if is_binary(column) {
            let variable = format!("@hex{}", index + 1);
            decoded.push(format!("{name} = UNHEX({variable})"));
            targets.push(variable);
        } else {
            targets.push(name);
        }
    }
    let set = if decoded.is_empty() {
        String::new()
    } else {
        format!(" SET {}", decoded.join(", "))
    };
    format!(
        "LOAD DATA LOCAL INFILE {} INTO TABLE {table} CHARACTER SET utf8mb4 \
         FIELDS TERMINATED BY '|' OPTIONALLY ENCLOSED BY '\"' ESCAPED BY '\\\\' \
         LINES TERMINATED BY '\\n' ({}){set}",
        escape(path),
        targets.join(", ")
    )
}
