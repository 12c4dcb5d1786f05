use std::net::SocketAddr;

use tokio::net::lookup_host;

use masquerade_core::SqlValue;

use super::{LoadMode, is_plain_identifier, quote_text};

pub(super) fn quote_ident(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("[{}]", name.replace(']', "]]"))
    }
}

pub(super) fn literal(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(value) => if *value { "1" } else { "0" }.to_string(),
        SqlValue::Int(value) => value.to_string(),
        SqlValue::Float(value) if value.is_finite() => value.to_string(),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::Decimal(value) => value.clone(),
        SqlValue::Text(value) => format!("N{}", quote_text(value)),
        SqlValue::Bytes(value) => format!("0x{}", hex::encode_upper(value)),
        // Separator-free forms are read the same under every DATEFORMAT.
        SqlValue::Date(value) => quote_text(&value.format("%Y%m%d").to_string()),
        SqlValue::Timestamp(value) => {
            quote_text(&value.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        }
        other => other
            .to_plain_string()
            .map(|text| quote_text(&text))
            .unwrap_or_else(|| "NULL".to_string()),
    }
}

/// BULK INSERT maps fields to columns by position, so the file always
/// carries every column. Replacing keeps identities and explicit NULLs;
/// inserting lets empty fields take column defaults.
pub(super) fn bulk_insert_statement(table: &str, path: &str, mode: LoadMode) -> String {
    let options = match mode {
        LoadMode::Insert => "",
        LoadMode::Replace => ", KEEPNULLS, KEEPIDENTITY",
    };
    format!(
        "BULK INSERT {table} FROM {} WITH (FORMAT = 'CSV', FIELDQUOTE = '\"', \
         FIELDTERMINATOR = '|', ROWTERMINATOR = '0x0a', CODEPAGE = '65001', TABLOCK{options})",
        quote_text(path)
    )
}

/// The server reads the staged file from its own disk, so it must run on
/// this machine.
pub(super) async fn ensure_loopback(host: &str) -> Result<(), String> {
    if host.eq_ignore_ascii_case("localhost") {
        return Ok(());
    }
    let addrs: Vec<SocketAddr> = lookup_host((host, 0))
        .await
        .map_err(|err| format!("cannot resolve server host '{host}': {err}"))?
        .collect();
    if !addrs.is_empty() && addrs.iter().all(|addr| addr.ip().is_loopback()) {
        Ok(())
    } else {
        Err(format!(
            "batch mode on SQL Server needs the server on this machine, '{host}' is not a loopback address"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn dates_render_unambiguously() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(literal(&SqlValue::Date(date)), "'20240309'");
        let at = date.and_hms_milli_opt(8, 5, 1, 250).unwrap();
        assert_eq!(literal(&SqlValue::Timestamp(at)), "'2024-03-09T08:05:01.250'");
    }
}
