//! Per-engine SQL dialect.
//!
//! The engine never formats SQL itself: identifier quoting, placeholders,
//! casts, literal rendering and bulk-load statements all go through a
//! [`DriverStrategy`] chosen from the connection's [`Engine`].

mod mssql;
mod mysql;
mod postgres;

use std::path::Path;

use masquerade_core::{ColumnInfo, Engine, Error, Result, SqlValue};

/// What a bulk load does to the rows already in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Append the staged rows.
    Insert,
    /// Empty the table, then load the staged rows, in one transaction.
    Replace,
}

/// Statements feeding a staged file into a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkLoad {
    /// Run before `statement`, inside the same transaction.
    pub prelude: Vec<String>,
    pub statement: String,
    /// Session restores run after the transaction ends, even a failed one.
    pub epilogue: Vec<String>,
}

impl BulkLoad {
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.prelude
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.statement.as_str()))
            .chain(self.epilogue.iter().map(String::as_str))
    }
}

/// How staged rows must be written for the engine's loader to read them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagingFormat {
    /// Unquoted field content read back as NULL.
    pub null_marker: &'static str,
    /// Double backslashes inside quoted values.
    pub escape_backslashes: bool,
    /// The loader maps fields by ordinal, so every table column is staged.
    pub all_columns: bool,
    /// Binary columns are staged as hex and decoded by the load statement.
    pub hex_binary: bool,
    /// The server process opens the file itself, so other users may read it.
    pub shared_read: bool,
}

pub const FIELD_DELIMITER: u8 = b'|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStrategy {
    Postgres,
    Mysql,
    Mssql,
}

impl DriverStrategy {
    pub fn for_engine(engine: Engine) -> Self {
        match engine {
            Engine::Postgres => DriverStrategy::Postgres,
            Engine::Mysql => DriverStrategy::Mysql,
            Engine::Mssql => DriverStrategy::Mssql,
        }
    }

    /// Strategy for a driver name such as `pdo_pgsql` or `mysql`.
    pub fn from_driver_name(name: &str) -> Result<Self> {
        Engine::from_driver_name(name).map(Self::for_engine)
    }

    pub fn engine(self) -> Engine {
        match self {
            DriverStrategy::Postgres => Engine::Postgres,
            DriverStrategy::Mysql => Engine::Mysql,
            DriverStrategy::Mssql => Engine::Mssql,
        }
    }

    /// Quote `name` when the engine would not read it back verbatim.
    /// `schema.table` names are quoted part by part.
    pub fn quote_ident(self, name: &str) -> String {
        name.split('.')
            .map(|part| match self {
                DriverStrategy::Postgres => postgres::quote_ident(part),
                DriverStrategy::Mysql => mysql::quote_ident(part),
                DriverStrategy::Mssql => mssql::quote_ident(part),
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Positional placeholder, `index` starting at 1.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            DriverStrategy::Postgres => format!("${index}"),
            DriverStrategy::Mysql => "?".to_string(),
            DriverStrategy::Mssql => format!("@P{index}"),
        }
    }

    /// `placeholder` wrapped in whatever cast `column_type` needs.
    pub fn value_expression(self, placeholder: &str, column_type: &ColumnInfo) -> String {
        match self {
            DriverStrategy::Postgres => postgres::value_expression(placeholder, column_type),
            DriverStrategy::Mysql => mysql::value_expression(placeholder, column_type),
            DriverStrategy::Mssql => placeholder.to_string(),
        }
    }

    /// `column = <value>` that leaves NULL cells NULL.
    pub fn null_safe_assignment(
        self,
        column: &str,
        placeholder: &str,
        column_type: &ColumnInfo,
    ) -> String {
        let column = self.quote_ident(column);
        format!(
            "{column} = CASE WHEN {column} IS NULL THEN NULL ELSE {} END",
            self.value_expression(placeholder, column_type)
        )
    }

    /// Render `value` as an SQL literal. Only used for reports; statements
    /// sent to the server stay parameterised.
    pub fn literal(self, value: &SqlValue) -> String {
        match self {
            DriverStrategy::Postgres => postgres::literal(value),
            DriverStrategy::Mysql => mysql::literal(value),
            DriverStrategy::Mssql => mssql::literal(value),
        }
    }

    pub fn truncate_statement(self, table: &str) -> String {
        let table = self.quote_ident(table);
        match self {
            // TRUNCATE commits implicitly on MySQL.
            DriverStrategy::Mysql => format!("DELETE FROM {table}"),
            DriverStrategy::Postgres | DriverStrategy::Mssql => format!("TRUNCATE TABLE {table}"),
        }
    }

    /// Keyset page over `table` ordered by `key`. With `after`, the first
    /// placeholder holds the last key of the previous page.
    pub fn page_query(
        self,
        table: &str,
        columns: &[String],
        key: &str,
        after: bool,
        limit: u64,
    ) -> String {
        let cols = columns
            .iter()
            .map(|column| self.quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let table = self.quote_ident(table);
        let key = self.quote_ident(key);
        let filter = if after {
            format!(" WHERE {key} > {}", self.placeholder(1))
        } else {
            String::new()
        };
        match self {
            DriverStrategy::Mssql => {
                format!("SELECT TOP ({limit}) {cols} FROM {table}{filter} ORDER BY {key}")
            }
            DriverStrategy::Postgres | DriverStrategy::Mysql => {
                format!("SELECT {cols} FROM {table}{filter} ORDER BY {key} LIMIT {limit}")
            }
        }
    }

    pub fn staging_format(self) -> StagingFormat {
        match self {
            DriverStrategy::Postgres => StagingFormat {
                null_marker: "\\N",
                escape_backslashes: false,
                all_columns: false,
                hex_binary: false,
                shared_read: false,
            },
            DriverStrategy::Mysql => StagingFormat {
                null_marker: "\\N",
                escape_backslashes: true,
                all_columns: false,
                hex_binary: true,
                shared_read: false,
            },
            DriverStrategy::Mssql => StagingFormat {
                null_marker: "",
                escape_backslashes: false,
                all_columns: true,
                hex_binary: false,
                shared_read: true,
            },
        }
    }

    /// For each staged column, whether its cells must be written as hex.
    pub fn hex_columns(self, columns: &[ColumnInfo]) -> Vec<bool> {
        columns
            .iter()
            .map(|column| self.staging_format().hex_binary && mysql::is_binary(column))
            .collect()
    }

    /// Statements loading the staged file at `path` into `columns` of
    /// `table`.
    pub fn bulk_load(
        self,
        table: &str,
        path: &Path,
        columns: &[ColumnInfo],
        mode: LoadMode,
    ) -> Result<BulkLoad> {
        let path = path.to_str().ok_or_else(|| {
            Error::bulk_load(table, format!("staging path {} is not valid UTF-8", path.display()))
        })?;
        let quoted_table = self.quote_ident(table);
        let cols = columns
            .iter()
            .map(|column| self.quote_ident(&column.name))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = match self {
            DriverStrategy::Postgres => postgres::copy_statement(&quoted_table, &cols),
            DriverStrategy::Mysql => mysql::load_data_statement(&quoted_table, path, columns),
            DriverStrategy::Mssql => mssql::bulk_insert_statement(&quoted_table, path, mode),
        };
        let (prelude, epilogue) = match (self, mode) {
            (_, LoadMode::Insert) => (Vec::new(), Vec::new()),
            // DELETE would cascade into, or be refused by, referencing rows.
            (DriverStrategy::Mysql, LoadMode::Replace) => (
                vec![
                    mysql::DISABLE_FOREIGN_KEYS.to_string(),
                    self.truncate_statement(table),
                ],
                vec![mysql::RESTORE_FOREIGN_KEYS.to_string()],
            ),
            (_, LoadMode::Replace) => (vec![self.truncate_statement(table)], Vec::new()),
        };
        Ok(BulkLoad {
            prelude,
            statement,
            epilogue,
        })
    }

    /// Fail unless the server can read files staged on this machine.
    ///
    /// Only SQL Server reads the file itself; the other engines stream it
    /// from the client.
    pub async fn ensure_local_staging(self, entity: &str, host: &str) -> Result<()> {
        match self {
            DriverStrategy::Mssql => mssql::ensure_loopback(host)
                .await
                .map_err(|message| Error::bulk_load(entity, message)),
            DriverStrategy::Postgres | DriverStrategy::Mysql => Ok(()),
        }
    }
}

const RESERVED: &[&str] = &[
    "all", "and", "as", "asc", "by", "case", "check", "column", "constraint", "create",
    "default", "delete", "desc", "distinct", "drop", "else", "end", "foreign", "from", "grant",
    "group", "having", "in", "index", "insert", "into", "is", "join", "key", "left", "like",
    "limit", "not", "null", "offset", "on", "or", "order", "primary", "references", "right",
    "select", "set", "table", "then", "to", "union", "unique", "update", "user", "using",
    "values", "when", "where", "with",
];

/// ASCII letters, digits and underscores, not starting with a digit, and
/// not a keyword.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.contains(&name.to_ascii_lowercase().as_str())
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use masquerade_core::ColumnFamily;

    fn column(name: &str, sql_type: &str, family: ColumnFamily, unsigned: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            family,
            max_length: None,
            unsigned,
            nullable: true,
        }
    }

    #[test]
    fn quotes_only_when_needed() {
        let pg = DriverStrategy::Postgres;
        assert_eq!(pg.quote_ident("guestbook"), "guestbook");
        assert_eq!(pg.quote_ident("user"), "\"user\"");
        assert_eq!(pg.quote_ident("UserName"), "\"UserName\"");
        assert_eq!(pg.quote_ident("app.guestbook"), "app.guestbook");
        assert_eq!(DriverStrategy::Mysql.quote_ident("order"), "`order`");
        assert_eq!(DriverStrategy::Mysql.quote_ident("UserName"), "UserName");
        assert_eq!(DriverStrategy::Mssql.quote_ident("first name"), "[first name]");
        assert_eq!(DriverStrategy::Mssql.quote_ident("dbo.key"), "dbo.[key]");
    }

    #[test]
    fn placeholders_follow_engine_syntax() {
        assert_eq!(DriverStrategy::Postgres.placeholder(3), "$3");
        assert_eq!(DriverStrategy::Mysql.placeholder(3), "?");
        assert_eq!(DriverStrategy::Mssql.placeholder(3), "@P3");
    }

    #[test]
    fn null_safe_assignment_keeps_nulls() {
        let content = column("content", "text", ColumnFamily::Text, false);
        assert_eq!(
            DriverStrategy::Postgres.null_safe_assignment("content", "$1", &content),
            "content = CASE WHEN content IS NULL THEN NULL ELSE CAST($1 AS text) END"
        );
        let votes = column("votes", "int(10) unsigned", ColumnFamily::Integer, true);
        assert_eq!(
            DriverStrategy::Mysql.null_safe_assignment("votes", "?", &votes),
            "votes = CASE WHEN votes IS NULL THEN NULL ELSE CAST(? AS UNSIGNED) END"
        );
        assert_eq!(
            DriverStrategy::Mssql.null_safe_assignment("content", "@P1", &content),
            "content = CASE WHEN content IS NULL THEN NULL ELSE @P1 END"
        );
    }

    #[test]
    fn renders_literals_per_engine() {
        let text = SqlValue::Text("O'Brien \\ co".to_string());
        assert_eq!(DriverStrategy::Postgres.literal(&text), "'O''Brien \\ co'");
        assert_eq!(DriverStrategy::Mysql.literal(&text), "'O''Brien \\\\ co'");
        assert_eq!(DriverStrategy::Mssql.literal(&text), "N'O''Brien \\ co'");
        assert_eq!(DriverStrategy::Postgres.literal(&SqlValue::Bool(true)), "TRUE");
        assert_eq!(DriverStrategy::Mssql.literal(&SqlValue::Bool(true)), "1");
        assert_eq!(DriverStrategy::Mysql.literal(&SqlValue::Null), "NULL");
        assert_eq!(DriverStrategy::Mysql.literal(&SqlValue::Int(-4)), "-4");
        let bytes = SqlValue::Bytes(vec![0xca, 0xfe]);
        assert_eq!(DriverStrategy::Mysql.literal(&bytes), "X'cafe'");
        assert_eq!(DriverStrategy::Postgres.literal(&bytes), "'\\xcafe'");
        assert_eq!(DriverStrategy::Mssql.literal(&bytes), "0xCAFE");
    }

    #[test]
    fn pages_by_key() {
        let cols = vec!["id".to_string(), "username".to_string()];
        assert_eq!(
            DriverStrategy::Postgres.page_query("guestbook", &cols, "id", true, 500),
            "SELECT id, username FROM guestbook WHERE id > $1 ORDER BY id LIMIT 500"
        );
        assert_eq!(
            DriverStrategy::Mssql.page_query("guestbook", &cols, "id", false, 10),
            "SELECT TOP (10) id, username FROM guestbook ORDER BY id"
        );
    }

    #[test]
    fn truncation_stays_transactional() {
        assert_eq!(DriverStrategy::Mysql.truncate_statement("users"), "DELETE FROM users");
        assert_eq!(
            DriverStrategy::Postgres.truncate_statement("users"),
            "TRUNCATE TABLE users"
        );
    }

    #[test]
    fn replace_loads_truncate_first() {
        let cols = vec![
            column("id", "integer", ColumnFamily::Integer, false),
            column("email", "varchar(64)", ColumnFamily::Text, false),
        ];
        let load = DriverStrategy::Postgres
            .bulk_load("users", Path::new("/tmp/users.csv"), &cols, LoadMode::Replace)
            .unwrap();
        assert_eq!(load.prelude, vec!["TRUNCATE TABLE users".to_string()]);
        assert_eq!(
            load.statement,
            "COPY users (id, email) FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '\"', NULL '\\N')"
        );
        assert_eq!(load.statements().count(), 2);
        assert!(load.epilogue.is_empty());

        let load = DriverStrategy::Mysql
            .bulk_load("users", Path::new("/tmp/it's.csv"), &cols, LoadMode::Insert)
            .unwrap();
        assert!(load.prelude.is_empty());
        assert!(load.epilogue.is_empty());
        assert!(load.statement.starts_with("LOAD DATA LOCAL INFILE '/tmp/it''s.csv' INTO TABLE users"));
        assert!(load.statement.ends_with("(id, email)"));

        let load = DriverStrategy::Mssql
            .bulk_load("users", Path::new("/tmp/users.csv"), &cols, LoadMode::Replace)
            .unwrap();
        assert!(load.statement.starts_with("BULK INSERT users FROM '/tmp/users.csv'"));
        assert!(load.statement.contains("KEEPIDENTITY"));
    }

    #[test]
    fn mysql_replace_suspends_foreign_key_checks() {
        let cols = vec![column("id", "int(11)", ColumnFamily::Integer, false)];
        let load = DriverStrategy::Mysql
            .bulk_load("orders", Path::new("/tmp/orders.csv"), &cols, LoadMode::Replace)
            .unwrap();
        assert_eq!(
            load.prelude,
            vec![
                "SET @masquerade_fk_checks = @@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS = 0"
                    .to_string(),
                "DELETE FROM orders".to_string(),
            ]
        );
        assert_eq!(
            load.epilogue,
            vec!["SET FOREIGN_KEY_CHECKS = @masquerade_fk_checks".to_string()]
        );
        let statements: Vec<&str> = load.statements().collect();
        assert_eq!(statements.len(), 4);
        assert!(statements[2].starts_with("LOAD DATA LOCAL INFILE"));
        assert!(statements[3].starts_with("SET FOREIGN_KEY_CHECKS"));
    }

    #[test]
    fn mysql_decodes_binary_columns_from_hex() {
        let cols = vec![
            column("id", "int(11)", ColumnFamily::Integer, false),
            column("avatar", "blob", ColumnFamily::Binary, false),
            column("flags", "bit(8)", ColumnFamily::Boolean, false),
        ];
        let load = DriverStrategy::Mysql
            .bulk_load("users", Path::new("/tmp/users.csv"), &cols, LoadMode::Insert)
            .unwrap();
        assert!(
            load.statement
                .ends_with("(id, @hex2, @hex3) SET avatar = UNHEX(@hex2), flags = UNHEX(@hex3)"),
            "{}",
            load.statement
        );
        assert_eq!(DriverStrategy::Mysql.hex_columns(&cols), vec![false, true, true]);
        assert_eq!(DriverStrategy::Postgres.hex_columns(&cols), vec![false, false, false]);
    }

    #[test]
    fn parses_driver_names() {
        assert_eq!(
            DriverStrategy::from_driver_name("pdo_pgsql").unwrap(),
            DriverStrategy::Postgres
        );
        assert!(DriverStrategy::from_driver_name("oracle").is_err());
    }

    #[tokio::test]
    async fn only_sql_server_needs_a_local_server() {
        DriverStrategy::Postgres
            .ensure_local_staging("users", "db.internal.example")
            .await
            .unwrap();
        DriverStrategy::Mssql
            .ensure_local_staging("users", "127.0.0.1")
            .await
            .unwrap();
        let err = DriverStrategy::Mssql
            .ensure_local_staging("users", "10.20.30.40")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BulkLoad { .. }));
    }
}
