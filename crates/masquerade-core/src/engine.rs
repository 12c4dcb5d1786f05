use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Database engines with a driver strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Postgres,
    Mysql,
    Mssql,
}

/// Driver names accepted on the command line and in connection URLs.
const DRIVER_NAMES: &[(&str, Engine)] = &[
    ("postgres", Engine::Postgres),
    ("postgresql", Engine::Postgres),
    ("pgsql", Engine::Postgres),
    ("pdo_pgsql", Engine::Postgres),
    ("mysql", Engine::Mysql),
    ("mariadb", Engine::Mysql),
    ("pdo_mysql", Engine::Mysql),
    ("mssql", Engine::Mssql),
    ("sqlserver", Engine::Mssql),
    ("sqlsrv", Engine::Mssql),
    ("pdo_sqlsrv", Engine::Mssql),
];

impl Engine {
    /// Resolve a driver name (case-insensitive) to its engine.
    pub fn from_driver_name(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        DRIVER_NAMES
            .iter()
            .find(|(driver, _)| *driver == lower)
            .map(|(_, engine)| *engine)
            .ok_or_else(|| {
                let known = DRIVER_NAMES
                    .iter()
                    .map(|(driver, _)| *driver)
                    .collect::<Vec<_>>()
                    .join(", ");
                Error::config(format!("unsupported driver '{name}' (expected one of: {known})"))
            })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Postgres => "postgres",
            Engine::Mysql => "mysql",
            Engine::Mssql => "mssql",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Engine::Postgres => 5432,
            Engine::Mysql => 3306,
            Engine::Mssql => 1433,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_driver_aliases() {
        assert_eq!(Engine::from_driver_name("pdo_mysql").unwrap(), Engine::Mysql);
        assert_eq!(Engine::from_driver_name("PGSQL").unwrap(), Engine::Postgres);
        assert_eq!(Engine::from_driver_name("sqlsrv").unwrap(), Engine::Mssql);
    }

    #[test]
    fn rejects_unknown_driver() {
        let err = Engine::from_driver_name("oracle").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("oracle"));
    }
}
