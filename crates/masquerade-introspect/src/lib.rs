//! Database access and schema introspection.
//!
//! [`Database`] is the connection capability the anonymization engine runs
//! statements through; [`SchemaIntrospector`] reports primary keys and
//! column metadata. Live implementations exist for PostgreSQL (sqlx),
//! MySQL/MariaDB (mysql_async) and SQL Server (tiberius).

pub mod connect;
pub mod database;
pub mod introspector;
pub mod mssql;
pub mod mysql;
pub mod postgres;

pub use connect::connect;
pub use database::{Database, Row};
pub use introspector::{CatalogIntrospector, SchemaIntrospector, split_table_name};
pub use mssql::MssqlDatabase;
pub use mysql::MysqlDatabase;
pub use postgres::PostgresDatabase;
