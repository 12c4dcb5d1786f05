//! Core contracts shared by the Masquerade crates.
//!
//! This crate defines the anonymization configuration model, the table schema
//! snapshot reported by introspection, the SQL value type that flows between
//! generators and drivers, and the error taxonomy used across the workspace.

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod schema;
pub mod value;

pub use config::{ColumnSpec, Config, EntityAction, EntityConfig, GeneratorParam, OrderedMap};
pub use connection::{ConnectionSettings, RedactedConnection, redact_connection_string};
pub use engine::Engine;
pub use error::{Error, Result};
pub use schema::{ColumnFamily, ColumnInfo, TableSchema};
pub use value::SqlValue;
