use std::fmt::Display;

use thiserror::Error;

/// Error taxonomy shared across Masquerade crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity or column missing from the configuration, or the configuration
    /// contradicts itself.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Missing or ambiguous primary key, unreadable column metadata.
    #[error("schema error on table '{table}': {message}")]
    Schema { table: String, message: String },
    /// A unique generator scope could not produce a fresh value.
    #[error(
        "generator '{generator}' could not produce a unique value for '{scope}' after {attempts} attempts"
    )]
    GeneratorExhausted {
        scope: String,
        generator: String,
        attempts: u32,
    },
    /// Row-level generation or statement failure, with entity and row context.
    #[error("anonymization of '{entity}' failed at {context}: {source}")]
    Anonymization {
        entity: String,
        context: String,
        #[source]
        source: Box<Error>,
    },
    /// Staging or ingestion failure. The load statement either never ran or
    /// was rolled back.
    #[error("bulk load of '{entity}' aborted, table left unmodified: {message}")]
    BulkLoad { entity: String, message: String },
    #[error("expression `{expression}` failed: {message}")]
    Expression { expression: String, message: String },
    #[error("database error: {0}")]
    Database(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn database(err: impl Display) -> Self {
        Error::Database(err.to_string())
    }

    pub fn bulk_load(entity: impl Into<String>, message: impl Display) -> Self {
        Error::BulkLoad {
            entity: entity.into(),
            message: message.to_string(),
        }
    }

    pub fn expression(expression: impl Into<String>, message: impl Display) -> Self {
        Error::Expression {
            expression: expression.into(),
            message: message.to_string(),
        }
    }

    /// Wrap `self` with the entity and row/column/SQL location it occurred at.
    ///
    /// Configuration, schema, exhaustion and bulk-load errors already name
    /// their subject and are returned unchanged.
    pub fn in_entity(self, entity: &str, context: impl Into<String>) -> Self {
        match self {
            Error::Configuration(_)
            | Error::Schema { .. }
            | Error::GeneratorExhausted { .. }
            | Error::BulkLoad { .. }
            | Error::Anonymization { .. } => self,
            other => Error::Anonymization {
                entity: entity.to_string(),
                context: context.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Convenience alias for results returned by Masquerade crates.
pub type Result<T> = std::result::Result<T, Error>;
