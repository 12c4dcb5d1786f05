//! Anonymization engine.
//!
//! [`Anonymizer`] walks the configured entities and, per entity, deletes,
//! rewrites or synthesizes rows through a [`DriverStrategy`] for the
//! connected engine, either one statement per row or through a staged bulk
//! load.

pub mod config_generator;
pub mod driver;
pub mod engine;
pub mod expression;
pub mod report;
pub mod sql;
pub mod staging;

pub use config_generator::ConfigGenerator;
pub use driver::{BulkLoad, DriverStrategy, LoadMode, StagingFormat};
pub use engine::{Actions, Anonymizer, Mode, ProgressFn, RunOptions};
pub use expression::{DatabaseService, ExpressionEvaluator, ExpressionService, ServiceRegistry};
pub use report::ExecutionReport;
pub use sql::Statement;
pub use staging::StagingFile;
