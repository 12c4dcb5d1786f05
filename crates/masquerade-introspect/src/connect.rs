use std::sync::Arc;

use tracing::info;

use masquerade_core::{ConnectionSettings, Engine, Result};

use crate::database::Database;
use crate::mssql::MssqlDatabase;
use crate::mysql::MysqlDatabase;
use crate::postgres::PostgresDatabase;

/// Open a connection for the configured engine.
pub async fn connect(settings: &ConnectionSettings) -> Result<Arc<dyn Database>> {
    let redacted = settings.redacted();
    let db: Arc<dyn Database> = match settings.engine {
        Engine::Postgres => Arc::new(PostgresDatabase::connect(settings).await?),
        Engine::Mysql => Arc::new(MysqlDatabase::connect(settings).await?),
        Engine::Mssql => Arc::new(MssqlDatabase::connect(settings).await?),
    };
    info!(
        event = "connected",
        engine = %settings.engine,
        connection = %redacted.redacted
    );
    Ok(db)
}
