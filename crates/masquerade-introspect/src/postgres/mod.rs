use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use tokio::io::AsyncReadExt;
use tracing::debug;

use masquerade_core::{ConnectionSettings, Engine, Error, Result, SqlValue};

use crate::database::{Database, Row};

pub(crate) mod mapper;
pub(crate) mod queries;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// PostgreSQL connection backed by a single-connection sqlx pool.
#[derive(Debug, Clone)]
pub struct PostgresDatabase {
    pool: PgPool,
    host: String,
}

impl PostgresDatabase {
    /// Wrap a pre-configured pool.
    pub fn new(pool: PgPool, host: impl Into<String>) -> Self {
        Self {
            pool,
            host: host.into(),
        }
    }

    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let mut options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database);
        if let Some(user) = &settings.user {
            options = options.username(user);
        }
        if let Some(password) = &settings.password {
            options = options.password(password);
        }

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(Error::database)?;
        Ok(Self::new(pool, settings.host.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Database for PostgresDatabase {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await
            .map_err(Error::database)?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::database)?;
        rows.iter().map(mapper::decode_row).collect()
    }

    async fn load_file(
        &self,
        prelude: &[String],
        statement: &str,
        epilogue: &[String],
        path: &Path,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await.map_err(Error::database)?;
        let loaded = copy_file(&mut conn, prelude, statement, path).await;
        let restored = run_all(&mut conn, epilogue).await;
        let rows = loaded?;
        restored?;
        debug!(event = "copy_finished", rows);
        Ok(rows)
    }
}

async fn copy_file(
    conn: &mut PgConnection,
    prelude: &[String],
    statement: &str,
    path: &Path,
) -> Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut tx = conn.begin().await.map_err(Error::database)?;
    run_all(&mut tx, prelude).await?;

    let mut copy = tx.copy_in_raw(statement).await.map_err(Error::database)?;
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let read = match file.read(&mut buffer).await {
            Ok(read) => read,
            Err(err) => {
                let message = err.to_string();
                let _ = copy.abort(message).await;
                return Err(Error::Io(err));
            }
        };
        if read == 0 {
            break;
        }
        copy.send(&buffer[..read]).await.map_err(Error::database)?;
    }
    let rows = copy.finish().await.map_err(Error::database)?;
    tx.commit().await.map_err(Error::database)?;
    Ok(rows)
}

async fn run_all(conn: &mut PgConnection, statements: &[String]) -> Result<()> {
    for sql in statements {
        sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(Error::database)?;
    }
    Ok(())
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param.clone() {
            SqlValue::Null => query.bind(None::<String>),
            SqlValue::Bool(value) => query.bind(value),
            SqlValue::Int(value) => query.bind(value),
            SqlValue::Float(value) => query.bind(value),
            SqlValue::Decimal(text) => match text.parse::<rust_decimal::Decimal>() {
                Ok(value) => query.bind(value),
                Err(_) => query.bind(text),
            },
            SqlValue::Text(value) => query.bind(value),
            SqlValue::Bytes(value) => query.bind(value),
            SqlValue::Uuid(value) => query.bind(value),
            SqlValue::Date(value) => query.bind(value),
            SqlValue::Time(value) => query.bind(value),
            SqlValue::Timestamp(value) => query.bind(value),
        };
    }
    query
}
