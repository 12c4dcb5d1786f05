use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use masquerade_core::{ConnectionSettings, Engine, Error, Result, SqlValue};

use crate::database::{Database, Row};

pub(crate) mod mapper;
pub(crate) mod queries;

/// MySQL / MariaDB connection.
pub struct MysqlDatabase {
    conn: Mutex<Conn>,
    host: String,
}

impl MysqlDatabase {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let opts = OptsBuilder::default()
            .ip_or_hostname(settings.host.clone())
            .tcp_port(settings.port)
            .db_name(Some(settings.database.clone()))
            .user(settings.user.clone())
            .pass(settings.password.clone())
            .init(vec!["SET NAMES utf8mb4"]);
        let conn = Conn::new(opts).await.map_err(Error::database)?;
        Ok(Self {
            conn: Mutex::new(conn),
            host: settings.host.clone(),
        })
    }
}

#[async_trait]
impl Database for MysqlDatabase {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        if params.is_empty() {
            conn.query_drop(sql).await.map_err(Error::database)?;
        } else {
            conn.exec_drop(sql, mapper::to_params(params))
                .await
                .map_err(Error::database)?;
        }
        Ok(conn.affected_rows())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut conn = self.conn.lock().await;
        let params = if params.is_empty() {
            Params::Empty
        } else {
            mapper::to_params(params)
        };
        let rows: Vec<mysql_async::Row> = conn.exec(sql, params).await.map_err(Error::database)?;
        Ok(rows.into_iter().map(mapper::decode_row).collect())
    }

    async fn load_file(
        &self,
        prelude: &[String],
        statement: &str,
        epilogue: &[String],
        path: &Path,
    ) -> Result<u64> {
        let file = tokio::fs::File::open(path).await?;
        let mut conn = self.conn.lock().await;
        conn.set_infile_handler(async move { Ok(ReaderStream::new(file).boxed()) });

        conn.query_drop("START TRANSACTION")
            .await
            .map_err(Error::database)?;
        let loaded = match run_load(&mut conn, prelude, statement).await {
            Ok(rows) => conn.query_drop("COMMIT").await.map(|()| rows),
            Err(err) => {
                if let Err(rollback) = conn.query_drop("ROLLBACK").await {
                    warn!(event = "rollback_failed", error = %rollback);
                }
                Err(err)
            }
        };
        // Session settings are restored whatever happened to the load.
        let restored = run_all(&mut conn, epilogue).await;
        let rows = loaded.map_err(Error::database)?;
        restored.map_err(Error::database)?;
        debug!(event = "load_data_finished", rows);
        Ok(rows)
    }
}

async fn run_load(conn: &mut Conn, prelude: &[String], statement: &str) -> mysql_async::Result<u64> {
    run_all(conn, prelude).await?;
    conn.query_drop(statement).await?;
    Ok(conn.affected_rows())
}

async fn run_all(conn: &mut Conn, statements: &[String]) -> mysql_async::Result<()> {
    for sql in statements {
        conn.query_drop(sql.as_str()).await?;
    }
    Ok(())
}
