use std::path::Path;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, Query};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use masquerade_core::{ConnectionSettings, Engine, Error, Result, SqlValue};

use crate::database::{Database, Row};

pub(crate) mod mapper;
pub(crate) mod queries;

type MssqlClient = Client<Compat<TcpStream>>;

/// SQL Server connection.
///
/// `load_file` issues `BULK INSERT`, which the server resolves against its
/// own filesystem; callers must confirm the server is local first.
pub struct MssqlDatabase {
    client: Mutex<MssqlClient>,
    host: String,
}

impl MssqlDatabase {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self> {
        let user = settings
            .user
            .as_deref()
            .ok_or_else(|| Error::config("sql server connections require a user"))?;

        let mut config = Config::new();
        config.host(&settings.host);
        config.port(settings.port);
        config.database(&settings.database);
        config.authentication(AuthMethod::sql_server(
            user,
            settings.password.as_deref().unwrap_or_default(),
        ));
        config.trust_cert();

        let tcp = TcpStream::connect(config.get_addr()).await?;
        tcp.set_nodelay(true)?;
        let client = Client::connect(config, tcp.compat_write())
            .await
            .map_err(Error::database)?;
        Ok(Self {
            client: Mutex::new(client),
            host: settings.host.clone(),
        })
    }
}

#[async_trait]
impl Database for MssqlDatabase {
    fn engine(&self) -> Engine {
        Engine::Mssql
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut client = self.client.lock().await;
        let query = mapper::bind_query(sql, params);
        let result = query.execute(&mut *client).await.map_err(Error::database)?;
        Ok(result.total())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut client = self.client.lock().await;
        let query = mapper::bind_query(sql, params);
        let stream = query.query(&mut *client).await.map_err(Error::database)?;
        let rows = stream.into_first_result().await.map_err(Error::database)?;
        rows.into_iter().map(mapper::decode_row).collect()
    }

    async fn load_file(
        &self,
        prelude: &[String],
        statement: &str,
        epilogue: &[String],
        path: &Path,
    ) -> Result<u64> {
        if !path.exists() {
            return Err(Error::database(format!(
                "staging file {} does not exist",
                path.display()
            )));
        }
        let mut client = self.client.lock().await;
        simple(&mut client, "BEGIN TRANSACTION").await?;
        let loaded = match run_load(&mut client, prelude, statement).await {
            Ok(rows) => simple(&mut client, "COMMIT TRANSACTION").await.map(|()| rows),
            Err(err) => {
                if let Err(rollback) = simple(&mut client, "ROLLBACK TRANSACTION").await {
                    warn!(event = "rollback_failed", error = %rollback);
                }
                Err(err)
            }
        };
        let restored = run_all(&mut client, epilogue).await;
        let rows = loaded?;
        restored?;
        debug!(event = "bulk_insert_finished", rows);
        Ok(rows)
    }
}

async fn simple(client: &mut MssqlClient, sql: &str) -> Result<()> {
    client
        .simple_query(sql)
        .await
        .map_err(Error::database)?
        .into_results()
        .await
        .map_err(Error::database)?;
    Ok(())
}

async fn run_load(client: &mut MssqlClient, prelude: &[String], statement: &str) -> Result<u64> {
    run_all(client, prelude).await?;
    let result = Query::new(statement)
        .execute(client)
        .await
        .map_err(Error::database)?;
    Ok(result.total())
}

async fn run_all(client: &mut MssqlClient, statements: &[String]) -> Result<()> {
    for sql in statements {
        Query::new(sql.as_str())
            .execute(client)
            .await
            .map_err(Error::database)?;
    }
    Ok(())
}
