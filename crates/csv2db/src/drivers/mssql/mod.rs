//! SQL Server connection via `tiberius`.
//!
//! Each unit of work is opened with an explicit `BEGIN TRANSACTION` so the
//! parameterized inserts, which tiberius sends as RPC calls, run inside it.
//! A batch goes out as multi-row `INSERT ... VALUES (...), (...)` statements,
//! each as large as the server's parameter and row limits allow.

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, ToSql};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::{check_width, Connection, Row};
use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

type TdsClient = Client<Compat<TcpStream>>;

/// Parameters allowed in one request.
const MAX_PARAMS: usize = 2100;

/// Rows allowed in one table value constructor.
const MAX_VALUES_ROWS: usize = 1000;

pub struct MssqlConnection {
    client: Option<TdsClient>,
    in_transaction: bool,
}

impl MssqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let port = config.port_for(Backend::Sqlserver);

        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(port);
        tds.database(&config.database);
        tds.application_name("csv2db");
        tds.authentication(AuthMethod::sql_server(&config.user, config.password()));
        tds.trust_cert();

        let failed = |e: String| {
            LoadError::Connection(format!(
                "Failed to connect to SQL Server at {}:{}/{}: {}",
                config.host, port, config.database, e
            ))
        };

        let tcp = TcpStream::connect(tds.get_addr())
            .await
            .map_err(|e| failed(e.to_string()))?;
        tcp.set_nodelay(true).ok();

        let client = Client::connect(tds, tcp.compat_write())
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!(
            "Connected to SQL Server: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self {
            client: Some(client),
            in_transaction: false,
        })
    }

    fn client(&mut self) -> Result<&mut TdsClient> {
        self.client
            .as_mut()
            .ok_or_else(|| LoadError::Connection("SQL Server connection is closed".into()))
    }

    async fn simple(&mut self, sql: &str) -> Result<()> {
        self.client()?
            .simple_query(sql)
            .await
            .map_err(map_err)?
            .into_results()
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.simple("BEGIN TRANSACTION").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn insert(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<u64> {
        check_width(Backend::Sqlserver, stmt, row)?;
        let params: Vec<&dyn ToSql> = row.iter().map(|f| f as &dyn ToSql).collect();
        let result = self
            .client()?
            .execute(stmt.sql(), &params)
            .await
            .map_err(map_err)?;
        Ok(result.total())
    }

    async fn insert_many(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        let mut inserted = 0;
        for chunk in rows.chunks(rows_per_statement(stmt.column_count())) {
            if let [row] = chunk {
                inserted += self.insert(stmt, row).await?;
                continue;
            }
            for row in chunk {
                check_width(Backend::Sqlserver, stmt, row)?;
            }
            let sql = multi_row_sql(stmt, chunk.len());
            let params: Vec<&dyn ToSql> = chunk
                .iter()
                .flat_map(|row| row.iter().map(|f| f as &dyn ToSql))
                .collect();
            let result = self
                .client()?
                .execute(sql.as_str(), &params)
                .await
                .map_err(map_err)?;
            inserted += result.total();
        }
        debug!(rows = rows.len(), inserted, "Inserted batch");
        Ok(inserted)
    }
}

fn rows_per_statement(columns: usize) -> usize {
    (MAX_PARAMS / columns.max(1)).clamp(1, MAX_VALUES_ROWS)
}

/// `INSERT ... VALUES (@P1, @P2), (@P3, @P4), ...` for `rows` rows.
fn multi_row_sql(stmt: &InsertStatement, rows: usize) -> String {
    let columns = stmt.column_count();
    let groups: Vec<String> = (0..rows)
        .map(|r| {
            let binds: Vec<String> = (1..=columns)
                .map(|c| format!("@P{}", r * columns + c))
                .collect();
            format!("({})", binds.join(", "))
        })
        .collect();
    format!("{} VALUES {}", stmt.head(), groups.join(", "))
}

#[async_trait]
impl Connection for MssqlConnection {
    fn backend(&self) -> Backend {
        Backend::Sqlserver
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "Executing");
        self.begin().await?;
        self.simple(sql).await
    }

    async fn execute_batch(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        self.begin().await?;
        self.insert_many(stmt, rows).await
    }

    async fn execute_row(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<()> {
        self.begin().await?;
        self.insert(stmt, row).await.map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.simple("IF @@TRANCOUNT > 0 COMMIT TRANSACTION").await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.in_transaction = false;
            self.simple("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            client.close().await.map_err(map_err)?;
            debug!("SQL Server connection closed");
        }
        self.in_transaction = false;
        Ok(())
    }
}

fn map_err(e: tiberius::error::Error) -> LoadError {
    match e {
        tiberius::error::Error::Io { .. } => {
            LoadError::Connection(format!("SQL Server connection lost: {}", e))
        }
        tiberius::error::Error::Server(ref token) => LoadError::database(
            Backend::Sqlserver.name(),
            format!("{}: {}", token.code(), token.message()),
        ),
        other => LoadError::database(Backend::Sqlserver.name(), other.to_string()),
    }
}
