//! PostgreSQL connection via `tokio-postgres`.
//!
//! The server runs in autocommit mode, so a transaction is opened with an
//! explicit `BEGIN` before the first statement after each commit or rollback.
//! Values are sent as text parameters and coerced by the server to the
//! column type, the same way a literal in an INSERT would be.

use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::future::try_join_all;
use tokio_postgres::types::{to_sql_checked, Format, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::{Connection, Row};
use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

pub struct PostgresConnection {
    client: Option<Client>,
    in_transaction: bool,
}

impl PostgresConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let port = config.port_for(Backend::Postgres);

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(config.password());
        pg_config.application_name("csv2db");

        let (client, connection) = pg_config.connect(NoTls).await.map_err(|e| {
            LoadError::Connection(format!(
                "Failed to connect to PostgreSQL at {}:{}/{}: {}",
                config.host, port, config.database, e
            ))
        })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self {
            client: Some(client),
            in_transaction: false,
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| LoadError::Connection("PostgreSQL connection is closed".into()))
    }

    async fn begin(&mut self) -> Result<&Client> {
        if !self.in_transaction {
            self.client()?.batch_execute("BEGIN").await.map_err(map_err)?;
            self.in_transaction = true;
        }
        self.client()
    }

    async fn end(&mut self, sql: &str) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client()?.batch_execute(sql).await.map_err(map_err)
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "Executing");
        self.begin().await?.batch_execute(sql).await.map_err(map_err)
    }

    async fn execute_batch(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        let client = self.begin().await?;
        let prepared = client.prepare(stmt.sql()).await.map_err(map_err)?;

        // Pipelined: all executes are in flight on the one connection at once.
        let params: Vec<Vec<TextParam<'_>>> = rows.iter().map(|row| text_params(row)).collect();
        let counts = try_join_all(params.iter().map(|row| {
            let refs: Vec<&(dyn ToSql + Sync)> =
                row.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            let prepared = &prepared;
            async move { client.execute(prepared, &refs).await }
        }))
        .await
        .map_err(map_err)?;

        Ok(counts.iter().sum())
    }

    async fn execute_row(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<()> {
        let client = self.begin().await?;
        let params = text_params(row);
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        // A query string is prepared as a new unnamed statement on every call.
        client.execute(stmt.sql(), &refs).await.map_err(map_err)?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.end("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.end("ROLLBACK").await
    }

    async fn close(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            debug!("PostgreSQL connection closed");
        }
        self.in_transaction = false;
        Ok(())
    }
}

/// A field sent in text format, leaving type coercion to the server.
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn text_params(row: &[String]) -> Vec<TextParam<'_>> {
    row.iter().map(|f| TextParam(f)).collect()
}

fn map_err(e: tokio_postgres::Error) -> LoadError {
    if e.is_closed() {
        return LoadError::Connection(format!("PostgreSQL connection lost: {}", e));
    }
    match e.as_db_error() {
        Some(db) => LoadError::database(
            Backend::Postgres.name(),
            format!("{}: {}", db.code().code(), db.message()),
        ),
        None => LoadError::database(Backend::Postgres.name(), e.to_string()),
    }
}
