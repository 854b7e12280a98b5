//! Oracle and Db2 connections via `odbc-api`.
//!
//! Requires unixODBC (or the Windows driver manager) and the vendor's ODBC
//! driver. Calls into the driver manager are synchronous; the run is strictly
//! sequential so nothing else waits on the executor meanwhile.

use std::sync::OnceLock;

use async_trait::async_trait;
use odbc_api::{ConnectionOptions, Environment, IntoParameter};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::{Connection, Row};
use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

fn environment() -> Result<&'static Environment> {
    if let Some(env) = ENVIRONMENT.get() {
        return Ok(env);
    }
    let env = Environment::new().map_err(|e| {
        LoadError::Connection(format!(
            "Failed to create ODBC environment: {}. Is unixODBC installed?",
            e
        ))
    })?;
    Ok(ENVIRONMENT.get_or_init(|| env))
}

pub struct OdbcConnection {
    backend: Backend,
    conn: Option<odbc_api::Connection<'static>>,
}

impl OdbcConnection {
    pub async fn connect(backend: Backend, config: &ConnectionConfig) -> Result<Self> {
        let port = config.port_for(backend);
        let connection_string = connection_string(backend, config);

        if !config.password().is_empty() {
            debug!(
                "ODBC connection string (credentials hidden): {}",
                connection_string.replace(config.password(), "***")
            );
        }

        let conn = environment()?
            .connect_with_connection_string(&connection_string, ConnectionOptions::default())
            .map_err(|e| {
                LoadError::Connection(format!(
                    "Failed to connect to {} at {}:{}/{} via ODBC: {}",
                    backend, config.host, port, config.database, e
                ))
            })?;

        conn.set_autocommit(false).map_err(|e| map_err(backend, e))?;

        info!(
            "Connected to {} via ODBC: {}:{}/{}",
            backend, config.host, port, config.database
        );

        Ok(Self {
            backend,
            conn: Some(conn),
        })
    }

    fn conn(&self) -> Result<&odbc_api::Connection<'static>> {
        self.conn.as_ref().ok_or_else(|| {
            LoadError::Connection(format!("{} connection is closed", self.backend))
        })
    }
}

#[async_trait]
impl Connection for OdbcConnection {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "Executing");
        self.conn()?
            .execute(sql, ())
            .map_err(|e| map_err(self.backend, e))?;
        Ok(())
    }

    async fn execute_batch(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        let backend = self.backend;
        let conn = self.conn()?;

        let mut max_lens = vec![1usize; stmt.column_count()];
        for row in rows {
            for (max, field) in max_lens.iter_mut().zip(row) {
                *max = (*max).max(field.len());
            }
        }

        let prepared = conn.prepare(stmt.sql()).map_err(|e| map_err(backend, e))?;
        let mut inserter = prepared
            .into_text_inserter(rows.len(), max_lens)
            .map_err(|e| map_err(backend, e))?;
        for row in rows {
            if row.len() != stmt.column_count() {
                return Err(LoadError::database(
                    backend.name(),
                    format!(
                        "row has {} fields but the statement binds {} columns",
                        row.len(),
                        stmt.column_count()
                    ),
                ));
            }
            inserter
                .append(row.iter().map(|f| Some(f.as_bytes())))
                .map_err(|e| map_err(backend, e))?;
        }
        inserter.execute().map_err(|e| map_err(backend, e))?;
        Ok(rows.len() as u64)
    }

    async fn execute_row(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<()> {
        let params: Vec<_> = row.iter().map(|f| f.as_str().into_parameter()).collect();
        // Executed directly: no prepared statement survives between calls.
        self.conn()?
            .execute(stmt.sql(), params.as_slice())
            .map_err(|e| map_err(self.backend, e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn()?.commit().map_err(|e| map_err(self.backend, e))
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn()?.rollback().map_err(|e| map_err(self.backend, e))
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the handle disconnects; an open transaction is rolled back first.
        if self.conn.take().is_some() {
            debug!("{} connection closed", self.backend);
        }
        Ok(())
    }
}

fn connection_string(backend: Backend, config: &ConnectionConfig) -> String {
    let port = config.port_for(backend);
    match backend {
        Backend::Db2 => format!(
            "Driver={{{}}};Database={};Hostname={};Port={};Protocol=TCPIP;Uid={};Pwd={};",
            config.odbc_driver.as_deref().unwrap_or("IBM DB2 ODBC DRIVER"),
            config.database,
            config.host,
            port,
            config.user,
            config.password()
        ),
        _ => format!(
            "Driver={{{}}};Dbq={}:{}/{};Uid={};Pwd={};",
            config.odbc_driver.as_deref().unwrap_or("Oracle"),
            config.host,
            port,
            config.database,
            config.user,
            config.password()
        ),
    }
}

fn map_err(backend: Backend, e: odbc_api::Error) -> LoadError {
    // SQLSTATE class 08: connection exception.
    if let odbc_api::Error::Diagnostics { ref record, .. } = e {
        if record.state.as_str().starts_with("08") {
            return LoadError::Connection(format!("{} connection lost: {}", backend, e));
        }
    }
    LoadError::database(backend.name(), e.to_string())
}
