//! MySQL/MariaDB connection via `mysql_async`.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, DriverError, Opts, OptsBuilder, Value};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::{Connection, Row};
use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

pub struct MysqlConnection {
    conn: Option<Conn>,
}

impl MysqlConnection {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let port = config.port_for(Backend::Mysql);

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(config.password()))
            // Statements are never cached, so every execution prepares afresh.
            .stmt_cache_size(0)
            .init(vec!["SET NAMES utf8mb4", "SET autocommit = 0"]);

        let opts: Opts = builder.into();
        let conn = Conn::new(opts).await.map_err(|e| {
            LoadError::Connection(format!(
                "Failed to connect to MySQL at {}:{}/{}: {}",
                config.host, port, config.database, e
            ))
        })?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut Conn> {
        self.conn
            .as_mut()
            .ok_or_else(|| LoadError::Connection("MySQL connection is closed".into()))
    }
}

#[async_trait]
impl Connection for MysqlConnection {
    fn backend(&self) -> Backend {
        Backend::Mysql
    }

    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "Executing");
        self.conn()?.query_drop(sql).await.map_err(map_err)
    }

    async fn execute_batch(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64> {
        let params: Vec<Vec<Value>> = rows.iter().map(|row| values(row)).collect();
        self.conn()?
            .exec_batch(stmt.sql(), params)
            .await
            .map_err(map_err)?;
        Ok(rows.len() as u64)
    }

    async fn execute_row(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<()> {
        self.conn()?
            .exec_drop(stmt.sql(), values(row))
            .await
            .map_err(map_err)
    }

    async fn commit(&mut self) -> Result<()> {
        self.conn()?.query_drop("COMMIT").await.map_err(map_err)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.conn()?.query_drop("ROLLBACK").await.map_err(map_err)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect().await.map_err(map_err)?;
            debug!("MySQL connection closed");
        }
        Ok(())
    }
}

fn values(row: &[String]) -> Vec<Value> {
    row.iter().map(|f| Value::from(f.as_str())).collect()
}

fn map_err(e: mysql_async::Error) -> LoadError {
    match e {
        mysql_async::Error::Io(_) | mysql_async::Error::Driver(DriverError::ConnectionClosed) => {
            LoadError::Connection(format!("MySQL connection lost: {}", e))
        }
        mysql_async::Error::Server(ref server) => LoadError::database(
            Backend::Mysql.name(),
            format!("{} ({}): {}", server.code, server.state, server.message),
        ),
        other => LoadError::database(Backend::Mysql.name(), other.to_string()),
    }
}
