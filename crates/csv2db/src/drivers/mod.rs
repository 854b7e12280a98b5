//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL via `tokio-postgres`
//! - [`mssql`]: SQL Server via `tiberius`
//! - [`mysql`]: MySQL/MariaDB via `mysql_async` (feature `mysql`)
//! - [`odbc`]: Oracle and Db2 via `odbc-api` (feature `odbc`)
//!
//! Every connection is handed out with autocommit disabled. A backend whose
//! driver was not compiled in fails to connect with [`LoadError::Connection`].

pub mod mssql;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "odbc")]
pub mod odbc;
pub mod postgres;

use crate::config::ConnectionConfig;
use crate::core::Connection;
use crate::dialect::Backend;
use crate::error::{LoadError, Result};

/// Open a connection to `backend`.
pub async fn connect(backend: Backend, config: &ConnectionConfig) -> Result<Box<dyn Connection>> {
    match backend {
        Backend::Postgres => Ok(Box::new(
            postgres::PostgresConnection::connect(config).await?,
        )),
        Backend::Sqlserver => Ok(Box::new(mssql::MssqlConnection::connect(config).await?)),
        #[cfg(feature = "mysql")]
        Backend::Mysql => Ok(Box::new(mysql::MysqlConnection::connect(config).await?)),
        #[cfg(feature = "odbc")]
        Backend::Oracle | Backend::Db2 => Ok(Box::new(
            odbc::OdbcConnection::connect(backend, config).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(driver_unavailable(other)),
    }
}

#[allow(dead_code)]
fn driver_unavailable(backend: Backend) -> LoadError {
    let feature = match backend {
        Backend::Mysql => "mysql",
        _ => "odbc",
    };
    LoadError::Connection(format!(
        "The {} driver is not available in this build (enable the '{}' feature)",
        backend, feature
    ))
}
