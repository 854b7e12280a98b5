//! The database connection abstraction the loader drives.
//!
//! Implementations live in `drivers/`. Every connection reaches the loader
//! with autocommit disabled: nothing becomes visible until [`Connection::commit`].

use async_trait::async_trait;

use crate::dialect::Backend;
use crate::error::{LoadError, Result};
use crate::ingest::InsertStatement;

/// One source record: the fields as read, in file order.
pub type Row = Vec<String>;

/// A single database session used sequentially for the whole run.
#[async_trait]
pub trait Connection: Send {
    /// Backend this connection talks to.
    fn backend(&self) -> Backend;

    /// Execute a statement without parameters (TRUNCATE and session setup).
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Execute the insert once per row as a single set-oriented call.
    ///
    /// Returns the number of rows inserted.
    async fn execute_batch(&mut self, stmt: &InsertStatement, rows: &[Row]) -> Result<u64>;

    /// Execute the insert for one row on a freshly prepared statement.
    ///
    /// No bind state from an earlier call may be reused; a failed batch can
    /// leave a cached statement with stale parameter buffers.
    async fn execute_row(&mut self, stmt: &InsertStatement, row: &[String]) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Release the session. Idempotent; uncommitted work is rolled back by
    /// the server on disconnect.
    async fn close(&mut self) -> Result<()>;
}

/// Reject a row whose width differs from the statement's column count.
///
/// Drivers that silently ignore surplus parameters call this so over-wide
/// rows fail the same way everywhere.
pub fn check_width(backend: Backend, stmt: &InsertStatement, row: &[String]) -> Result<()> {
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
    Ok(())
}
