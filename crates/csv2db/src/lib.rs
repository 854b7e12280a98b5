//! # csv2db
//!
//! Bulk loader for delimited text files into relational databases.
//!
//! Files (plain, `.gz` or `.zip`) are read row by row, the header row names
//! the target columns and the remaining rows are inserted in batches over a
//! single connection with autocommit disabled. Supported backends:
//!
//! - **PostgreSQL** via `tokio-postgres`
//! - **SQL Server** via `tiberius`
//! - **MySQL/MariaDB** via `mysql_async` (feature `mysql`)
//! - **Oracle** and **Db2** via `odbc-api` (feature `odbc`)
//!
//! Rejected batches can be replayed row by row so that offending records are
//! skipped and written to a `<file>.bad` quarantine file.
//!
//! ## Example
//!
//! ```rust,no_run
//! use csv2db::{source, Config, Loader};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> csv2db::Result<()> {
//! let config = Config::load("csv2db.yaml")?.resolve()?;
//! let files = source::find_files(&config.source.pattern)?;
//! let cancel = CancellationToken::new();
//! let loader = Loader::connect(&config, &cancel).await?;
//! let summary = loader.run(&files, cancel).await?;
//! println!("Loaded {} rows", summary.rows_loaded);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod generate;
pub mod ingest;
pub mod orchestrator;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, IdentifierOptions, LoadOptions, SourceOptions};
pub use dialect::Backend;
pub use error::{
    LoadError, Result, EXIT_DATABASE_ERROR, EXIT_DATA_LOADING_ERROR, EXIT_GENERIC_ERROR,
    EXIT_SUCCESS,
};
pub use ingest::LoadResult;
pub use orchestrator::{FileSummary, Loader, RunSummary};
