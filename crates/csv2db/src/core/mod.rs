//! Core types shared by the ingestion engine and the drivers.
//!
//! - [`identifier`]: identifier validation, case folding and quoting
//! - [`columns`]: header row to ordered column list
//! - [`traits`]: the [`Connection`] every backend driver implements

pub mod columns;
pub mod identifier;
pub mod traits;

pub use columns::ColumnMap;
pub use identifier::IdentifierPolicy;
pub use traits::{check_width, Connection, Row};
