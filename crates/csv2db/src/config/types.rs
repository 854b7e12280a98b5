//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dialect::Backend;
use crate::error::{LoadError, Result};

/// Batch size used when none is requested.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Smallest batch size for which a direct-path load is worth it.
pub const DIRECT_PATH_MIN_BATCH_SIZE: usize = 10_000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Target table. Required for loading, optional for `generate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Database connection.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Load behavior.
    #[serde(default)]
    pub load: LoadOptions,

    /// Input files and how to tokenize them.
    #[serde(default)]
    pub source: SourceOptions,

    /// Identifier case folding and quoting.
    #[serde(default)]
    pub identifiers: IdentifierOptions,
}

/// Database connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host (default: localhost).
    #[serde(default = "default_host")]
    pub host: String,

    /// Port; the backend's default port when not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database (or service) name (default: ORCLPDB1).
    #[serde(default = "default_database")]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password. Prompted for by the CLI when absent.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// ODBC driver name for Oracle and Db2 connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odbc_driver: Option<String>,
}

impl ConnectionConfig {
    /// Port to connect to for the given backend.
    pub fn port_for(&self, backend: Backend) -> u16 {
        self.port.unwrap_or(backend.dialect().default_port)
    }

    /// Password, or empty when none was supplied.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or_default()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: default_database(),
            user: String::new(),
            password: None,
            odbc_driver: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("odbc_driver", &self.odbc_driver)
            .finish()
    }
}

/// Load behavior configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Rows per INSERT batch.
    pub batch_size: usize,

    /// Skip rows the database rejects instead of failing the file.
    pub ignore_errors: bool,

    /// Write rejected rows to `<file>.bad`. Implies `ignore_errors`.
    pub log_bad_records: bool,

    /// Direct-path INSERT (Oracle only). Raises `batch_size` to at least 10000.
    pub direct_path: bool,

    /// Empty the table before loading the first file.
    pub truncate_before_load: bool,

    /// Separator used to join fields of quarantined rows. Always taken from
    /// `source.separator` by [`Config::resolve`](super::Config::resolve).
    #[serde(skip)]
    pub column_separator: String,

    /// Target database type.
    pub backend: Backend,

    /// Replay failed batches row by row to pinpoint the offending record,
    /// even when errors are not ignored.
    pub diagnostic: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            ignore_errors: false,
            log_bad_records: false,
            direct_path: false,
            truncate_before_load: false,
            column_separator: ",".to_string(),
            backend: Backend::default(),
            diagnostic: false,
        }
    }
}

impl LoadOptions {
    /// Enforce the option invariants. Applied once, at configuration time.
    pub fn resolve(mut self) -> Result<Self> {
        if self.batch_size == 0 {
            return Err(LoadError::Config("load.batch_size must be at least 1".into()));
        }
        if self.column_separator.is_empty() {
            return Err(LoadError::Config(
                "load.column_separator must not be empty".into(),
            ));
        }

        if self.direct_path {
            if !self.backend.dialect().supports_direct_path() {
                warn!(
                    backend = %self.backend,
                    "Direct path loading is not supported by this backend, a conventional INSERT is used"
                );
            }
            if self.batch_size < DIRECT_PATH_MIN_BATCH_SIZE {
                debug!(
                    requested = self.batch_size,
                    "Direct path was specified but batch size is less than {}, raising it",
                    DIRECT_PATH_MIN_BATCH_SIZE
                );
                self.batch_size = DIRECT_PATH_MIN_BATCH_SIZE;
            }
        }

        if self.log_bad_records {
            self.ignore_errors = true;
        }

        Ok(self)
    }
}

/// Input file configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    /// File, directory or glob pattern.
    pub pattern: String,

    /// Text encoding label (WHATWG names, e.g. `utf-8`, `latin1`, `windows-1252`).
    pub encoding: String,

    /// Column separator character.
    pub separator: String,

    /// Quote character within which separators do not split.
    pub quote: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            pattern: "*.csv.zip".to_string(),
            encoding: "utf-8".to_string(),
            separator: ",".to_string(),
            quote: "\"".to_string(),
        }
    }
}

impl SourceOptions {
    /// Separator as the single byte the tokenizer needs.
    pub fn separator_byte(&self) -> Result<u8> {
        single_byte("source.separator", &self.separator)
    }

    /// Quote as the single byte the tokenizer needs.
    pub fn quote_byte(&self) -> Result<u8> {
        single_byte("source.quote", &self.quote)
    }
}

fn single_byte(field: &str, value: &str) -> Result<u8> {
    match value.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(LoadError::Config(format!(
            "{} must be a single ASCII character, got {:?}",
            field, value
        ))),
    }
}

/// Identifier handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierOptions {
    /// Upper-case all identifiers.
    pub case_insensitive: bool,

    /// Quote table and column identifiers.
    pub quote: bool,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_database() -> String {
    "ORCLPDB1".to_string()
}
