//! Error types for the loader library.

use std::path::PathBuf;

use thiserror::Error;

/// Process exit status: everything loaded (quarantined rows do not count as failure).
pub const EXIT_SUCCESS: u8 = 0;
/// Process exit status: unexpected error, `generate` failure or cancellation.
pub const EXIT_GENERIC_ERROR: u8 = 1;
/// Process exit status: the database could not be reached or its driver is unavailable.
pub const EXIT_DATABASE_ERROR: u8 = 3;
/// Process exit status: at least one file ended with an unrecovered data loading error.
pub const EXIT_DATA_LOADING_ERROR: u8 = 4;

/// Main error type for load operations.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Configuration error (invalid YAML, missing fields, bad option values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A header cell was empty; `position` is 1-based.
    #[error("The header column name is empty for column at position {position}")]
    Validation { position: usize },

    /// Backend unreachable, connection lost, or driver unavailable.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// A statement was rejected by the backend.
    #[error("{backend} error: {message}")]
    Database {
        backend: &'static str,
        message: String,
    },

    /// A batch was rejected and row-level recovery was not permitted.
    #[error("Batch of {rows} rows rejected: {message}")]
    BatchExecution { rows: usize, message: String },

    /// A single row was rejected during row-level recovery.
    #[error("Record rejected: {message}\n  Record: {record}")]
    RowExecution { record: String, message: String },

    /// The source bytes could not be decoded with the configured encoding.
    #[error("File {} is not valid {encoding}: {message}", path.display())]
    Encoding {
        path: PathBuf,
        encoding: String,
        message: String,
    },

    /// The source file has no header row.
    #[error("File is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed delimited input.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was interrupted (SIGINT, SIGTERM).
    #[error("Load cancelled")]
    Cancelled,
}

impl LoadError {
    /// Create a Database error for the given backend.
    pub fn database(backend: &'static str, message: impl Into<String>) -> Self {
        LoadError::Database {
            backend,
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run rather than just the current file.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(self, LoadError::Connection(_) | LoadError::Cancelled)
    }

    /// Map the error to the process exit status scripted callers branch on.
    pub fn exit_code(&self) -> u8 {
        match self {
            LoadError::Connection(_) => EXIT_DATABASE_ERROR,
            LoadError::Database { .. }
            | LoadError::BatchExecution { .. }
            | LoadError::RowExecution { .. }
            | LoadError::Encoding { .. } => EXIT_DATA_LOADING_ERROR,
            _ => EXIT_GENERIC_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
