//! Load orchestrator: one connection, files loaded strictly in order.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LoadOptions, SourceOptions};
use crate::core::{Connection, IdentifierPolicy};
use crate::drivers;
use crate::error::{LoadError, Result, EXIT_DATA_LOADING_ERROR, EXIT_SUCCESS};
use crate::ingest::{self, truncate_table, LoadResult};
use crate::source::RowReader;

/// Loads files into one table over a single connection.
pub struct Loader {
    conn: Box<dyn Connection>,
    table: String,
    policy: IdentifierPolicy,
    options: LoadOptions,
    source: SourceOptions,
}

/// Per-file entry of a [`RunSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: PathBuf,
    #[serde(flatten)]
    pub result: LoadResult,
}

/// Result of a load run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// `completed`, or `failed` when any file ended with an error.
    pub status: String,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub files_total: usize,
    pub files_failed: usize,
    pub rows_loaded: u64,
    pub rows_ignored: u64,

    /// Files that ended with an unrecovered error.
    pub failed_files: Vec<PathBuf>,

    pub files: Vec<FileSummary>,
}

impl RunSummary {
    fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: "running".to_string(),
            started_at,
            completed_at: started_at,
            duration_seconds: 0.0,
            files_total: 0,
            files_failed: 0,
            rows_loaded: 0,
            rows_ignored: 0,
            failed_files: Vec::new(),
            files: Vec::new(),
        }
    }

    fn record(&mut self, path: &Path, result: LoadResult) {
        self.files_total += 1;
        self.rows_loaded += result.rows_loaded;
        self.rows_ignored += result.rows_ignored;
        if result.had_error {
            self.files_failed += 1;
            self.failed_files.push(path.to_path_buf());
        }
        self.files.push(FileSummary {
            path: path.to_path_buf(),
            result,
        });
    }

    fn finish(&mut self, started: Instant) {
        self.completed_at = Utc::now();
        self.duration_seconds = started.elapsed().as_secs_f64();
        self.status = if self.files_failed > 0 {
            "failed".to_string()
        } else {
            "completed".to_string()
        };
    }

    /// Whether any file ended with an unrecovered error.
    pub fn has_failures(&self) -> bool {
        self.files_failed > 0
    }

    /// Process exit status for this run. Quarantined rows alone are not a failure.
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            EXIT_DATA_LOADING_ERROR
        } else {
            EXIT_SUCCESS
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Loader {
    /// Connect to the configured backend. `config` must already be resolved.
    ///
    /// Gives up with [`LoadError::Cancelled`] as soon as `cancel` fires, so a
    /// slow or hanging login can be interrupted.
    pub async fn connect(config: &Config, cancel: &CancellationToken) -> Result<Self> {
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(LoadError::Cancelled),
            r = drivers::connect(config.load.backend, &config.connection) => r?,
        };
        Self::new(conn, config)
    }

    /// Build a loader on an already open connection.
    pub fn new(conn: Box<dyn Connection>, config: &Config) -> Result<Self> {
        let table = config
            .target_table()
            .ok_or_else(|| LoadError::Config("table is required".into()))?;
        Ok(Self {
            conn,
            table,
            policy: config.identifier_policy(),
            options: config.load.clone(),
            source: config.source.clone(),
        })
    }

    /// Load one file. Failures confined to the file are reported in the result.
    pub async fn load_file(&mut self, path: &Path) -> Result<LoadResult> {
        let rows = match RowReader::open(path, &self.source) {
            Ok(rows) => rows,
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                error!(file = %path.display(), "Cannot read file: {}", e);
                return Ok(LoadResult {
                    had_error: true,
                    error: Some(e.to_string()),
                    ..Default::default()
                });
            }
        };

        ingest::load_file(
            self.conn.as_mut(),
            path,
            rows,
            &self.table,
            &self.policy,
            &self.options,
        )
        .await
    }

    /// Load `files` in order, truncating the table first if requested.
    ///
    /// The connection is closed on every exit path. Cancellation stops the
    /// run at the next await point; uncommitted work is rolled back by the
    /// server when the connection closes.
    pub async fn run(mut self, files: &[PathBuf], cancel: CancellationToken) -> Result<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(uuid::Uuid::new_v4().to_string(), Utc::now());

        info!(
            run_id = %summary.run_id,
            table = %self.table,
            files = files.len(),
            batch_size = self.options.batch_size,
            "Starting load"
        );

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LoadError::Cancelled),
            r = self.load_all(files, &mut summary) => r,
        };

        if let Err(e) = self.conn.close().await {
            warn!("Error closing connection: {}", e);
        }

        outcome?;
        summary.finish(started);

        info!(
            run_id = %summary.run_id,
            files = summary.files_total,
            failed = summary.files_failed,
            rows = summary.rows_loaded,
            ignored = summary.rows_ignored,
            "Load finished in {:.1}s",
            summary.duration_seconds
        );
        Ok(summary)
    }

    async fn load_all(&mut self, files: &[PathBuf], summary: &mut RunSummary) -> Result<()> {
        if self.options.truncate_before_load {
            truncate_table(self.conn.as_mut(), &self.table).await?;
        }

        for file in files {
            debug!(file = %file.display(), "Opening file");
            let result = self.load_file(file).await?;
            if result.had_error {
                warn!(file = %file.display(), "Skipping file");
            }
            summary.record(file, result);
        }
        Ok(())
    }
}
