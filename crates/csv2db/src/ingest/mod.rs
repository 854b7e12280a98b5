//! Batch ingestion engine.
//!
//! One source file is loaded by [`load_file`]:
//!
//! 1. the header row becomes a [`ColumnMap`] and the INSERT is rendered once
//! 2. rows are buffered by the [`BatchAccumulator`] until `batch_size` or end of stream
//! 3. each full batch is executed as one set-oriented insert and committed
//! 4. a rejected batch is rolled back and, when permitted, replayed row by row,
//!    with rejected rows counted and optionally quarantined to `<file>.bad`
//!
//! All per-file state lives in one [`FileLoad`] value owned by the call, so
//! nothing leaks from one file into the next.

mod batch;
mod executor;
mod quarantine;
mod recovery;
mod statement;
mod truncate;

pub use batch::{Appended, BatchAccumulator};
pub use quarantine::{bad_file_path, BadRecordSink};
pub use statement::InsertStatement;
pub use truncate::truncate_table;

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::LoadOptions;
use crate::core::{ColumnMap, Connection, IdentifierPolicy, Row};
use crate::error::{LoadError, Result};

/// Outcome of loading one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadResult {
    pub rows_loaded: u64,
    pub rows_ignored: u64,
    pub had_error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Quarantine artifact, when at least one row was written to it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bad_records: Option<PathBuf>,
}

/// Running counters of one file load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub loaded: u64,
    pub ignored: u64,
}

/// Load context of one source file.
pub(crate) struct FileLoad<'a> {
    conn: &'a mut dyn Connection,
    options: &'a LoadOptions,
    statement: InsertStatement,
    batch: BatchAccumulator,
    sink: BadRecordSink,
    tally: Tally,
}

impl<'a> FileLoad<'a> {
    fn new(
        conn: &'a mut dyn Connection,
        source: &Path,
        table: &str,
        columns: &ColumnMap,
        options: &'a LoadOptions,
    ) -> Self {
        Self {
            statement: InsertStatement::build(table, columns, options),
            batch: BatchAccumulator::new(columns.len(), options),
            sink: BadRecordSink::new(source, &options.column_separator),
            tally: Tally::default(),
            conn,
            options,
        }
    }

    async fn run<I>(&mut self, rows: I) -> Result<()>
    where
        I: Iterator<Item = Result<Row>>,
    {
        for row in rows {
            if self.batch.append(row?) == Appended::Full {
                self.flush().await?;
            }
        }
        // End of stream.
        self.flush().await
    }
}

/// Load one file's rows into `table`.
///
/// The first row is the header. Per-file failures (bad header, rejected
/// batch or record, undecodable input) are reported in the returned
/// [`LoadResult`] with the counts reached so far. Only errors that make the
/// rest of the run pointless, a lost connection or cancellation, are
/// returned as `Err`.
pub async fn load_file<I>(
    conn: &mut dyn Connection,
    source: &Path,
    rows: I,
    table: &str,
    policy: &IdentifierPolicy,
    options: &LoadOptions,
) -> Result<LoadResult>
where
    I: IntoIterator<Item = Result<Row>>,
{
    let started = Instant::now();
    let mut rows = rows.into_iter();

    let header = match rows.next() {
        None => {
            info!(file = %source.display(), "File is empty");
            return Ok(LoadResult::default());
        }
        Some(Err(e)) => return file_failure(conn, source, e, Tally::default()).await,
        Some(Ok(header)) => header,
    };

    let columns = match ColumnMap::from_header(&header, policy) {
        Ok(columns) => columns,
        Err(e) => return file_failure(conn, source, e, Tally::default()).await,
    };

    let (outcome, tally, bad_records) = {
        let mut load = FileLoad::new(conn, source, table, &columns, options);
        info!(file = %source.display(), sql = load.statement.sql(), "Loading file");

        let mut outcome = load.run(rows).await;
        if let Err(e) = load.sink.close() {
            if outcome.is_ok() {
                outcome = Err(e);
            }
        }
        let bad_records = (load.sink.written() > 0).then(|| load.sink.path().to_path_buf());
        (outcome, load.tally, bad_records)
    };

    if let Some(ref path) = bad_records {
        warn!(
            file = %source.display(),
            rejected = tally.ignored,
            "Rejected records written to {}",
            path.display()
        );
    }

    match outcome {
        Ok(()) => {
            let elapsed = started.elapsed();
            let rows_per_sec = if elapsed.as_secs_f64() > 0.0 {
                (tally.loaded as f64 / elapsed.as_secs_f64()) as u64
            } else {
                tally.loaded
            };
            info!(
                file = %source.display(),
                rows = tally.loaded,
                ignored = tally.ignored,
                rows_per_sec,
                "File loaded in {:.1}s",
                elapsed.as_secs_f64()
            );
            Ok(LoadResult {
                rows_loaded: tally.loaded,
                rows_ignored: tally.ignored,
                had_error: false,
                error: None,
                bad_records,
            })
        }
        Err(e) => {
            let mut result = file_failure(conn, source, e, tally).await?;
            result.bad_records = bad_records;
            Ok(result)
        }
    }
}

/// Record a per-file failure, or pass a run-level one through.
async fn file_failure(
    conn: &mut dyn Connection,
    source: &Path,
    err: LoadError,
    tally: Tally,
) -> Result<LoadResult> {
    if err.is_fatal_for_run() {
        return Err(err);
    }

    error!(file = %source.display(), "Error while loading file: {}", err);

    // Nothing of the aborted file may linger in the open transaction.
    if let Err(e) = conn.rollback().await {
        if e.is_fatal_for_run() {
            return Err(e);
        }
        warn!("Rollback after failed file: {}", e);
    }

    Ok(LoadResult {
        rows_loaded: tally.loaded,
        rows_ignored: tally.ignored,
        had_error: true,
        error: Some(err.to_string()),
        bad_records: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Backend;
    use crate::testing::{Event, ScriptedConnection};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn row(fields: &[&str]) -> Row {
        fields.iter().map(|f| f.to_string()).collect()
    }

    fn rows(data: &[Row]) -> Vec<Result<Row>> {
        data.iter().cloned().map(Ok).collect()
    }

    /// Header plus ten rows; row 4 carries a non-numeric id.
    fn ten_rows_with_bad_fourth() -> Vec<Row> {
        let mut data = vec![row(&["id", "name"])];
        for i in 1..=10 {
            if i == 4 {
                data.push(row(&["four", "d"]));
            } else {
                data.push(row(&[&i.to_string(), "x"]));
            }
        }
        data
    }

    fn non_numeric_id(row: &[String]) -> bool {
        row.first().map_or(true, |id| id.parse::<i64>().is_err())
    }

    fn options(batch_size: usize, ignore: bool, log: bool) -> LoadOptions {
        LoadOptions {
            batch_size,
            ignore_errors: ignore,
            log_bad_records: log,
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn source(dir: &TempDir) -> PathBuf {
        dir.path().join("trips.csv")
    }

    async fn load(
        conn: &mut ScriptedConnection,
        source: &Path,
        data: &[Row],
        options: &LoadOptions,
    ) -> Result<LoadResult> {
        load_file(
            conn,
            source,
            rows(data),
            "trips",
            &IdentifierPolicy::verbatim(),
            options,
        )
        .await
    }

    fn batches(events: &[Event]) -> Vec<Vec<Row>> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Batch(rows) => Some(rows.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_bad_row_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle).rejecting(non_numeric_id);

        let result = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &options(10, true, true))
            .await
            .unwrap();

        assert_eq!(result.rows_loaded, 9);
        assert_eq!(result.rows_ignored, 1);
        assert!(!result.had_error);
        assert_eq!(conn.committed().len(), 9);

        let bad = std::fs::read_to_string(bad_file_path(&source(&dir))).unwrap();
        assert_eq!(bad, "four,d\n");
        assert_eq!(result.bad_records, Some(bad_file_path(&source(&dir))));
    }

    #[tokio::test]
    async fn test_bad_row_without_ignore_fails_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle).rejecting(non_numeric_id);

        let result = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &options(10, false, false))
            .await
            .unwrap();

        assert!(result.had_error);
        assert_eq!(result.rows_loaded, 0);
        assert!(conn.committed().is_empty());
        assert!(!bad_file_path(&source(&dir)).exists());
        assert!(result.error.unwrap().contains("Batch of 10 rows rejected"));
    }

    #[tokio::test]
    async fn test_ignore_without_log_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Mysql).rejecting(non_numeric_id);

        let result = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &options(10, true, false))
            .await
            .unwrap();

        assert_eq!((result.rows_loaded, result.rows_ignored), (9, 1));
        assert!(!bad_file_path(&source(&dir)).exists());
        assert_eq!(result.bad_records, None);
    }

    #[tokio::test]
    async fn test_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Postgres);

        let result = load(&mut conn, &source(&dir), &[row(&["id", "name"])], &options(10, false, false))
            .await
            .unwrap();

        assert_eq!(result, LoadResult::default());
        assert!(batches(&conn.events()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Postgres);

        let result = load(&mut conn, &source(&dir), &[], &options(10, false, false))
            .await
            .unwrap();

        assert!(!result.had_error);
        assert!(conn.events().is_empty());
    }

    #[tokio::test]
    async fn test_one_flush_at_batch_size_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle);
        let data = vec![
            row(&["id"]),
            row(&["1"]),
            row(&["2"]),
            row(&["3"]),
            row(&["4"]),
        ];

        let result = load(&mut conn, &source(&dir), &data, &options(3, false, false))
            .await
            .unwrap();

        assert_eq!(result.rows_loaded, 4);
        assert_eq!(
            conn.events(),
            vec![
                Event::Batch(vec![row(&["1"]), row(&["2"]), row(&["3"])]),
                Event::Commit,
                Event::Batch(vec![row(&["4"])]),
                Event::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_batch_rows_never_resubmitted() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle).rejecting(non_numeric_id);

        let result = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &options(3, true, false))
            .await
            .unwrap();
        assert_eq!((result.rows_loaded, result.rows_ignored), (9, 1));

        let submitted: Vec<Row> = batches(&conn.events()).into_iter().flatten().collect();
        assert_eq!(submitted.len(), 10);
        assert_eq!(submitted, ten_rows_with_bad_fourth()[1..].to_vec());
    }

    #[tokio::test]
    async fn test_postgres_recovery_commits_per_row_and_rolls_back_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Postgres).rejecting(non_numeric_id);
        let data = vec![row(&["id"]), row(&["1"]), row(&["x"]), row(&["3"])];

        let result = load(&mut conn, &source(&dir), &data, &options(10, true, false))
            .await
            .unwrap();

        assert_eq!((result.rows_loaded, result.rows_ignored), (2, 1));
        assert_eq!(conn.committed(), vec![row(&["1"]), row(&["3"])]);
        assert_eq!(
            conn.events(),
            vec![
                Event::Batch(vec![row(&["1"]), row(&["x"]), row(&["3"])]),
                Event::Rollback,
                Event::Row(row(&["1"])),
                Event::Commit,
                Event::Row(row(&["x"])),
                Event::Rollback,
                Event::Row(row(&["3"])),
                Event::Commit,
            ]
        );
    }

    #[tokio::test]
    async fn test_oracle_recovery_commits_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle).rejecting(non_numeric_id);
        let data = vec![row(&["id"]), row(&["1"]), row(&["x"]), row(&["3"])];

        load(&mut conn, &source(&dir), &data, &options(10, true, false))
            .await
            .unwrap();

        let events = conn.events();
        let commits = events.iter().filter(|e| **e == Event::Commit).count();
        assert_eq!(commits, 1);
        assert_eq!(events.last(), Some(&Event::Commit));
        assert_eq!(conn.committed(), vec![row(&["1"]), row(&["3"])]);
    }

    #[tokio::test]
    async fn test_diagnostic_mode_reports_offending_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle).rejecting(non_numeric_id);
        let opts = LoadOptions {
            diagnostic: true,
            ..options(10, false, false)
        };

        let result = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &opts)
            .await
            .unwrap();

        assert!(result.had_error);
        assert_eq!(result.rows_loaded, 0);
        assert!(result.error.unwrap().contains("four,d"));
        assert!(conn.committed().is_empty());
        // Rows after the offending one are not replayed.
        assert!(!conn.events().contains(&Event::Row(row(&["5", "x"]))));
    }

    #[tokio::test]
    async fn test_short_row_passed_unpadded() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Mysql);
        let data = vec![row(&["id", "name", "city"]), row(&["1"])];

        load(&mut conn, &source(&dir), &data, &options(10, false, false))
            .await
            .unwrap();

        assert_eq!(batches(&conn.events()), vec![vec![row(&["1"])]]);
    }

    #[tokio::test]
    async fn test_over_wide_row_quarantined_when_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Mysql).rejecting(|r| r.len() != 2);
        let data = vec![row(&["id", "name"]), row(&["1", "a"]), row(&["2", "b", "extra"])];

        let result = load(&mut conn, &source(&dir), &data, &options(10, true, true))
            .await
            .unwrap();

        assert_eq!((result.rows_loaded, result.rows_ignored), (1, 1));
        let bad = std::fs::read_to_string(bad_file_path(&source(&dir))).unwrap();
        assert_eq!(bad, "2,b,extra\n");
    }

    #[tokio::test]
    async fn test_empty_header_cell_fails_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle);
        let data = vec![row(&["id", "", "city"]), row(&["1", "a", "b"])];

        let result = load(&mut conn, &source(&dir), &data, &options(10, false, false))
            .await
            .unwrap();

        assert!(result.had_error);
        assert!(result.error.unwrap().contains("position 2"));
        assert!(batches(&conn.events()).is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_keeps_partial_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Oracle);
        let input: Vec<Result<Row>> = vec![
            Ok(row(&["id"])),
            Ok(row(&["1"])),
            Ok(row(&["2"])),
            Err(LoadError::Encoding {
                path: source(&dir),
                encoding: "UTF-8".into(),
                message: "invalid byte sequence".into(),
            }),
            Ok(row(&["3"])),
        ];

        let result = load_file(
            &mut conn,
            &source(&dir),
            input,
            "trips",
            &IdentifierPolicy::verbatim(),
            &options(2, false, false),
        )
        .await
        .unwrap();

        assert!(result.had_error);
        assert_eq!(result.rows_loaded, 2);
        assert_eq!(conn.committed(), vec![row(&["1"]), row(&["2"])]);
    }

    #[tokio::test]
    async fn test_connection_loss_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = ScriptedConnection::new(Backend::Postgres).losing_connection();

        let err = load(&mut conn, &source(&dir), &ten_rows_with_bad_fourth(), &options(10, true, true))
            .await
            .unwrap_err();

        assert!(matches!(err, LoadError::Connection(_)));
    }
}
