//! Row-level replay of a rejected batch.

use tracing::{debug, error};

use super::{InsertStatement, Tally};
use crate::config::LoadOptions;
use crate::core::{Connection, Row};
use crate::error::{LoadError, Result};
use crate::ingest::BadRecordSink;

/// Replay `rows` one at a time to isolate the ones the database rejects.
///
/// Each row runs on a freshly prepared statement. With `ignore_errors`,
/// rejected rows are counted, optionally quarantined, and skipped.
/// Without it, the first rejected row aborts the replay: uncommitted work is
/// rolled back and the remaining rows are discarded.
pub(crate) async fn replay(
    conn: &mut dyn Connection,
    stmt: &InsertStatement,
    rows: &[Row],
    options: &LoadOptions,
    sink: &mut BadRecordSink,
    tally: &mut Tally,
) -> Result<()> {
    let dialect = conn.backend().dialect();
    let mut uncommitted = 0u64;

    for (idx, row) in rows.iter().enumerate() {
        match conn.execute_row(stmt, row).await {
            Ok(()) => {
                tally.loaded += 1;
                if dialect.must_commit_per_row {
                    conn.commit().await?;
                } else {
                    uncommitted += 1;
                }
            }
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => {
                let record = row.join(&options.column_separator);

                if !options.ignore_errors {
                    error!(record = %record, "Error with record: {}", e);
                    conn.rollback().await?;
                    tally.loaded -= uncommitted;
                    debug!(
                        discarded = rows.len() - idx - 1,
                        "Remaining rows of the batch are not replayed"
                    );
                    return Err(LoadError::RowExecution {
                        record,
                        message: e.to_string(),
                    });
                }

                debug!(record = %record, "Ignoring record: {}", e);
                tally.ignored += 1;
                if dialect.must_rollback_after_error {
                    conn.rollback().await?;
                }
                if options.log_bad_records {
                    sink.write(row)?;
                }
            }
        }
    }

    if !dialect.must_commit_per_row {
        conn.commit().await?;
    }
    Ok(())
}
