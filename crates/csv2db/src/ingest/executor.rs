//! Batch execution and the switch to row-level recovery.

use tracing::{debug, warn};

use super::{recovery, FileLoad};
use crate::error::{LoadError, Result};

impl FileLoad<'_> {
    /// Execute whatever is buffered, then clear the buffer whatever the outcome.
    ///
    /// The batch is committed (or rolled back) before it is cleared, so a row
    /// leaves the buffer only once the database has settled its fate.
    pub(super) async fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let outcome = self.execute_batch().await;
        self.batch.clear();
        outcome
    }

    async fn execute_batch(&mut self) -> Result<()> {
        let count = self.batch.len();
        debug!(rows = count, "Executing batch");

        let result = self
            .conn
            .execute_batch(&self.statement, self.batch.rows())
            .await;
        let failure = match result {
            Ok(_) => {
                self.conn.commit().await?;
                self.tally.loaded += count as u64;
                debug!(rows = count, total = self.tally.loaded, "Batch committed");
                return Ok(());
            }
            Err(e) if e.is_fatal_for_run() => return Err(e),
            Err(e) => e,
        };

        // Some backends refuse any further statement until the failed batch is rolled back.
        self.conn.rollback().await?;

        if !self.options.ignore_errors && !self.options.diagnostic {
            return Err(LoadError::BatchExecution {
                rows: count,
                message: failure.to_string(),
            });
        }

        warn!(rows = count, "Batch rejected, retrying row by row: {}", failure);
        recovery::replay(
            &mut *self.conn,
            &self.statement,
            self.batch.rows(),
            self.options,
            &mut self.sink,
            &mut self.tally,
        )
        .await
    }
}
