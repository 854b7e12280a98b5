//! Row buffering between the row source and the batch executor.

use crate::config::LoadOptions;
use crate::core::Row;

/// What happened to a row handed to [`BatchAccumulator::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    /// Row without any field, dropped.
    Skipped,
    /// Buffered; the batch has room left.
    Buffered,
    /// Buffered; the batch reached `batch_size` and must be flushed now.
    Full,
}

/// Buffers rows until the batch is full or the stream ends.
///
/// Over-wide rows are trimmed to the column count only when errors are
/// ignored without being logged. When bad records are logged they are kept
/// as read so the database rejects them and they land in quarantine.
/// Short rows are never padded.
#[derive(Debug)]
pub struct BatchAccumulator {
    rows: Vec<Row>,
    batch_size: usize,
    width: usize,
    trim: bool,
}

impl BatchAccumulator {
    pub fn new(width: usize, options: &LoadOptions) -> Self {
        Self {
            rows: Vec::with_capacity(options.batch_size.min(10_000)),
            batch_size: options.batch_size,
            width,
            trim: options.ignore_errors && !options.log_bad_records,
        }
    }

    /// Add a row. The caller must flush and [`clear`](Self::clear) on `Full`
    /// before appending again.
    pub fn append(&mut self, mut row: Row) -> Appended {
        if is_blank(&row) {
            return Appended::Skipped;
        }
        if self.trim && row.len() > self.width {
            row.truncate(self.width);
        }
        self.rows.push(row);

        if self.is_full() {
            Appended::Full
        } else {
            Appended::Buffered
        }
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.batch_size
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Drop all buffered rows. Called after every execution attempt.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

/// Only a line with no fields at all is blank. A single empty field is a
/// value for a one-column table.
fn is_blank(row: &[String]) -> bool {
    row.is_empty()
}
