//! Bad-record sink: rejected rows written to `<source-file>.bad`.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// Per-file quarantine artifact, created on the first rejected row.
///
/// Every record is written with a single unbuffered write so the artifact
/// is complete up to the last rejected row even if the process dies.
/// The handle stays open until [`close`](Self::close) or drop, whichever
/// comes first.
#[derive(Debug)]
pub struct BadRecordSink {
    path: PathBuf,
    separator: String,
    file: Option<File>,
    written: u64,
}

impl BadRecordSink {
    pub fn new(source: &Path, separator: &str) -> Self {
        Self {
            path: bad_file_path(source),
            separator: separator.to_string(),
            file: None,
            written: 0,
        }
    }

    /// Append one record: its fields joined by the column separator.
    pub fn write(&mut self, row: &[String]) -> Result<()> {
        let file = match self.file {
            Some(ref mut file) => file,
            None => {
                debug!(path = %self.path.display(), "Opening bad record file");
                self.file.insert(File::create(&self.path)?)
            }
        };

        let mut line = row.join(&self.separator);
        line.push('\n');
        file.write_all(line.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// The artifact path, whether or not it has been created.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the handle. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for BadRecordSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), "Failed to close bad record file: {}", e);
        }
    }
}

/// `<source-file>.bad`, next to the source file.
pub fn bad_file_path(source: &Path) -> PathBuf {
    let mut name = source.as_os_str().to_owned();
    name.push(".bad");
    PathBuf::from(name)
}
