//! Source files: discovery, decompression, decoding and tokenization.
//!
//! A file is opened as plain text, `.gz` or `.zip` (first entry), transcoded
//! to UTF-8 from the configured encoding and split into rows by the `csv`
//! tokenizer. The first row is the header; the reader does no header handling
//! of its own.

mod decode;

pub use decode::DecodingReader;

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use flate2::read::{DeflateDecoder, GzDecoder};
use tracing::debug;
use zip::CompressionMethod;

use crate::config::SourceOptions;
use crate::core::Row;
use crate::error::{LoadError, Result};

/// Expand the file pattern into a sorted list of files.
///
/// A directory expands to every `*.csv*` file directly inside it.
pub fn find_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = if Path::new(pattern).is_dir() {
        Path::new(pattern).join("*.csv*").to_string_lossy().into_owned()
    } else {
        pattern.to_string()
    };

    let entries = glob::glob(&pattern)
        .map_err(|e| LoadError::Config(format!("Invalid file pattern '{}': {}", pattern, e)))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| LoadError::Io(e.into_error()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    debug!(pattern = %pattern, count = files.len(), "Found files");
    Ok(files)
}

/// Look up an encoding by its WHATWG label (`utf-8`, `latin1`, `windows-1252`, ...).
pub fn encoding_for_label(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| LoadError::Config(format!("Unknown encoding '{}'", label)))
}

/// Open `path`, decompressing by file extension.
pub fn open_file(path: &Path) -> Result<Box<dyn Read>> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let file = File::open(path)?;

    if name.ends_with(".zip") {
        open_zip_entry(path, file)
    } else if name.ends_with(".gz") {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Stream the first entry of a zip archive without buffering it.
///
/// The central directory locates the entry's compressed bytes; they are then
/// read straight from the file and inflated on the fly. An archive without
/// entries reads as empty.
fn open_zip_entry(path: &Path, file: File) -> Result<Box<dyn Read>> {
    let mut archive = zip::ZipArchive::new(file).map_err(zip_error)?;
    if archive.is_empty() {
        return Ok(Box::new(io::empty()));
    }

    let (start, size, method) = {
        let entry = archive.by_index_raw(0).map_err(zip_error)?;
        debug!(
            file = %path.display(),
            entry = entry.name(),
            size = entry.size(),
            "Streaming zip entry"
        );
        if entry.encrypted() {
            return Err(unsupported_entry(format!(
                "entry '{}' is encrypted",
                entry.name()
            )));
        }
        (entry.data_start(), entry.compressed_size(), entry.compression())
    };

    let mut file = archive.into_inner();
    file.seek(SeekFrom::Start(start))?;
    let data = BufReader::new(file.take(size));

    match method {
        CompressionMethod::Stored => Ok(Box::new(data)),
        CompressionMethod::Deflated => Ok(Box::new(DeflateDecoder::new(data))),
        other => Err(unsupported_entry(format!(
            "compression method {:?} is not supported",
            other
        ))),
    }
}

fn unsupported_entry(message: String) -> LoadError {
    LoadError::Io(io::Error::new(io::ErrorKind::Unsupported, message))
}

fn zip_error(e: zip::result::ZipError) -> LoadError {
    match e {
        zip::result::ZipError::Io(io) => LoadError::Io(io),
        other => LoadError::Io(io::Error::new(io::ErrorKind::InvalidData, other)),
    }
}

/// Rows of one source file, header first.
pub struct RowReader {
    path: PathBuf,
    encoding: &'static Encoding,
    records: csv::StringRecordsIntoIter<DecodingReader<Box<dyn Read>>>,
    failed: bool,
}

impl RowReader {
    /// Open `path` with the given tokenizer and encoding settings.
    pub fn open(path: &Path, options: &SourceOptions) -> Result<Self> {
        let encoding = encoding_for_label(&options.encoding)?;
        let input = DecodingReader::new(open_file(path)?, encoding);

        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.separator_byte()?)
            .quote(options.quote_byte()?)
            .from_reader(input);

        Ok(Self {
            path: path.to_path_buf(),
            encoding,
            records: reader.into_records(),
            failed: false,
        })
    }

    fn map_error(&self, e: csv::Error) -> LoadError {
        let undecodable = match e.kind() {
            csv::ErrorKind::Io(io) => io.kind() == io::ErrorKind::InvalidData,
            csv::ErrorKind::Utf8 { .. } => true,
            _ => false,
        };
        if undecodable {
            LoadError::Encoding {
                path: self.path.clone(),
                encoding: self.encoding.name().to_string(),
                message: e.to_string(),
            }
        } else {
            LoadError::Csv(e)
        }
    }
}

impl Iterator for RowReader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.records.next()? {
            Ok(record) => Some(Ok(record.iter().map(str::to_string).collect())),
            Err(e) => {
                self.failed = true;
                Some(Err(self.map_error(e)))
            }
        }
    }
}

/// Read only the header row of `path`. `None` for an empty file.
pub fn read_header(path: &Path, options: &SourceOptions) -> Result<Option<Row>> {
    RowReader::open(path, options)?.next().transpose()
}
