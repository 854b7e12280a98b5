//! Column mapping from a header row.

use super::identifier::{validate_identifier, IdentifierPolicy};
use crate::error::{LoadError, Result};

/// Ordered, validated column names of one source file.
///
/// Position defines bind order. Built once per file and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    columns: Vec<String>,
}

impl ColumnMap {
    /// Build the column list from a raw header row.
    ///
    /// Every space, leading and trailing included, becomes an underscore
    /// before the identifier policy is applied. An empty cell fails with
    /// [`LoadError::Validation`] naming its 1-based position.
    pub fn from_header<S: AsRef<str>>(header: &[S], policy: &IdentifierPolicy) -> Result<Self> {
        let mut columns = Vec::with_capacity(header.len());
        for (idx, cell) in header.iter().enumerate() {
            let cell = cell.as_ref();
            if cell.trim().is_empty() {
                return Err(LoadError::Validation { position: idx + 1 });
            }
            let name = cell.replace(' ', "_");
            validate_identifier(&name)?;
            columns.push(policy.apply(&name));
        }
        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }
}
