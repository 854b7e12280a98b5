//! Identifier validation, case folding and quoting.
//!
//! Table and column names cannot be bound as parameters, so they are spliced
//! into the generated SQL text. Every identifier goes through
//! [`IdentifierPolicy::apply`], which optionally upper-cases it and wraps it
//! in the backend's quote character, doubling any embedded quote.

use crate::config::IdentifierOptions;
use crate::dialect::Backend;
use crate::error::{LoadError, Result};

/// Longest identifier any supported backend accepts (Oracle, SQL Server, Db2).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Check that `name` can be spliced into generated SQL.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LoadError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(LoadError::Config(format!(
            "Identifier {:?} contains a null byte",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LoadError::Config(format!(
            "Identifier {:?} is {} bytes long, the maximum length is {}",
            name,
            name.len(),
            MAX_IDENTIFIER_LENGTH
        )));
    }

    Ok(())
}

/// Wrap `name` in `quote`, doubling embedded quote characters.
pub fn quote_with(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!(
        "{q}{}{q}",
        name.replace(quote, &doubled),
        q = quote
    )
}

/// Case folding and quoting applied to the table name and every header cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierPolicy {
    pub case_insensitive: bool,
    pub quote: Option<char>,
}

impl IdentifierPolicy {
    pub fn new(options: IdentifierOptions, backend: Backend) -> Self {
        Self {
            case_insensitive: options.case_insensitive,
            quote: options
                .quote
                .then_some(backend.dialect().identifier_quote),
        }
    }

    /// Identifiers are passed through untouched.
    pub fn verbatim() -> Self {
        Self {
            case_insensitive: false,
            quote: None,
        }
    }

    /// Apply case folding, then quoting.
    pub fn apply(&self, name: &str) -> String {
        let folded = if self.case_insensitive {
            name.to_uppercase()
        } else {
            name.to_string()
        };
        match self.quote {
            Some(q) => quote_with(&folded, q),
            None => folded,
        }
    }

    /// Apply the case folding only, e.g. to a column type.
    pub fn fold(&self, text: &str) -> String {
        if self.case_insensitive {
            text.to_uppercase()
        } else {
            text.to_string()
        }
    }
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self::verbatim()
    }
}
