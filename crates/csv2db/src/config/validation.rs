//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{LoadError, Result};

/// Validate a configuration about to be used for loading.
pub fn validate(config: &Config) -> Result<()> {
    match config.table.as_deref() {
        None | Some("") => return Err(LoadError::Config("table is required".into())),
        Some(table) => validate_identifier(table)?,
    }

    if config.connection.user.is_empty() {
        return Err(LoadError::Config("connection.user is required".into()));
    }
    if config.connection.host.is_empty() {
        return Err(LoadError::Config("connection.host is required".into()));
    }
    if let Some(0) = config.connection.port {
        return Err(LoadError::Config("connection.port must not be 0".into()));
    }

    config.source.separator_byte()?;
    config.source.quote_byte()?;
    if encoding_rs::Encoding::for_label(config.source.encoding.as_bytes()).is_none() {
        return Err(LoadError::Config(format!(
            "Unknown source.encoding '{}'",
            config.source.encoding
        )));
    }

    Ok(())
}
