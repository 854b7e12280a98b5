//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::core::IdentifierPolicy;
use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    ///
    /// Nothing is validated here; values may still be overridden before
    /// [`Config::resolve`] is called.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Normalize load options and validate the configuration for loading.
    ///
    /// Quarantined rows are joined with the separator the files are read
    /// with.
    pub fn resolve(mut self) -> Result<Self> {
        self.load.column_separator = self.source.separator.clone();
        self.load = self.load.resolve()?;
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Identifier policy for the configured backend.
    pub fn identifier_policy(&self) -> IdentifierPolicy {
        IdentifierPolicy::new(self.identifiers, self.load.backend)
    }

    /// Table name with the identifier policy applied.
    pub fn target_table(&self) -> Option<String> {
        let policy = self.identifier_policy();
        self.table.as_deref().map(|t| policy.apply(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Backend;

    #[test]
    fn test_from_yaml_with_defaults() {
        let yaml = r#"
table: staging
connection:
  user: loader
  password: secret
load:
  backend: postgres
  batch_size: 500
"#;
        let config = Config::from_yaml(yaml).unwrap().resolve().unwrap();
        assert_eq!(config.load.backend, Backend::Postgres);
        assert_eq!(config.load.batch_size, 500);
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.port_for(config.load.backend), 5432);
        assert_eq!(config.source.pattern, "*.csv.zip");
    }

    #[test]
    fn test_resolve_takes_column_separator_from_source() {
        let yaml = r#"
table: staging
connection:
  user: loader
source:
  separator: "|"
"#;
        let config = Config::from_yaml(yaml).unwrap().resolve().unwrap();
        assert_eq!(config.load.column_separator, "|");
    }

    #[test]
    fn test_resolve_applies_log_implies_ignore() {
        let yaml = r#"
table: staging
connection:
  user: loader
load:
  log_bad_records: true
"#;
        let config = Config::from_yaml(yaml).unwrap().resolve().unwrap();
        assert!(config.load.ignore_errors);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(Config::from_yaml("table: [").is_err());
    }

    #[test]
    fn test_target_table_applies_policy() {
        let yaml = r#"
table: staging
load:
  backend: mysql
identifiers:
  case_insensitive: true
  quote: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.target_table().unwrap(), "`STAGING`");
    }
}
