//! Backend dialect table.
//!
//! Every backend-sensitive decision the loader makes (placeholder syntax,
//! optimizer hints, commit/rollback cadence after errors, TRUNCATE handling)
//! is a field lookup on [`BackendDialect`]. Nothing outside this module
//! branches on the concrete [`Backend`].
//!
//! | Backend    | Binds   | Hint             | Rollback after error | Commit per row | TRUNCATE         |
//! |------------|---------|------------------|----------------------|----------------|------------------|
//! | Oracle     | `:col`  | `APPEND_VALUES`  | no                   | no             | implicit commit  |
//! | MySQL      | `?`     | -                | no                   | no             | implicit commit  |
//! | PostgreSQL | `$n`    | -                | yes                  | yes            | commit           |
//! | SQL Server | `@Pn`   | -                | yes                  | yes            | commit           |
//! | Db2        | `?`     | -                | no                   | no             | `IMMEDIATE`, commit |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{LoadError, Result};

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Oracle,
    Mysql,
    Postgres,
    Sqlserver,
    Db2,
}

impl Backend {
    /// All backends, in the order they are listed to users.
    pub const ALL: [Backend; 5] = [
        Backend::Oracle,
        Backend::Mysql,
        Backend::Postgres,
        Backend::Sqlserver,
        Backend::Db2,
    ];

    /// Lowercase name used on the command line and in config files.
    pub fn name(&self) -> &'static str {
        self.dialect().name
    }

    /// The dialect table entry for this backend.
    pub fn dialect(&self) -> &'static BackendDialect {
        match self {
            Backend::Oracle => &ORACLE,
            Backend::Mysql => &MYSQL,
            Backend::Postgres => &POSTGRES,
            Backend::Sqlserver => &SQLSERVER,
            Backend::Db2 => &DB2,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "oracle" => Ok(Backend::Oracle),
            "mysql" | "mariadb" => Ok(Backend::Mysql),
            "postgres" | "postgresql" | "pg" => Ok(Backend::Postgres),
            "sqlserver" | "mssql" | "sql_server" => Ok(Backend::Sqlserver),
            "db2" => Ok(Backend::Db2),
            other => Err(LoadError::Config(format!(
                "Unknown database type: '{}'. Supported types: oracle, mysql, postgres, sqlserver, db2",
                other
            ))),
        }
    }
}

/// Bind placeholder syntax of a backend's driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `:column`
    Named,
    /// `?`
    QuestionMark,
    /// Prefix followed by the 1-based position, e.g. `$1` or `@P1`.
    Numbered(&'static str),
}

impl BindStyle {
    /// Render the placeholder for the column at 1-based `position`.
    pub fn placeholder(&self, position: usize, column: &str) -> String {
        match self {
            BindStyle::Named => format!(":{}", column),
            BindStyle::QuestionMark => "?".to_string(),
            BindStyle::Numbered(prefix) => format!("{}{}", prefix, position),
        }
    }
}

/// Per-backend syntax and transaction behavior.
#[derive(Debug, PartialEq, Eq)]
pub struct BackendDialect {
    pub name: &'static str,
    pub bind_style: BindStyle,
    /// Optimizer hint placed after `INSERT` for direct-path loads, if supported.
    pub append_hint: Option<&'static str>,
    /// Character used to quote identifiers.
    pub identifier_quote: char,
    /// Any statement error leaves the transaction unusable until rolled back.
    pub must_rollback_after_error: bool,
    /// Successful rows replayed during recovery must be committed one by one.
    pub must_commit_per_row: bool,
    /// TRUNCATE is transactional and must be committed before inserting.
    pub truncate_requires_commit: bool,
    /// Keyword appended to `TRUNCATE TABLE <table>`.
    pub truncate_extra_keyword: Option<&'static str>,
    /// Port the database listens on unless told otherwise.
    pub default_port: u16,
}

impl BackendDialect {
    /// Whether a direct-path load has any effect on this backend.
    pub fn supports_direct_path(&self) -> bool {
        self.append_hint.is_some()
    }
}

pub static ORACLE: BackendDialect = BackendDialect {
    name: "oracle",
    bind_style: BindStyle::Named,
    append_hint: Some("/*+ APPEND_VALUES */"),
    identifier_quote: '"',
    must_rollback_after_error: false,
    must_commit_per_row: false,
    truncate_requires_commit: false,
    truncate_extra_keyword: None,
    default_port: 1521,
};

pub static MYSQL: BackendDialect = BackendDialect {
    name: "mysql",
    bind_style: BindStyle::QuestionMark,
    append_hint: None,
    identifier_quote: '`',
    must_rollback_after_error: false,
    must_commit_per_row: false,
    truncate_requires_commit: false,
    truncate_extra_keyword: None,
    default_port: 3306,
};

pub static POSTGRES: BackendDialect = BackendDialect {
    name: "postgres",
    bind_style: BindStyle::Numbered("$"),
    append_hint: None,
    identifier_quote: '"',
    must_rollback_after_error: true,
    must_commit_per_row: true,
    truncate_requires_commit: true,
    truncate_extra_keyword: None,
    default_port: 5432,
};

pub static SQLSERVER: BackendDialect = BackendDialect {
    name: "sqlserver",
    bind_style: BindStyle::Numbered("@P"),
    append_hint: None,
    identifier_quote: '"',
    must_rollback_after_error: true,
    must_commit_per_row: true,
    truncate_requires_commit: true,
    truncate_extra_keyword: None,
    default_port: 1433,
};

// Db2 refuses a second TRUNCATE ... IMMEDIATE in the same unit of work.
pub static DB2: BackendDialect = BackendDialect {
    name: "db2",
    bind_style: BindStyle::QuestionMark,
    append_hint: None,
    identifier_quote: '"',
    must_rollback_after_error: false,
    must_commit_per_row: false,
    truncate_requires_commit: true,
    truncate_extra_keyword: Some("IMMEDIATE"),
    default_port: 50000,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_from_str() {
        assert_eq!("oracle".parse::<Backend>().unwrap(), Backend::Oracle);
        assert_eq!("PostgreSQL".parse::<Backend>().unwrap(), Backend::Postgres);
        assert_eq!("mssql".parse::<Backend>().unwrap(), Backend::Sqlserver);
        assert_eq!("db2".parse::<Backend>().unwrap(), Backend::Db2);
        assert!("sqlite".parse::<Backend>().is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
        }
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(BindStyle::Named.placeholder(1, "bikeid"), ":bikeid");
        assert_eq!(BindStyle::QuestionMark.placeholder(3, "bikeid"), "?");
        assert_eq!(BindStyle::Numbered("$").placeholder(2, "x"), "$2");
        assert_eq!(BindStyle::Numbered("@P").placeholder(10, "x"), "@P10");
    }

    #[test]
    fn test_only_oracle_supports_direct_path() {
        let supported: Vec<_> = Backend::ALL
            .iter()
            .filter(|b| b.dialect().supports_direct_path())
            .collect();
        assert_eq!(supported, vec![&Backend::Oracle]);
    }

    #[test]
    fn test_transaction_quirks() {
        assert!(Backend::Postgres.dialect().must_rollback_after_error);
        assert!(Backend::Sqlserver.dialect().must_commit_per_row);
        assert!(!Backend::Oracle.dialect().must_commit_per_row);
        assert_eq!(Backend::Db2.dialect().truncate_extra_keyword, Some("IMMEDIATE"));
        assert!(!Backend::Mysql.dialect().truncate_requires_commit);
    }

    #[test]
    fn test_rollback_after_error_implies_commit_per_row() {
        // A rollback must never discard rows replayed earlier in the same batch.
        for backend in Backend::ALL {
            let d = backend.dialect();
            assert!(!d.must_rollback_after_error || d.must_commit_per_row, "{}", d.name);
        }
    }

    #[test]
    fn test_default_ports() {
        assert_eq!(Backend::Oracle.dialect().default_port, 1521);
        assert_eq!(Backend::Mysql.dialect().default_port, 3306);
        assert_eq!(Backend::Postgres.dialect().default_port, 5432);
        assert_eq!(Backend::Sqlserver.dialect().default_port, 1433);
        assert_eq!(Backend::Db2.dialect().default_port, 50000);
    }
}
