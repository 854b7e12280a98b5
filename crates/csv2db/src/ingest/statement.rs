//! INSERT statement rendering.

use crate::config::LoadOptions;
use crate::core::ColumnMap;
use crate::dialect::BindStyle;

/// The INSERT statement for one source file, rendered once and reused for
/// every batch of that file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    sql: String,
    values_at: usize,
    column_count: usize,
}

impl InsertStatement {
    /// Render `INSERT<hint> INTO <table> (<cols>) VALUES (<binds>)`.
    ///
    /// The hint is only emitted for a direct-path load on a backend that has one.
    pub fn build(table: &str, columns: &ColumnMap, options: &LoadOptions) -> Self {
        let dialect = options.backend.dialect();

        let hint = match dialect.append_hint {
            Some(hint) if options.direct_path => format!(" {}", hint),
            _ => String::new(),
        };

        let binds: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(idx, col)| dialect.bind_style.placeholder(idx + 1, bind_name(dialect.bind_style, col)))
            .collect();

        let head = format!("INSERT{} INTO {} ({})", hint, table, columns.names().join(", "));
        let values_at = head.len();
        let sql = format!("{} VALUES ({})", head, binds.join(", "));

        Self {
            sql,
            values_at,
            column_count: columns.len(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The statement up to and excluding ` VALUES`.
    pub fn head(&self) -> &str {
        &self.sql[..self.values_at]
    }

    /// Number of bind parameters per row.
    pub fn column_count(&self) -> usize {
        self.column_count
    }
}

/// Named binds take the bare column name even when the column itself is quoted.
fn bind_name(style: BindStyle, column: &str) -> &str {
    match style {
        BindStyle::Named => column.trim_matches(|c| c == '"' || c == '`'),
        _ => column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentifierOptions;
    use crate::core::IdentifierPolicy;
    use crate::dialect::Backend;

    fn columns() -> ColumnMap {
        ColumnMap::from_header(&["bikeid", "start_time", "duration"], &IdentifierPolicy::verbatim())
            .unwrap()
    }

    fn options(backend: Backend, direct_path: bool) -> LoadOptions {
        LoadOptions {
            backend,
            direct_path,
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn test_oracle_named_binds() {
        let stmt = InsertStatement::build("trips", &columns(), &options(Backend::Oracle, false));
        assert_eq!(
            stmt.sql(),
            "INSERT INTO trips (bikeid, start_time, duration) VALUES (:bikeid, :start_time, :duration)"
        );
        assert_eq!(stmt.column_count(), 3);
        assert_eq!(stmt.head(), "INSERT INTO trips (bikeid, start_time, duration)");
    }

    #[test]
    fn test_oracle_direct_path_hint() {
        let stmt = InsertStatement::build("trips", &columns(), &options(Backend::Oracle, true));
        assert!(stmt.sql().starts_with("INSERT /*+ APPEND_VALUES */ INTO trips"));
    }

    #[test]
    fn test_direct_path_ignored_without_hint() {
        for backend in [Backend::Mysql, Backend::Postgres, Backend::Sqlserver, Backend::Db2] {
            let stmt = InsertStatement::build("trips", &columns(), &options(backend, true));
            assert!(stmt.sql().starts_with("INSERT INTO trips"), "{}", stmt.sql());
        }
    }

    #[test]
    fn test_positional_binds() {
        let mysql = InsertStatement::build("t", &columns(), &options(Backend::Mysql, false));
        assert!(mysql.sql().ends_with("VALUES (?, ?, ?)"));
        let db2 = InsertStatement::build("t", &columns(), &options(Backend::Db2, false));
        assert!(db2.sql().ends_with("VALUES (?, ?, ?)"));
        let pg = InsertStatement::build("t", &columns(), &options(Backend::Postgres, false));
        assert!(pg.sql().ends_with("VALUES ($1, $2, $3)"));
        let mssql = InsertStatement::build("t", &columns(), &options(Backend::Sqlserver, false));
        assert!(mssql.sql().ends_with("VALUES (@P1, @P2, @P3)"));
    }

    #[test]
    fn test_quoted_columns_keep_bare_bind_names() {
        let policy = IdentifierPolicy::new(
            IdentifierOptions {
                case_insensitive: true,
                quote: true,
            },
            Backend::Oracle,
        );
        let cols = ColumnMap::from_header(&["id"], &policy).unwrap();
        let stmt = InsertStatement::build("\"T\"", &cols, &options(Backend::Oracle, false));
        assert_eq!(stmt.sql(), "INSERT INTO \"T\" (\"ID\") VALUES (:ID)");
    }

    #[test]
    fn test_identical_inputs_identical_sql() {
        let opts = options(Backend::Postgres, false);
        let a = InsertStatement::build("trips", &columns(), &opts);
        let b = InsertStatement::build("trips", &columns(), &opts);
        assert_eq!(a.sql().as_bytes(), b.sql().as_bytes());
    }
}
