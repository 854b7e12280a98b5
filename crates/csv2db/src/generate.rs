//! CREATE TABLE generation from file headers.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::SourceOptions;
use crate::core::{ColumnMap, IdentifierPolicy};
use crate::error::Result;
use crate::source::read_header;

/// Column type used when none is given.
pub const DEFAULT_COLUMN_TYPE: &str = "varchar(1000)";

/// Placeholder printed when no table name is given.
pub const TABLE_NAME_PLACEHOLDER: &str = "<TABLE NAME>";

/// Union of the header columns of `files`, in first-seen order.
pub fn collect_columns(
    files: &[PathBuf],
    source: &SourceOptions,
    policy: &IdentifierPolicy,
) -> Result<Vec<String>> {
    let mut columns: Vec<String> = Vec::new();
    for file in files {
        debug!(file = %file.display(), "Reading header");
        let Some(header) = read_header(file, source)? else {
            info!(file = %file.display(), "File is empty");
            continue;
        };
        let map = ColumnMap::from_header(&header, policy)?;
        for col in map.iter() {
            if !columns.iter().any(|c| c == col) {
                columns.push(col.to_string());
            }
        }
    }
    Ok(columns)
}

/// Render the CREATE TABLE statement, every column of `column_type`.
pub fn render_create_table(
    table: Option<&str>,
    columns: &[String],
    column_type: &str,
    policy: &IdentifierPolicy,
) -> String {
    let table = match table {
        Some(t) => policy.apply(t),
        None => TABLE_NAME_PLACEHOLDER.to_string(),
    };
    let column_type = policy.fold(column_type);

    let body: Vec<String> = columns
        .iter()
        .map(|c| format!("  {} {}", c, column_type))
        .collect();

    format!("CREATE TABLE {}\n(\n{}\n);\n", table, body.join(",\n"))
}

/// Read every header and render the CREATE TABLE statement.
pub fn generate_table_sql(
    files: &[PathBuf],
    table: Option<&str>,
    column_type: &str,
    source: &SourceOptions,
    policy: &IdentifierPolicy,
) -> Result<String> {
    let columns = collect_columns(files, source, policy)?;
    Ok(render_create_table(table, &columns, column_type, policy))
}
