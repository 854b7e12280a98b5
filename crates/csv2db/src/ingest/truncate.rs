//! Table truncation before a load.

use tracing::info;

use crate::core::Connection;
use crate::error::Result;

/// Empty `table` so the following inserts start from a clean slate.
///
/// Backends whose TRUNCATE is transactional get a commit afterwards so the
/// inserts do not run in the same unit of work.
pub async fn truncate_table(conn: &mut dyn Connection, table: &str) -> Result<()> {
    let dialect = conn.backend().dialect();

    let sql = match dialect.truncate_extra_keyword {
        Some(keyword) => format!("TRUNCATE TABLE {} {}", table, keyword),
        None => format!("TRUNCATE TABLE {}", table),
    };

    info!(table, "Truncating table");

    if dialect.truncate_requires_commit {
        // TRUNCATE ... IMMEDIATE must be the first statement of its unit of work.
        conn.commit().await?;
    }
    conn.execute(&sql).await?;
    if dialect.truncate_requires_commit {
        conn.commit().await?;
    }
    Ok(())
}
