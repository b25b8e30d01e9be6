//! Explicitly drop one column and its sequence.

use serde::Serialize;

use crate::config::PlumblineConfig;
use crate::error::Result;
use crate::sink::{SqlSink, StatementCache};

#[derive(Debug, Serialize)]
pub struct DropColumnReport {
    pub table: String,
    pub column: String,
    /// `false` when the column did not exist and nothing was done.
    pub dropped: bool,
    pub statements_executed: usize,
}

/// Execute the drop-column command.
pub async fn execute<S: SqlSink>(
    sink: &S,
    cache: &dyn StatementCache,
    config: &PlumblineConfig,
    table: &str,
    column: &str,
) -> Result<DropColumnReport> {
    let migrator = super::migrator(sink, cache, config);
    let dropped = migrator.drop_column(table, column).await?;
    if dropped {
        log::info!("Dropped column; table={}, column={}", table, column);
    }
    Ok(DropColumnReport {
        table: migrator.table_ref(table).qualified(),
        column: column.to_string(),
        dropped,
        statements_executed: migrator.statements_executed(),
    })
}
