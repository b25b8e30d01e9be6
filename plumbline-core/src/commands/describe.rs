//! Show the introspected shape of one table.

use serde::Serialize;

use crate::config::PlumblineConfig;
use crate::error::Result;
use crate::introspect::{self, ColumnDescriptor};
use crate::sink::{SqlSink, StatementCache};

/// Catalog view of one table.
#[derive(Debug, Serialize)]
pub struct DescribeReport {
    /// Table name as resolved against the configured schema.
    pub table: String,
    pub exists: bool,
    /// Column descriptors in column order; empty when the table is absent.
    pub columns: Vec<ColumnDescriptor>,
}

/// Execute the describe command.
pub async fn execute<S: SqlSink>(
    sink: &S,
    cache: &dyn StatementCache,
    config: &PlumblineConfig,
    table: &str,
) -> Result<DescribeReport> {
    let migrator = super::migrator(sink, cache, config);
    let table = migrator.table_ref(table);

    if !introspect::has_table(sink, &table).await? {
        log::debug!("Table not found; table={}", table);
        return Ok(DescribeReport {
            table: table.qualified(),
            exists: false,
            columns: Vec::new(),
        });
    }

    let columns = introspect::describe_columns(sink, &table).await?;
    Ok(DescribeReport {
        table: table.qualified(),
        exists: true,
        columns,
    })
}
