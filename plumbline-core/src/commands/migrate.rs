//! Reconcile every model table against the backend.
//!
//! Tables run in model order and the run stops at the first error. Tables
//! reconciled before the failure keep their changes; later tables are not
//! touched, so a rerun after fixing the cause picks up where it stopped.

use std::time::Instant;

use serde::Serialize;

use crate::config::PlumblineConfig;
use crate::error::Result;
use crate::model::TableModel;
use crate::reconcile::TableReport;
use crate::sink::{SqlSink, StatementCache};

/// Report returned after a migrate operation.
#[derive(Debug, Serialize)]
pub struct MigrateReport {
    /// Per-table outcome, in model order.
    pub tables: Vec<TableReport>,
    pub tables_created: usize,
    /// Columns that needed at least one action.
    pub columns_changed: usize,
    pub statements_executed: usize,
    /// Total execution time in milliseconds.
    pub total_time_ms: u64,
}

/// Execute the migrate command.
///
/// Tables are reconciled one after another; the first failure stops the
/// run, leaving earlier tables migrated.
pub async fn execute<S: SqlSink>(
    sink: &S,
    cache: &dyn StatementCache,
    config: &PlumblineConfig,
    models: &[TableModel],
) -> Result<MigrateReport> {
    let start = Instant::now();
    let migrator = super::migrator(sink, cache, config);

    let mut tables = Vec::with_capacity(models.len());
    for model in models {
        match migrator.auto_migrate(model).await {
            Ok(report) => tables.push(report),
            Err(e) => {
                log::error!("Migrate failed; table={}, reason={}", model.name, e);
                return Err(e);
            }
        }
    }

    let report = MigrateReport {
        tables_created: tables.iter().filter(|t| t.created).count(),
        columns_changed: tables
            .iter()
            .filter(|t| !t.created)
            .map(|t| t.columns.len())
            .sum(),
        statements_executed: migrator.statements_executed(),
        total_time_ms: start.elapsed().as_millis() as u64,
        tables,
    };
    log::info!(
        "Migrate completed; tables={}, tables_created={}, columns_changed={}, statements={}, total_time_ms={}",
        report.tables.len(),
        report.tables_created,
        report.columns_changed,
        report.statements_executed,
        report.total_time_ms
    );
    Ok(report)
}
