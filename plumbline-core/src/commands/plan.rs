//! Dry run: classify every model table without writing anything.

use serde::Serialize;

use crate::config::PlumblineConfig;
use crate::error::Result;
use crate::model::TableModel;
use crate::reconcile::TablePlan;
use crate::sink::{SqlSink, StatementCache};

/// Planned actions for every model table.
#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub tables: Vec<TablePlan>,
    /// Number of tables that would be created.
    pub tables_to_create: usize,
    /// Number of column actions across all existing tables.
    pub total_actions: usize,
    /// Number of backend columns missing from the models.
    pub orphan_columns: usize,
}

impl PlanReport {
    pub fn is_noop(&self) -> bool {
        self.tables.iter().all(TablePlan::is_noop)
    }
}

/// Execute the plan command.
pub async fn execute<S: SqlSink>(
    sink: &S,
    cache: &dyn StatementCache,
    config: &PlumblineConfig,
    models: &[TableModel],
) -> Result<PlanReport> {
    let migrator = super::migrator(sink, cache, config);

    let mut tables = Vec::with_capacity(models.len());
    for model in models {
        tables.push(migrator.plan_table(model).await?);
    }

    let report = PlanReport {
        tables_to_create: tables.iter().filter(|t| t.create_table).count(),
        total_actions: tables
            .iter()
            .filter(|t| !t.create_table)
            .map(TablePlan::action_count)
            .sum(),
        orphan_columns: tables.iter().map(|t| t.orphans.len()).sum(),
        tables,
    };
    log::info!(
        "Plan completed; tables={}, tables_to_create={}, total_actions={}",
        report.tables.len(),
        report.tables_to_create,
        report.total_actions
    );
    Ok(report)
}
