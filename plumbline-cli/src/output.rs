//! Terminal output formatting for all plumbline commands.
//! Uses comfy-table for tabular output and colored for terminal styling.

use colored::Colorize;
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, ContentArrangement, Table};
use serde::Serialize;

use plumbline_core::reconcile::{Action, ColumnPlan};
use plumbline_core::{DescribeReport, DropColumnReport, MigrateReport, PlanReport};

/// Print any report as pretty JSON.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to serialize report; error={}", e),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.into_iter().map(Cell::new).collect::<Vec<_>>());
    table
}

fn yes(flag: bool) -> String {
    if flag {
        "yes".green().to_string()
    } else {
        String::new()
    }
}

/// Format column descriptors as a table.
pub fn print_describe_report(report: &DescribeReport) {
    if !report.exists {
        println!(
            "{}",
            format!("Table {} does not exist.", report.table).yellow()
        );
        return;
    }

    println!("{}", format!("Table {}", report.table).bold());
    let mut table = new_table(vec![
        "Column", "Type", "Nullable", "Default", "PK", "Unique", "Auto Inc",
    ]);
    for column in &report.columns {
        let ty = column
            .column_type
            .as_deref()
            .unwrap_or(&column.native_type)
            .to_string();
        table.add_row(vec![
            Cell::new(&column.name),
            Cell::new(ty),
            Cell::new(if column.nullable { "yes" } else { "no" }),
            Cell::new(column.default_expr.as_deref().unwrap_or("")),
            Cell::new(yes(column.is_primary_key)),
            Cell::new(yes(column.is_unique)),
            Cell::new(yes(column.is_auto_increment)),
        ]);
    }
    println!("{table}");
}

fn format_action(action: &Action) -> String {
    match action {
        Action::AddColumn { .. } | Action::CreateSequence { .. } => {
            action.to_string().green().to_string()
        }
        Action::DeleteSequence { .. } => action.to_string().red().to_string(),
        Action::ModifyColumnType { .. } | Action::RetypeSequence { .. } => {
            action.to_string().yellow().to_string()
        }
        _ => action.to_string().cyan().to_string(),
    }
}

fn print_column_plans(plans: &[ColumnPlan]) {
    let mut table = new_table(vec!["Column", "Action"]);
    for plan in plans {
        for action in &plan.actions {
            table.add_row(vec![Cell::new(&plan.column), Cell::new(format_action(action))]);
        }
    }
    println!("{table}");
}

fn print_orphans(table: &str, orphans: &[String]) {
    for orphan in orphans {
        println!(
            "{} {}.{} is not in the model and was left in place",
            "WARNING:".yellow().bold(),
            table,
            orphan
        );
    }
}

/// Print planned actions per table.
pub fn print_plan_report(report: &PlanReport) {
    if report.is_noop() {
        println!("{}", "Schema matches the model. Nothing to do.".green());
        for plan in &report.tables {
            print_orphans(&plan.table, &plan.orphans);
        }
        return;
    }

    for plan in &report.tables {
        if plan.create_table {
            println!(
                "{}",
                format!(
                    "Table {}: create with {} column(s)",
                    plan.table,
                    plan.columns.len()
                )
                .green()
                .bold()
            );
            print_column_plans(&plan.columns);
        } else if !plan.columns.is_empty() {
            println!(
                "{}",
                format!("Table {}: {} action(s)", plan.table, plan.action_count()).bold()
            );
            print_column_plans(&plan.columns);
        }
        print_orphans(&plan.table, &plan.orphans);
    }

    println!(
        "{}",
        format!(
            "{} table(s) to create, {} column action(s) planned",
            report.tables_to_create, report.total_actions
        )
        .dimmed()
    );
}

/// Print a migrate report summary.
pub fn print_migrate_summary(report: &MigrateReport) {
    if report.statements_executed == 0 {
        println!(
            "{}",
            "Schema is up to date. No migration necessary.".green()
        );
        for table in &report.tables {
            print_orphans(&table.table, &table.orphans);
        }
        return;
    }

    println!(
        "{}",
        format!(
            "Successfully executed {} statement(s) across {} table(s) (execution time {}ms)",
            report.statements_executed,
            report.tables.len(),
            report.total_time_ms
        )
        .green()
        .bold()
    );

    for table in &report.tables {
        if table.created {
            println!("  {} created {}", "+".green(), table.table);
            continue;
        }
        for plan in &table.columns {
            for action in &plan.actions {
                println!(
                    "  {} {}: {}",
                    "→".green(),
                    table.table,
                    format_action(action)
                );
            }
        }
        print_orphans(&table.table, &table.orphans);
    }
}

/// Print the outcome of drop-column.
pub fn print_drop_column_result(report: &DropColumnReport) {
    if report.dropped {
        println!(
            "{}",
            format!("Dropped column {}.{}", report.table, report.column)
                .green()
                .bold()
        );
    } else {
        println!(
            "{}",
            format!(
                "Column {}.{} does not exist. Nothing to drop.",
                report.table, report.column
            )
            .yellow()
        );
    }
}
