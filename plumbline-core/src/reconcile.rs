//! Column reconciliation: diff desired columns against catalog descriptors,
//! plan the corrective actions, and apply them.
//!
//! Actions for one column are produced and executed in a fixed order: the
//! type change (or sequence transition), nullability, uniqueness, default.
//! The first failing statement aborts the rest; nothing is rolled back.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{PlumblineError, Result};
use crate::introspect::{self, find_descriptor, ColumnDescriptor};
use crate::migrator::{column_definition, Migrator};
use crate::model::{DefaultValue, DesiredColumn, SchemaModel, TableModel, TableRef};
use crate::naming::NamingStrategy;
use crate::sink::SqlSink;
use crate::statement::Statement;
use crate::types::{sequence_type, types_equivalent};

/// How a managed default is changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefaultChange {
    /// A typed value, rendered as an inline literal.
    Expression { sql: String },
    /// A raw literal or expression, emitted verbatim.
    Literal { sql: String },
    /// `DEFAULT NULL`.
    Null,
}

/// One corrective step for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    AddColumn {
        column: String,
        definition: String,
    },
    ModifyColumnType {
        column: String,
        from: String,
        to: String,
    },
    ModifyNullability {
        column: String,
        nullable: bool,
    },
    CreateSequence {
        column: String,
        sequence: String,
        numeric_type: String,
    },
    RetypeSequence {
        column: String,
        numeric_type: String,
    },
    DeleteSequence {
        column: String,
        fallback_type: String,
    },
    AddUniqueConstraint {
        column: String,
        index_name: String,
    },
    ModifyDefault {
        column: String,
        change: DefaultChange,
    },
}

impl Action {
    pub fn column(&self) -> &str {
        match self {
            Action::AddColumn { column, .. }
            | Action::ModifyColumnType { column, .. }
            | Action::ModifyNullability { column, .. }
            | Action::CreateSequence { column, .. }
            | Action::RetypeSequence { column, .. }
            | Action::DeleteSequence { column, .. }
            | Action::AddUniqueConstraint { column, .. }
            | Action::ModifyDefault { column, .. } => column,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::AddColumn { column, definition } => {
                write!(f, "add column {} {}", column, definition)
            }
            Action::ModifyColumnType { column, from, to } => {
                write!(f, "change type of {}: {} -> {}", column, from, to)
            }
            Action::ModifyNullability { column, nullable } => write!(
                f,
                "set {} {}",
                column,
                if *nullable { "NULL" } else { "NOT NULL" }
            ),
            Action::CreateSequence {
                column,
                sequence,
                numeric_type,
            } => write!(
                f,
                "create sequence {} as {} for {}",
                sequence, numeric_type, column
            ),
            Action::RetypeSequence {
                column,
                numeric_type,
            } => write!(f, "retype sequence of {} to {}", column, numeric_type),
            Action::DeleteSequence {
                column,
                fallback_type,
            } => write!(
                f,
                "drop sequence of {} and retype to {}",
                column, fallback_type
            ),
            Action::AddUniqueConstraint { column, index_name } => {
                write!(f, "add unique constraint {} on {}", index_name, column)
            }
            Action::ModifyDefault { column, change } => match change {
                DefaultChange::Expression { sql } | DefaultChange::Literal { sql } => {
                    write!(f, "set default of {} to {}", column, sql)
                }
                DefaultChange::Null => write!(f, "set default of {} to NULL", column),
            },
        }
    }
}

/// Actions planned for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnPlan {
    pub table: String,
    pub column: String,
    pub actions: Vec<Action>,
}

impl ColumnPlan {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Dry-run result for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub table: String,
    /// The table is absent and would be created with every model column.
    pub create_table: bool,
    /// Column plans with at least one action.
    pub columns: Vec<ColumnPlan>,
    /// Columns present in the backend but not in the model. Never dropped automatically.
    pub orphans: Vec<String>,
}

impl TablePlan {
    pub fn action_count(&self) -> usize {
        self.columns.iter().map(|c| c.actions.len()).sum()
    }

    pub fn is_noop(&self) -> bool {
        !self.create_table && self.columns.is_empty()
    }
}

/// Outcome of one reconciliation pass over a table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub created: bool,
    /// Column plans that were applied.
    pub columns: Vec<ColumnPlan>,
    pub orphans: Vec<String>,
    pub statements_executed: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Type change or sequence transition for a present column.
///
/// Auto-increment transitions are evaluated even when the type strings are
/// already equivalent.
pub fn type_actions(
    table: &TableRef,
    desired: &DesiredColumn,
    descriptor: &ColumnDescriptor,
    naming: &NamingStrategy,
) -> Vec<Action> {
    let column = desired.name.clone();
    let native = &descriptor.native_type;

    match (desired.auto_increment, descriptor.is_auto_increment) {
        (true, true) => {
            // NUMBER covers every integer width; compare the precise type instead
            let numeric_type = sequence_type(&desired.logical_type);
            let current = descriptor.column_type.as_deref().unwrap_or(native);
            if types_equivalent(current, &numeric_type) {
                vec![]
            } else {
                vec![Action::RetypeSequence {
                    column,
                    numeric_type,
                }]
            }
        }
        (true, false) => {
            let numeric_type = sequence_type(&desired.logical_type);
            let sequence = table.qualify(&naming.sequence_name(&table.name, &desired.name));
            let mut actions = vec![Action::CreateSequence {
                column: column.clone(),
                sequence,
                numeric_type: numeric_type.clone(),
            }];
            if !types_equivalent(native, &numeric_type) {
                actions.push(Action::ModifyColumnType {
                    column,
                    from: native.clone(),
                    to: numeric_type,
                });
            }
            actions
        }
        (false, true) => vec![Action::DeleteSequence {
            column,
            fallback_type: desired.logical_type.clone(),
        }],
        (false, false) => {
            if types_equivalent(native, &desired.logical_type) {
                vec![]
            } else {
                vec![Action::ModifyColumnType {
                    column,
                    from: native.clone(),
                    to: desired.logical_type.clone(),
                }]
            }
        }
    }
}

/// Nullability change. Primary key columns are left alone.
pub fn nullability_action(
    desired: &DesiredColumn,
    descriptor: &ColumnDescriptor,
) -> Option<Action> {
    if desired.primary_key || descriptor.is_primary_key || desired.nullable == descriptor.nullable
    {
        return None;
    }
    Some(Action::ModifyNullability {
        column: desired.name.clone(),
        nullable: desired.nullable,
    })
}

/// Default change, if the managed default differs from the catalog's.
///
/// Auto-increment columns and unmanaged defaults are skipped.
pub fn default_action(desired: &DesiredColumn, descriptor: &ColumnDescriptor) -> Option<Action> {
    if desired.auto_increment {
        return None;
    }
    let default = desired.default.as_ref()?;
    if matches!(default, DefaultValue::Expr(e) if e.trim().is_empty()) {
        return None;
    }
    if default.comparable() == descriptor.default_expr {
        return None;
    }
    let change = match default {
        DefaultValue::Value(v) => DefaultChange::Expression { sql: v.to_literal() },
        DefaultValue::Expr(e) => DefaultChange::Literal {
            sql: e.trim().to_string(),
        },
        DefaultValue::Null => DefaultChange::Null,
    };
    Some(Action::ModifyDefault {
        column: desired.name.clone(),
        change,
    })
}

/// Actions that create a missing column.
pub fn creation_actions(
    table: &TableRef,
    desired: &DesiredColumn,
    naming: &NamingStrategy,
) -> Vec<Action> {
    let mut actions = vec![Action::AddColumn {
        column: desired.name.clone(),
        definition: column_definition(desired),
    }];
    if desired.auto_increment {
        actions.push(Action::CreateSequence {
            column: desired.name.clone(),
            sequence: table.qualify(&naming.sequence_name(&table.name, &desired.name)),
            numeric_type: sequence_type(&desired.logical_type),
        });
    }
    actions
}

fn lookup<'m>(model: &'m TableModel, field: &str) -> Result<&'m DesiredColumn> {
    model
        .lookup_field(field)
        .ok_or_else(|| PlumblineError::FieldLookup {
            table: model.name.clone(),
            field: field.to_string(),
        })
}

impl<'a, S: SqlSink> Migrator<'a, S> {
    /// Classify one column without writing anything.
    pub async fn plan_column<M: SchemaModel + ?Sized>(
        &self,
        model: &M,
        field: &str,
    ) -> Result<ColumnPlan> {
        let model = self.prepare_model(model);
        let desired = lookup(&model, field)?;
        let table = self.table_ref(&model.name);
        let descriptors = introspect::describe_columns(self.sink(), &table).await?;
        self.plan_with(&table, desired, &descriptors).await
    }

    /// Classify one column and apply the resulting actions.
    pub async fn alter_column<M: SchemaModel + ?Sized>(
        &self,
        model: &M,
        field: &str,
    ) -> Result<ColumnPlan> {
        let model = self.prepare_model(model);
        let desired = lookup(&model, field)?;
        let table = self.table_ref(&model.name);
        let descriptors = introspect::describe_columns(self.sink(), &table).await?;
        let plan = self.plan_with(&table, desired, &descriptors).await?;
        self.apply(&table, &plan).await?;
        Ok(plan)
    }

    /// Add a model column with its full definition.
    pub async fn add_column<M: SchemaModel + ?Sized>(&self, model: &M, field: &str) -> Result<()> {
        let model = self.prepare_model(model);
        let desired = lookup(&model, field)?;
        let table = self.table_ref(&model.name);
        let plan = ColumnPlan {
            table: table.qualified(),
            column: desired.name.clone(),
            actions: creation_actions(&table, desired, self.naming()),
        };
        self.apply(&table, &plan).await
    }

    /// Plan the whole table without writing anything.
    pub async fn plan_table<M: SchemaModel + ?Sized>(&self, model: &M) -> Result<TablePlan> {
        let model = self.prepare_model(model);
        let table = self.table_ref(&model.name);

        if !introspect::has_table(self.sink(), &table).await? {
            return Ok(TablePlan {
                table: table.qualified(),
                create_table: true,
                columns: self.creation_plans(&table, &model),
                orphans: Vec::new(),
            });
        }

        let descriptors = introspect::describe_columns(self.sink(), &table).await?;
        let mut columns = Vec::new();
        for desired in &model.columns {
            let plan = self.plan_with(&table, desired, &descriptors).await?;
            if !plan.is_noop() {
                columns.push(plan);
            }
        }
        let plan = TablePlan {
            table: table.qualified(),
            create_table: false,
            columns,
            orphans: orphans(&model, &descriptors),
        };
        log::debug!(
            "Planned table; table={}, actions={}, orphans={}",
            plan.table,
            plan.action_count(),
            plan.orphans.len()
        );
        Ok(plan)
    }

    /// One reconciliation pass: create the table if absent, otherwise
    /// describe it once and bring every model column in line.
    ///
    /// Orphan columns are reported, never dropped.
    pub async fn auto_migrate<M: SchemaModel + ?Sized>(&self, model: &M) -> Result<TableReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let before = self.statements_executed();

        let model = self.prepare_model(model);
        let table = self.table_ref(&model.name);

        let (created, columns, orphans) = if introspect::has_table(self.sink(), &table).await? {
            let descriptors = introspect::describe_columns(self.sink(), &table).await?;
            let mut applied = Vec::new();
            for desired in &model.columns {
                let plan = self.plan_with(&table, desired, &descriptors).await?;
                if plan.is_noop() {
                    continue;
                }
                self.apply(&table, &plan).await?;
                applied.push(plan);
            }
            (false, applied, orphans(&model, &descriptors))
        } else {
            self.create_table(&model).await?;
            (true, self.creation_plans(&table, &model), Vec::new())
        };

        for orphan in &orphans {
            log::warn!(
                "Column not in model, leaving it in place; table={}, column={}",
                table,
                orphan
            );
        }

        let report = TableReport {
            table: table.qualified(),
            created,
            columns,
            orphans,
            statements_executed: self.statements_executed() - before,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        log::info!(
            "Reconciled table; table={}, created={}, columns_changed={}, statements={}",
            report.table,
            report.created,
            report.columns.len(),
            report.statements_executed
        );
        Ok(report)
    }

    fn creation_plans(&self, table: &TableRef, model: &TableModel) -> Vec<ColumnPlan> {
        model
            .columns
            .iter()
            .map(|c| ColumnPlan {
                table: table.qualified(),
                column: c.name.clone(),
                actions: creation_actions(table, c, self.naming()),
            })
            .collect()
    }

    async fn plan_with(
        &self,
        table: &TableRef,
        desired: &DesiredColumn,
        descriptors: &[ColumnDescriptor],
    ) -> Result<ColumnPlan> {
        let actions = match find_descriptor(descriptors, &desired.name) {
            None => creation_actions(table, desired, self.naming()),
            Some(descriptor) => self.classify(table, desired, descriptor).await?,
        };
        Ok(ColumnPlan {
            table: table.qualified(),
            column: desired.name.clone(),
            actions,
        })
    }

    async fn classify(
        &self,
        table: &TableRef,
        desired: &DesiredColumn,
        descriptor: &ColumnDescriptor,
    ) -> Result<Vec<Action>> {
        let mut actions = type_actions(table, desired, descriptor, self.naming());
        actions.extend(nullability_action(desired, descriptor));

        if desired.unique && !descriptor.is_unique && !descriptor.is_primary_key {
            let index_name = self.naming().index_name(&table.name, &desired.name);
            if introspect::has_index(self.sink(), table, &index_name).await? {
                log::debug!(
                    "Unique index already present; table={}, index={}",
                    table,
                    index_name
                );
            } else {
                actions.push(Action::AddUniqueConstraint {
                    column: desired.name.clone(),
                    index_name,
                });
            }
        }

        actions.extend(default_action(desired, descriptor));
        Ok(actions)
    }

    async fn apply(&self, table: &TableRef, plan: &ColumnPlan) -> Result<()> {
        for action in &plan.actions {
            self.apply_action(table, action).await?;
        }
        Ok(())
    }

    async fn apply_action(&self, table: &TableRef, action: &Action) -> Result<()> {
        match action {
            Action::AddColumn { column, definition } => {
                self.exec(
                    Statement::new("ALTER TABLE ? ADD ? ?")
                        .table(table.qualified())
                        .column(column.as_str())
                        .raw(definition.as_str()),
                )
                .await
            }
            Action::ModifyColumnType { column, to, .. } => {
                self.exec(
                    Statement::new("ALTER TABLE ? MODIFY ? ?")
                        .table(table.qualified())
                        .column(column.as_str())
                        .raw(to.as_str()),
                )
                .await
            }
            Action::ModifyNullability { column, nullable } => {
                let template = if *nullable {
                    "ALTER TABLE ? MODIFY ? NULL"
                } else {
                    "ALTER TABLE ? MODIFY ? NOT NULL"
                };
                self.exec(
                    Statement::new(template)
                        .table(table.qualified())
                        .column(column.as_str()),
                )
                .await
            }
            Action::CreateSequence {
                column,
                numeric_type,
                ..
            } => self
                .create_sequence(table, column, numeric_type)
                .await
                .map(|_| ()),
            Action::RetypeSequence {
                column,
                numeric_type,
            } => self
                .update_sequence(table, column, numeric_type)
                .await
                .map(|_| ()),
            Action::DeleteSequence {
                column,
                fallback_type,
            } => self
                .delete_sequence(table, column, fallback_type)
                .await
                .map(|_| ()),
            Action::AddUniqueConstraint { column, index_name } => {
                self.exec(
                    Statement::new("ALTER TABLE ? ADD CONSTRAINT ? UNIQUE(?) ENABLE")
                        .table(table.qualified())
                        .column(index_name.as_str())
                        .column(column.as_str()),
                )
                .await
            }
            Action::ModifyDefault { column, change } => {
                let stmt = match change {
                    DefaultChange::Expression { sql } | DefaultChange::Literal { sql } => {
                        Statement::new("ALTER TABLE ? MODIFY (? DEFAULT ?)")
                            .table(table.qualified())
                            .column(column.as_str())
                            .raw(sql.as_str())
                    }
                    DefaultChange::Null => Statement::new("ALTER TABLE ? MODIFY (? DEFAULT NULL)")
                        .table(table.qualified())
                        .column(column.as_str()),
                };
                self.exec(stmt).await
            }
        }
    }
}

fn orphans(model: &TableModel, descriptors: &[ColumnDescriptor]) -> Vec<String> {
    descriptors
        .iter()
        .filter(|d| model.lookup_field(&d.name).is_none())
        .map(|d| d.name.clone())
        .collect()
}
