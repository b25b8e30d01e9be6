//! The `Migrator`: DDL execution, existence checks, and table-level operations.
//!
//! Column reconciliation lives in [`crate::reconcile`] and sequence handling in
//! [`crate::identity`]; both extend `Migrator` with further methods.

use std::cell::Cell;

use crate::error::{PlumblineError, Result};
use crate::introspect::{self, ColumnDescriptor};
use crate::model::{DefaultValue, DesiredColumn, SchemaModel, TableModel, TableRef};
use crate::naming::NamingStrategy;
use crate::reserved::{is_reserved_word, quotify};
use crate::sink::{SqlSink, StatementCache};
use crate::statement::{is_quoted, render_ident, Statement};
use crate::types::sequence_type;

/// Executes structural changes for one backend connection.
///
/// Every statement is awaited before the next is issued. After each
/// successful DDL statement the injected [`StatementCache`] is reset.
pub struct Migrator<'a, S> {
    sink: &'a S,
    cache: &'a dyn StatementCache,
    naming: NamingStrategy,
    default_schema: Option<String>,
    quote_reserved: bool,
    executed: Cell<usize>,
}

impl<'a, S: SqlSink> Migrator<'a, S> {
    pub fn new(sink: &'a S, cache: &'a dyn StatementCache) -> Self {
        Self {
            sink,
            cache,
            naming: NamingStrategy::default(),
            default_schema: None,
            quote_reserved: true,
            executed: Cell::new(0),
        }
    }

    pub fn with_naming(mut self, naming: NamingStrategy) -> Self {
        self.naming = naming;
        self
    }

    /// Schema for unqualified table names. `None` uses the session's current schema.
    pub fn with_default_schema(mut self, schema: Option<String>) -> Self {
        self.default_schema = schema;
        self
    }

    pub fn quote_reserved_words(mut self, enabled: bool) -> Self {
        self.quote_reserved = enabled;
        self
    }

    pub fn sink(&self) -> &S {
        self.sink
    }

    pub fn naming(&self) -> &NamingStrategy {
        &self.naming
    }

    /// DDL statements executed successfully so far.
    pub fn statements_executed(&self) -> usize {
        self.executed.get()
    }

    pub fn table_ref(&self, name: &str) -> TableRef {
        TableRef::parse(name, self.default_schema.as_deref())
    }

    /// Owned copy of `model` with reserved column names quoted, if enabled.
    pub(crate) fn prepare_model<M: SchemaModel + ?Sized>(&self, model: &M) -> TableModel {
        let mut prepared = TableModel::from_model(model);
        if self.quote_reserved {
            quotify(&mut prepared);
        }
        prepared
    }

    /// Column name as it appears in DDL.
    pub(crate) fn column_ident(&self, name: &str) -> String {
        if self.quote_reserved && !is_quoted(name) && is_reserved_word(name) {
            format!("\"{}\"", name)
        } else {
            name.to_string()
        }
    }

    /// Execute one DDL statement, then reset the statement cache.
    pub(crate) async fn exec(&self, stmt: Statement) -> Result<()> {
        let sql = stmt.to_inline_sql();
        log::info!("Executing DDL; sql={}", sql);
        self.sink
            .execute(&stmt)
            .await
            .map_err(|e| PlumblineError::ddl(&sql, e))?;
        self.executed.set(self.executed.get() + 1);
        self.cache.reset();
        Ok(())
    }

    // ── Existence checks ──

    pub async fn has_table(&self, table: &str) -> Result<bool> {
        introspect::has_table(self.sink, &self.table_ref(table)).await
    }

    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        introspect::has_column(self.sink, &self.table_ref(table), column).await
    }

    pub async fn has_index(&self, table: &str, index: &str) -> Result<bool> {
        introspect::has_index(self.sink, &self.table_ref(table), index).await
    }

    pub async fn has_constraint(&self, table: &str, constraint: &str) -> Result<bool> {
        introspect::has_constraint(self.sink, &self.table_ref(table), constraint).await
    }

    pub async fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        introspect::describe_columns(self.sink, &self.table_ref(table)).await
    }

    pub async fn current_database(&self) -> Result<String> {
        introspect::current_database(self.sink).await
    }

    // ── Table operations ──

    /// Create the table with every model column, then a sequence for each
    /// auto-increment column.
    pub async fn create_table<M: SchemaModel + ?Sized>(&self, model: &M) -> Result<()> {
        let model = self.prepare_model(model);
        let table = self.table_ref(&model.name);

        let mut parts: Vec<String> = model
            .columns
            .iter()
            .map(|c| format!("{} {}", render_ident(&c.name), column_definition(c)))
            .collect();
        let keys: Vec<String> = model
            .primary_key_columns()
            .iter()
            .map(|c| render_ident(&c.name))
            .collect();
        if !keys.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
        }

        self.exec(
            Statement::new("CREATE TABLE ? (?)")
                .table(table.qualified())
                .raw(parts.join(", ")),
        )
        .await?;

        for column in model.columns.iter().filter(|c| c.auto_increment) {
            self.create_sequence(&table, &column.name, &sequence_type(&column.logical_type))
                .await?;
        }
        Ok(())
    }

    /// Drop the table and its constraints. Returns `false` when it did not exist.
    pub async fn drop_table(&self, table: &str) -> Result<bool> {
        if !self.has_table(table).await? {
            log::debug!("Table absent, nothing to drop; table={}", table);
            return Ok(false);
        }
        let table = self.table_ref(table);
        self.exec(Statement::new("DROP TABLE ? CASCADE CONSTRAINTS").table(table.qualified()))
            .await?;
        Ok(true)
    }

    /// Rename a table within its schema. Returns `false` when it did not exist.
    pub async fn rename_table(&self, old: &str, new: &str) -> Result<bool> {
        if !self.has_table(old).await? {
            log::debug!("Table absent, nothing to rename; table={}", old);
            return Ok(false);
        }
        let old = self.table_ref(old);
        let new = TableRef::parse(new, None);
        self.exec(
            Statement::new("ALTER TABLE ? RENAME TO ?")
                .table(old.qualified())
                .column(new.name),
        )
        .await?;
        Ok(true)
    }

    pub async fn drop_index(&self, table: &str, index: &str) -> Result<()> {
        let table = self.table_ref(table);
        self.exec(Statement::new("DROP INDEX ?").table(table.qualify(index)))
            .await
    }

    pub async fn drop_constraint(&self, table: &str, constraint: &str) -> Result<()> {
        let table = self.table_ref(table);
        self.exec(
            Statement::new("ALTER TABLE ? DROP CONSTRAINT ?")
                .table(table.qualified())
                .column(constraint),
        )
        .await
    }

    /// Drop a column and the sequence behind it, if any.
    ///
    /// Returns `false` when the column did not exist.
    pub async fn drop_column(&self, table: &str, column: &str) -> Result<bool> {
        if !self.has_column(table, column).await? {
            log::debug!(
                "Column absent, nothing to drop; table={}, column={}",
                table,
                column
            );
            return Ok(false);
        }
        let table = self.table_ref(table);
        let column = self.column_ident(column);
        let sequence = self.column_sequence(&table, &column).await?;

        self.exec(
            Statement::new("ALTER TABLE ? DROP COLUMN ?")
                .table(table.qualified())
                .column(column.as_str()),
        )
        .await?;

        if let Some(sequence) = sequence {
            self.exec(Statement::new("DROP SEQUENCE IF EXISTS ?").table(sequence))
                .await?;
        }
        Ok(true)
    }

    pub async fn rename_column(&self, table: &str, old: &str, new: &str) -> Result<()> {
        Err(PlumblineError::Unsupported {
            operation: format!("rename column {}.{} to {}", table, old, new),
        })
    }

    pub async fn rename_index(&self, table: &str, old: &str, new: &str) -> Result<()> {
        Err(PlumblineError::Unsupported {
            operation: format!("rename index {} on {} to {}", old, table, new),
        })
    }
}

/// Column definition used by `CREATE TABLE` and `ALTER TABLE ... ADD`.
///
/// Auto-increment columns take their sequence type and no literal default;
/// the sequence default is attached afterwards.
pub fn column_definition(column: &DesiredColumn) -> String {
    let mut def = if column.auto_increment {
        sequence_type(&column.logical_type)
    } else {
        column.logical_type.clone()
    };
    if !column.auto_increment {
        match &column.default {
            Some(DefaultValue::Null) | None => {}
            Some(default) => {
                def.push_str(" DEFAULT ");
                def.push_str(&default.to_sql());
            }
        }
    }
    if !column.nullable {
        def.push_str(" NOT NULL");
    }
    if column.unique && !column.primary_key {
        def.push_str(" UNIQUE");
    }
    def
}
