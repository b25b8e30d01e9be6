//! Emulated identity columns.
//!
//! The backend has no native identity columns, so an auto-increment column
//! is a plain integer column whose default is `nextval('<table>_<column>_seq')`
//! on a sequence owned by that column.

use crate::error::{PlumblineError, Result};
use crate::introspect::{pg_schema_arg, sequence_name_from_default};
use crate::migrator::Migrator;
use crate::model::TableRef;
use crate::sink::SqlSink;
use crate::statement::{bare_ident, Statement};

pub const COLUMN_DEFAULT_QUERY: &str = "SELECT column_default FROM information_schema.columns \
     WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?) \
     AND lower(column_name) = lower(?)";

impl<'a, S: SqlSink> Migrator<'a, S> {
    /// Create the column's sequence, make it the column default, and tie
    /// its lifetime to the column. Returns the sequence name.
    pub async fn create_sequence(
        &self,
        table: &TableRef,
        column: &str,
        numeric_type: &str,
    ) -> Result<String> {
        let sequence = table.qualify(&self.naming().sequence_name(&table.name, column));
        log::debug!(
            "Creating sequence; table={}, column={}, sequence={}, type={}",
            table,
            column,
            sequence,
            numeric_type
        );

        self.exec(
            Statement::new("CREATE SEQUENCE IF NOT EXISTS ? AS ?")
                .table(sequence.as_str())
                .raw(numeric_type),
        )
        .await?;
        self.exec(
            Statement::new("ALTER TABLE ? ALTER COLUMN ? SET DEFAULT nextval('?')")
                .table(table.qualified())
                .column(column)
                .raw(sequence.as_str()),
        )
        .await?;
        self.exec(
            Statement::new("ALTER SEQUENCE ? OWNED BY ?.?")
                .table(sequence.as_str())
                .table(table.qualified())
                .column(column),
        )
        .await?;
        Ok(sequence)
    }

    /// Retype an existing column sequence and its column.
    ///
    /// Fails with [`PlumblineError::SequenceUnresolved`] when the column
    /// default does not name a sequence.
    pub async fn update_sequence(
        &self,
        table: &TableRef,
        column: &str,
        numeric_type: &str,
    ) -> Result<String> {
        let sequence = self.column_sequence(table, column).await?.ok_or_else(|| {
            PlumblineError::SequenceUnresolved {
                table: table.qualified(),
                column: bare_ident(column).to_string(),
            }
        })?;

        self.exec(
            Statement::new("ALTER SEQUENCE IF EXISTS ? AS ?")
                .table(sequence.as_str())
                .raw(numeric_type),
        )
        .await?;
        self.exec(
            Statement::new("ALTER TABLE ? ALTER COLUMN ? TYPE ?")
                .table(table.qualified())
                .column(column)
                .raw(numeric_type),
        )
        .await?;
        Ok(sequence)
    }

    /// Turn an auto-increment column back into a plain column of
    /// `fallback_type` and drop its sequence.
    ///
    /// The steps are not atomic: a failure after the default is dropped
    /// leaves the sequence behind. When the sequence name cannot be
    /// recovered the drop is skipped. Returns the dropped sequence, if any.
    pub async fn delete_sequence(
        &self,
        table: &TableRef,
        column: &str,
        fallback_type: &str,
    ) -> Result<Option<String>> {
        let sequence = self.column_sequence(table, column).await?;

        self.exec(
            Statement::new("ALTER TABLE ? ALTER COLUMN ? TYPE ?")
                .table(table.qualified())
                .column(column)
                .raw(fallback_type),
        )
        .await?;
        self.exec(
            Statement::new("ALTER TABLE ? ALTER COLUMN ? DROP DEFAULT")
                .table(table.qualified())
                .column(column),
        )
        .await?;

        match &sequence {
            Some(name) => {
                self.exec(Statement::new("DROP SEQUENCE IF EXISTS ?").table(name.as_str()))
                    .await?;
            }
            None => log::warn!(
                "Column default names no sequence, skipping sequence drop; table={}, column={}",
                table,
                column
            ),
        }
        Ok(sequence)
    }

    /// Sequence named by the column's current `nextval(...)` default.
    ///
    /// Unqualified names are qualified with the table's schema.
    pub async fn column_sequence(&self, table: &TableRef, column: &str) -> Result<Option<String>> {
        let stmt = Statement::new(COLUMN_DEFAULT_QUERY)
            .arg(pg_schema_arg(table))
            .value(table.bare_name())
            .value(bare_ident(column));
        let rows = self.sink().query(&stmt).await?;
        let default = rows.first().and_then(|r| r.get_string(0));

        Ok(default
            .as_deref()
            .and_then(sequence_name_from_default)
            .map(|name| {
                if name.contains('.') {
                    name
                } else {
                    table.qualify(&name)
                }
            }))
    }
}
