//! Collaborator interfaces: the SQL execution sink and the statement cache.

use crate::error::Result;
use crate::statement::{Row, Statement};

/// Executes parameterized statements against the backend.
///
/// Implementations own connection handling. The core never retries; each
/// statement is attempted exactly once and errors are returned as-is.
#[allow(async_fn_in_trait)]
pub trait SqlSink {
    /// Run a row-producing statement (catalog queries).
    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>>;

    /// Run a statement that produces no rows (DDL). Returns affected rows.
    async fn execute(&self, stmt: &Statement) -> Result<u64>;

    /// Run a single-value `COUNT(*)`-style query. A missing row counts as zero.
    async fn scalar_count(&self, stmt: &Statement) -> Result<i64> {
        let rows = self.query(stmt).await?;
        Ok(rows.first().and_then(|r| r.get_i64(0)).unwrap_or(0))
    }
}

/// Prepared-statement state keyed to the schema shape.
///
/// Reset after every successful DDL so cached plans never reference stale
/// column shapes.
pub trait StatementCache {
    fn reset(&self);
}

/// Cache that holds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl StatementCache for NoopCache {
    fn reset(&self) {}
}
