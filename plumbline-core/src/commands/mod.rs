//! Command implementations: describe, plan, migrate, drop-column.

pub mod describe;
pub mod drop_column;
pub mod migrate;
pub mod plan;

use crate::config::PlumblineConfig;
use crate::migrator::Migrator;
use crate::naming::NamingStrategy;
use crate::sink::{SqlSink, StatementCache};

/// Build a [`Migrator`] from the reconcile settings.
pub(crate) fn migrator<'a, S: SqlSink>(
    sink: &'a S,
    cache: &'a dyn StatementCache,
    config: &PlumblineConfig,
) -> Migrator<'a, S> {
    Migrator::new(sink, cache)
        .with_naming(NamingStrategy::new(config.reconcile.identifier_max_length))
        .with_default_schema(config.reconcile.schema.clone())
        .quote_reserved_words(config.reconcile.quote_reserved_words)
}
