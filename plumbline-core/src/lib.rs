//! Column-level schema reconciliation for Oracle-compatible databases
//! reached over the PostgreSQL wire protocol.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use plumbline_core::config::{CliOverrides, PlumblineConfig};
//! use plumbline_core::Plumbline;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PlumblineConfig::load(None, &CliOverrides::default())?;
//! let pl = Plumbline::new(config).await?;
//! let report = pl.migrate().await?;
//! println!("Executed {} statements", report.statements_executed);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`config`]: Configuration loading (TOML, env vars, CLI overrides)
//! - [`db`]: Database connections, TLS, the `tokio-postgres` sink
//! - [`sink`]: `SqlSink` and `StatementCache` collaborator traits
//! - [`statement`]: Statement templates, bound values, result rows
//! - [`model`]: Desired tables and columns, model file loading
//! - [`introspect`]: Catalog introspection into column descriptors
//! - [`types`]: Native type aliases and serial type mapping
//! - [`naming`]: Index and sequence naming
//! - [`reserved`]: Reserved-word quoting
//! - [`migrator`]: DDL execution and table-level operations
//! - [`identity`]: Sequence-backed auto-increment columns
//! - [`reconcile`]: Column classification, planning, and `auto_migrate`
//! - [`commands`]: Command implementations used by the CLI
//! - [`error`]: Error types

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod introspect;
pub mod migrator;
pub mod model;
pub mod naming;
pub mod reconcile;
pub mod reserved;
pub mod sink;
pub mod statement;
pub mod types;

use config::PlumblineConfig;
use error::Result;
use tokio_postgres::Client;

pub use commands::describe::DescribeReport;
pub use commands::drop_column::DropColumnReport;
pub use commands::migrate::MigrateReport;
pub use commands::plan::PlanReport;
pub use config::CliOverrides;
pub use db::PgSink;
pub use error::PlumblineError;
pub use introspect::ColumnDescriptor;
pub use migrator::Migrator;
pub use model::{DefaultValue, DesiredColumn, SchemaModel, TableModel};
pub use reconcile::{Action, ColumnPlan, TablePlan, TableReport};
pub use sink::{SqlSink, StatementCache};

/// Main entry point for the Plumbline library.
///
/// Holds one connection and runs commands against the tables declared in
/// the configured model files.
pub struct Plumbline {
    pub config: PlumblineConfig,
    sink: PgSink,
}

impl Plumbline {
    /// Connect using the `[database]` settings.
    ///
    /// If `connect_retries` is configured, retries with exponential backoff.
    pub async fn new(config: PlumblineConfig) -> Result<Self> {
        let conn_string = config.connection_string()?;
        let options = db::ConnectOptions::from(&config.database);
        let client = db::connect(&conn_string, &options).await?;
        Ok(Self::with_client(config, client))
    }

    /// Create a new Plumbline instance with an existing database client.
    pub fn with_client(config: PlumblineConfig, client: Client) -> Self {
        let sink = PgSink::new(client, config.reconcile.prepare_statements);
        Self { config, sink }
    }

    pub fn sink(&self) -> &PgSink {
        &self.sink
    }

    /// A [`Migrator`] over this connection, configured from `[reconcile]`.
    pub fn migrator(&self) -> Migrator<'_, PgSink> {
        commands::migrator(&self.sink, &self.sink, &self.config)
    }

    /// Load the configured model files.
    pub fn load_models(&self) -> Result<Vec<TableModel>> {
        model::load_models(&self.config.reconcile.models)
    }

    /// Describe one table as the catalog reports it.
    pub async fn describe(&self, table: &str) -> Result<DescribeReport> {
        commands::describe::execute(&self.sink, &self.sink, &self.config, table).await
    }

    /// Plan every model table without writing anything.
    pub async fn plan(&self) -> Result<PlanReport> {
        let models = self.load_models()?;
        commands::plan::execute(&self.sink, &self.sink, &self.config, &models).await
    }

    /// Reconcile every model table.
    pub async fn migrate(&self) -> Result<MigrateReport> {
        let models = self.load_models()?;
        let report =
            commands::migrate::execute(&self.sink, &self.sink, &self.config, &models).await?;
        log::debug!(
            "Prepared statements held; count={}",
            self.sink.cached_statements()
        );
        Ok(report)
    }

    /// Drop one column and its sequence, if any.
    pub async fn drop_column(&self, table: &str, column: &str) -> Result<DropColumnReport> {
        commands::drop_column::execute(&self.sink, &self.sink, &self.config, table, column).await
    }
}
