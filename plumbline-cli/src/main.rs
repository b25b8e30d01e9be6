//! CLI entry point for the plumbline schema reconciliation tool.
//! Provides clap-based command routing and exit code mapping based on
//! error type.

mod output;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use colored::Colorize;

use plumbline_core::config::{CliOverrides, PlumblineConfig};
use plumbline_core::error::PlumblineError;
use plumbline_core::Plumbline;

/// Top-level CLI definition with global flags and subcommand dispatch.
#[derive(Parser)]
#[command(
    name = "plumbline",
    about = "Column-level schema reconciliation for Oracle-compatible databases",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Database URL (overrides config)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Schema for unqualified table names (overrides config)
    #[arg(long, value_name = "SCHEMA")]
    schema: Option<String>,

    /// Model file; repeat for several (overrides config)
    #[arg(short, long = "model", value_name = "PATH")]
    models: Vec<PathBuf>,

    /// Number of retries when connecting to the database
    #[arg(long, value_name = "N")]
    connect_retries: Option<u32>,

    /// SSL/TLS mode: disable, prefer, require
    #[arg(long, value_name = "MODE")]
    ssl_mode: Option<String>,

    /// Connection timeout in seconds (default: 30, 0 = no timeout)
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u32>,

    /// Statement timeout in seconds (default: 0 = no limit)
    #[arg(long, value_name = "SECS")]
    statement_timeout: Option<u32>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable verbose/debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a table's columns as the catalog reports them
    Describe {
        /// Table name, optionally schema-qualified
        table: String,
    },

    /// Show the actions a migrate would take, without changing anything
    Plan,

    /// Reconcile every model table against the database
    Migrate,

    /// Drop a column and the sequence behind it
    DropColumn {
        /// Table name, optionally schema-qualified
        table: String,
        column: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging (suppress when JSON output is requested)
    let filter = if cli.json {
        "error"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or(filter))
        .format_target(false)
        .format_timestamp(None)
        .init();

    if let Err(e) = run(cli).await {
        print_error(&e);
        process::exit(exit_code(&e));
    }
}

fn exit_code(error: &PlumblineError) -> i32 {
    match error {
        PlumblineError::ConfigError(_) => 2,
        PlumblineError::ModelError(_) => 3,
        PlumblineError::DatabaseError(_) => 4,
        PlumblineError::ConnectTimeout(_) => 4,
        PlumblineError::IntrospectionFailed { .. } => 4,
        PlumblineError::DdlFailed { .. } => 5,
        PlumblineError::SequenceUnresolved { .. } => 5,
        PlumblineError::Unsupported { .. } => 6,
        PlumblineError::FieldLookup { .. } => 7,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<(), PlumblineError> {
    let json_output = cli.json;

    let overrides = CliOverrides {
        url: cli.url,
        schema: cli.schema,
        models: if cli.models.is_empty() {
            None
        } else {
            Some(cli.models)
        },
        connect_retries: cli.connect_retries,
        ssl_mode: cli.ssl_mode,
        connect_timeout: cli.connect_timeout,
        statement_timeout: cli.statement_timeout,
        keepalive: None,
    };

    let config = PlumblineConfig::load(cli.config.as_deref(), &overrides)?;

    // Load models before connecting so model errors surface without a database
    if matches!(cli.command, Commands::Plan | Commands::Migrate) {
        plumbline_core::model::load_models(&config.reconcile.models)?;
    }

    let pl = Plumbline::new(config).await?;

    match &cli.command {
        Commands::Describe { table } => {
            let report = pl.describe(table).await?;
            if json_output {
                output::print_json(&report);
            } else {
                output::print_describe_report(&report);
            }
        }
        Commands::Plan => {
            let report = pl.plan().await?;
            if json_output {
                output::print_json(&report);
            } else {
                output::print_plan_report(&report);
            }
        }
        Commands::Migrate => {
            let report = pl.migrate().await?;
            if json_output {
                output::print_json(&report);
            } else {
                output::print_migrate_summary(&report);
            }
        }
        Commands::DropColumn { table, column } => {
            let report = pl.drop_column(table, column).await?;
            if json_output {
                output::print_json(&report);
            } else {
                output::print_drop_column_result(&report);
            }
        }
    }

    Ok(())
}

fn print_error(error: &PlumblineError) {
    eprintln!("{} {}", "ERROR:".red().bold(), error);

    // Provide actionable guidance
    match error {
        PlumblineError::ConfigError(_) => {
            eprintln!(
                "{}",
                "Hint: Check your plumbline.toml or set PLUMBLINE_DATABASE_URL environment variable."
                    .dimmed()
            );
        }
        PlumblineError::ModelError(_) => {
            eprintln!(
                "{}",
                "Hint: Check the [reconcile] models paths and the [[tables]] entries in each model file."
                    .dimmed()
            );
        }
        PlumblineError::DatabaseError(_) | PlumblineError::ConnectTimeout(_) => {
            eprintln!(
                "{}",
                "Hint: Verify database is running and connection details are correct.".dimmed()
            );
        }
        PlumblineError::IntrospectionFailed { .. } => {
            eprintln!(
                "{}",
                "Hint: The connected user needs read access to ALL_TAB_COLUMNS, ALL_CONSTRAINTS and pg_attribute."
                    .dimmed()
            );
        }
        PlumblineError::DdlFailed { .. } => {
            eprintln!(
                "{}",
                "Hint: Statements before the failing one were applied. Run 'plumbline plan' to see what remains."
                    .dimmed()
            );
        }
        PlumblineError::SequenceUnresolved { .. } => {
            eprintln!(
                "{}",
                "Hint: The column default must be nextval('<sequence>'::regclass). Fix it by hand, then rerun."
                    .dimmed()
            );
        }
        PlumblineError::FieldLookup { .. } => {
            eprintln!(
                "{}",
                "Hint: Field names must match a column declared in the model file.".dimmed()
            );
        }
        _ => {}
    }
}
