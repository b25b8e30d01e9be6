//! Error types for Plumbline operations.

use thiserror::Error;

/// Extract the full error message from a tokio_postgres::Error,
/// including the underlying DbError details that Display hides.
pub fn format_db_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = db_err.message().to_string();
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        return msg;
    }
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    if e.is_closed() {
        msg.push_str("\n  Note: The database connection was closed unexpectedly.");
    }
    msg
}

/// All error types that Plumbline operations can produce.
#[derive(Error, Debug)]
pub enum PlumblineError {
    /// Invalid or missing configuration (TOML parse errors, missing required fields, etc.).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A schema model file could not be read or is invalid.
    #[error("Model error: {0}")]
    ModelError(String),

    /// A database query or connection operation failed.
    #[error("Database error: {}", format_db_error(.0))]
    DatabaseError(#[from] tokio_postgres::Error),

    /// The connection attempt did not complete within the configured timeout.
    #[error("Connection timed out after {0}s")]
    ConnectTimeout(u32),

    /// A catalog read failed while describing a table. No partial result is kept.
    #[error("Introspection failed for table {table}: {reason}")]
    IntrospectionFailed { table: String, reason: String },

    /// A field name could not be resolved against the schema model.
    #[error("failed to look up field with name: {field} (table {table})")]
    FieldLookup { table: String, field: String },

    /// An ALTER/CREATE/DROP statement was rejected by the backend.
    #[error("DDL failed: {reason}\n  Statement: {statement}")]
    DdlFailed { statement: String, reason: String },

    /// The requested structural change has no implementation for this dialect.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// The backing sequence of an auto-increment column could not be recovered
    /// from the column default.
    #[error("Cannot resolve the sequence behind {table}.{column}: column default is not a nextval() call")]
    SequenceUnresolved { table: String, column: String },

    /// A filesystem I/O operation failed (reading model or config files).
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PlumblineError {
    /// Wrap a sink failure raised while reading the catalog for `table`.
    pub fn introspection(table: &str, err: PlumblineError) -> Self {
        match err {
            e @ PlumblineError::IntrospectionFailed { .. } => e,
            other => PlumblineError::IntrospectionFailed {
                table: table.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Wrap a sink failure raised while executing a DDL statement.
    pub fn ddl(statement: &str, err: PlumblineError) -> Self {
        match err {
            e @ PlumblineError::DdlFailed { .. } => e,
            other => PlumblineError::DdlFailed {
                statement: statement.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Convenience type alias for `Result<T, PlumblineError>`.
pub type Result<T> = std::result::Result<T, PlumblineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_introspection_wraps_other_errors() {
        let err = PlumblineError::introspection(
            "users",
            PlumblineError::ConfigError("boom".to_string()),
        );
        match err {
            PlumblineError::IntrospectionFailed { table, reason } => {
                assert_eq!(table, "users");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ddl_keeps_existing_ddl_error() {
        let inner = PlumblineError::DdlFailed {
            statement: "ALTER TABLE a DROP b".to_string(),
            reason: "nope".to_string(),
        };
        let err = PlumblineError::ddl("ignored", inner);
        assert!(err.to_string().contains("ALTER TABLE a DROP b"));
    }

    #[test]
    fn test_field_lookup_message() {
        let err = PlumblineError::FieldLookup {
            table: "users".to_string(),
            field: "emial".to_string(),
        };
        assert!(err
            .to_string()
            .starts_with("failed to look up field with name: emial"));
    }
}
