//! Catalog introspection: column descriptors, default normalization, and
//! existence checks.
//!
//! Column shape comes from the Oracle views (`ALL_TAB_COLUMNS`,
//! `ALL_CONSTRAINTS`); precise type names come from `pg_attribute` through
//! `format_type`. Every call reads the catalog again; nothing is cached.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

use crate::error::{PlumblineError, Result};
use crate::model::TableRef;
use crate::sink::SqlSink;
use crate::statement::{bare_ident, Arg, Row, Statement};

/// Schema expression used by the Oracle views when no schema is given.
pub const ORACLE_CURRENT_SCHEMA: &str = "sys_context('userenv', 'current_schema')";

/// Schema expression used by the PostgreSQL catalogs when no schema is given.
pub const PG_CURRENT_SCHEMA: &str = "current_schema()";

pub const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME, NULLABLE, DATA_TYPE, \
     CAST(DATA_LENGTH AS INTEGER), CAST(DATA_PRECISION AS INTEGER), CAST(DATA_SCALE AS INTEGER), \
     DATA_DEFAULT FROM ALL_TAB_COLUMNS \
     WHERE UPPER(OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?) ORDER BY COLUMN_ID";

pub const CONSTRAINTS_QUERY: &str = "SELECT COLUMN_NAME, CONSTRAINT_NAME, CONSTRAINT_TYPE \
     FROM ALL_CONSTRAINTS NATURAL JOIN ALL_CONS_COLUMNS \
     WHERE UPPER(OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?)";

pub const TYPES_QUERY: &str = "SELECT a.attname, format_type(a.atttypid, a.atttypmod) \
     FROM pg_attribute a \
     JOIN pg_class c ON c.oid = a.attrelid \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE lower(n.nspname) = lower(?) AND lower(c.relname) = lower(?) \
     AND a.attnum > 0 AND NOT a.attisdropped";

pub const HAS_TABLE_QUERY: &str = "SELECT CAST(COUNT(*) AS INTEGER) FROM ALL_TABLES \
     WHERE UPPER(OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?)";

pub const HAS_COLUMN_QUERY: &str = "SELECT CAST(COUNT(*) AS INTEGER) FROM ALL_TAB_COLUMNS \
     WHERE UPPER(OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?) AND UPPER(COLUMN_NAME) = UPPER(?)";

pub const HAS_INDEX_QUERY: &str = "SELECT CAST(COUNT(*) AS INTEGER) FROM ALL_INDEXES \
     WHERE UPPER(TABLE_OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?) AND UPPER(INDEX_NAME) = UPPER(?)";

pub const HAS_CONSTRAINT_QUERY: &str = "SELECT CAST(COUNT(*) AS INTEGER) FROM ALL_CONSTRAINTS \
     WHERE UPPER(OWNER) = UPPER(?) AND UPPER(TABLE_NAME) = UPPER(?) AND UPPER(CONSTRAINT_NAME) = UPPER(?)";

pub const CURRENT_DATABASE_QUERY: &str = "SELECT ORA_DATABASE_NAME FROM DUAL";

pub const CURRENT_SCHEMA_QUERY: &str = "SELECT sys_context('userenv', 'current_schema') FROM DUAL";

const SEQUENCE_DEFAULT_PREFIX: &str = "nextval('";
const SEQUENCE_DEFAULT_SUFFIX: &str = "seq'::regclass)";
const REGCLASS_SUFFIX: &str = "'::regclass)";

/// Trailing `::type` cast, with optional quotes around the value.
static CAST_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'?(.*)\b'?:+[\w\s]+$").unwrap());

/// Shape of one existing column as the catalog reports it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub nullable: bool,
    /// `DATA_TYPE` from the catalog; array types are replaced by their precise name.
    pub native_type: String,
    /// `format_type()` output, when the PostgreSQL catalog knows the column.
    pub column_type: Option<String>,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    /// Normalized default; `None` for sequence defaults and literal `NULL`.
    pub default_expr: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    pub is_auto_increment: bool,
}

impl ColumnDescriptor {
    /// Whether `name` refers to this column (quotes ignored, ASCII case-insensitive).
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(bare_ident(name))
    }

    fn from_row(row: &Row) -> Option<Self> {
        let name = row.get_string(0)?;
        let (default_expr, is_auto_increment) = normalize_column_default(row.get(6).as_str());
        Some(Self {
            name,
            nullable: row.get_string(1).as_deref() == Some("Y"),
            native_type: row.get_string(2).unwrap_or_default(),
            column_type: None,
            length: row.get_i64(3),
            precision: row.get_i64(4),
            scale: row.get_i64(5),
            default_expr,
            is_primary_key: false,
            is_unique: false,
            is_auto_increment,
        })
    }
}

/// Find the descriptor for `name`.
pub fn find_descriptor<'a>(
    descriptors: &'a [ColumnDescriptor],
    name: &str,
) -> Option<&'a ColumnDescriptor> {
    descriptors.iter().find(|d| d.matches(name))
}

/// Whether a column default is a sequence-backed `nextval(...)` call.
pub fn is_sequence_default(default: &str) -> bool {
    let default = default.trim();
    default.starts_with(SEQUENCE_DEFAULT_PREFIX) && default.ends_with(SEQUENCE_DEFAULT_SUFFIX)
}

/// Recover the sequence name from `nextval('<name>'::regclass)`.
///
/// Anything else yields `None`.
pub fn sequence_name_from_default(default: &str) -> Option<String> {
    let name = default
        .trim()
        .strip_prefix(SEQUENCE_DEFAULT_PREFIX)?
        .strip_suffix(REGCLASS_SUFFIX)?;
    if name.is_empty() || name.contains('\'') {
        return None;
    }
    Some(name.to_string())
}

/// Normalize a literal or expression default to the form catalogs report.
///
/// Trims whitespace, strips a trailing `::type` cast and one pair of
/// surrounding single quotes, undoing `''` escapes inside a quoted literal.
/// `NULL` (any case) and empty input mean no default.
pub fn normalize_default_expr(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
        return None;
    }
    let quoted = trimmed.starts_with('\'');
    let uncast = CAST_SUFFIX.replace(trimmed, "$1");
    let uncast = uncast.trim();
    if uncast.eq_ignore_ascii_case("NULL") {
        return None;
    }
    let unquoted = if uncast.len() >= 2 && uncast.starts_with('\'') && uncast.ends_with('\'') {
        &uncast[1..uncast.len() - 1]
    } else {
        uncast
    };
    if quoted {
        Some(unquoted.replace("''", "'"))
    } else {
        Some(unquoted.to_string())
    }
}

/// Split a raw catalog default into `(default_expr, is_auto_increment)`.
pub fn normalize_column_default(raw: Option<&str>) -> (Option<String>, bool) {
    match raw {
        Some(raw) if is_sequence_default(raw) => (None, true),
        Some(raw) => (normalize_default_expr(raw), false),
        None => (None, false),
    }
}

pub(crate) fn owner_arg(table: &TableRef) -> Arg {
    match table.bare_schema() {
        Some(schema) => Arg::Value(schema.into()),
        None => Arg::Raw(ORACLE_CURRENT_SCHEMA.to_string()),
    }
}

pub(crate) fn pg_schema_arg(table: &TableRef) -> Arg {
    match table.bare_schema() {
        Some(schema) => Arg::Value(schema.into()),
        None => Arg::Raw(PG_CURRENT_SCHEMA.to_string()),
    }
}

/// Describe every column of `table`, in column order.
///
/// Any catalog failure is reported as [`PlumblineError::IntrospectionFailed`];
/// no partial result is returned.
pub async fn describe_columns<S: SqlSink>(
    sink: &S,
    table: &TableRef,
) -> Result<Vec<ColumnDescriptor>> {
    read_descriptors(sink, table)
        .await
        .map_err(|e| PlumblineError::introspection(&table.qualified(), e))
}

async fn read_descriptors<S: SqlSink>(
    sink: &S,
    table: &TableRef,
) -> Result<Vec<ColumnDescriptor>> {
    let stmt = Statement::new(COLUMNS_QUERY)
        .arg(owner_arg(table))
        .value(table.bare_name());
    let rows = sink.query(&stmt).await?;
    let mut descriptors = Vec::with_capacity(rows.len());
    for row in &rows {
        let descriptor =
            ColumnDescriptor::from_row(row).ok_or_else(|| PlumblineError::IntrospectionFailed {
                table: table.qualified(),
                reason: "catalog returned a column without a name".to_string(),
            })?;
        descriptors.push(descriptor);
    }

    let stmt = Statement::new(CONSTRAINTS_QUERY)
        .arg(owner_arg(table))
        .value(table.bare_name());
    for row in sink.query(&stmt).await? {
        let (Some(column), Some(kind)) = (row.get_string(0), row.get_string(2)) else {
            continue;
        };
        if let Some(d) = descriptors.iter_mut().find(|d| d.matches(&column)) {
            match kind.as_str() {
                "P" => d.is_primary_key = true,
                "U" => d.is_unique = true,
                _ => {}
            }
        }
    }

    let stmt = Statement::new(TYPES_QUERY)
        .arg(pg_schema_arg(table))
        .value(table.bare_name());
    for row in sink.query(&stmt).await? {
        let (Some(column), Some(precise)) = (row.get_string(0), row.get_string(1)) else {
            continue;
        };
        if let Some(d) = descriptors.iter_mut().find(|d| d.matches(&column)) {
            // internal array names: _int4 -> integer[]
            if d.native_type.starts_with('_') {
                d.native_type = precise.clone();
            }
            d.column_type = Some(precise);
        }
    }

    log::debug!(
        "Described table; table={}, columns={}",
        table,
        descriptors.len()
    );
    Ok(descriptors)
}

async fn count<S: SqlSink>(sink: &S, stmt: Statement) -> Result<bool> {
    Ok(sink.scalar_count(&stmt).await? > 0)
}

pub async fn has_table<S: SqlSink>(sink: &S, table: &TableRef) -> Result<bool> {
    count(
        sink,
        Statement::new(HAS_TABLE_QUERY)
            .arg(owner_arg(table))
            .value(table.bare_name()),
    )
    .await
}

pub async fn has_column<S: SqlSink>(sink: &S, table: &TableRef, column: &str) -> Result<bool> {
    count(
        sink,
        Statement::new(HAS_COLUMN_QUERY)
            .arg(owner_arg(table))
            .value(table.bare_name())
            .value(bare_ident(column)),
    )
    .await
}

pub async fn has_index<S: SqlSink>(sink: &S, table: &TableRef, index: &str) -> Result<bool> {
    count(
        sink,
        Statement::new(HAS_INDEX_QUERY)
            .arg(owner_arg(table))
            .value(table.bare_name())
            .value(bare_ident(index)),
    )
    .await
}

pub async fn has_constraint<S: SqlSink>(
    sink: &S,
    table: &TableRef,
    constraint: &str,
) -> Result<bool> {
    count(
        sink,
        Statement::new(HAS_CONSTRAINT_QUERY)
            .arg(owner_arg(table))
            .value(table.bare_name())
            .value(bare_ident(constraint)),
    )
    .await
}

/// Name of the connected database.
pub async fn current_database<S: SqlSink>(sink: &S) -> Result<String> {
    let rows = sink.query(&Statement::new(CURRENT_DATABASE_QUERY)).await?;
    Ok(rows
        .first()
        .and_then(|r| r.get_string(0))
        .unwrap_or_default())
}

/// Schema unqualified names resolve to.
pub async fn current_schema<S: SqlSink>(sink: &S) -> Result<String> {
    let rows = sink.query(&Statement::new(CURRENT_SCHEMA_QUERY)).await?;
    Ok(rows
        .first()
        .and_then(|r| r.get_string(0))
        .unwrap_or_default())
}
