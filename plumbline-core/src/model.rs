//! Desired schema model: tables, columns, defaults, and model-file loading.
//!
//! A model file declares tables and their columns in TOML (or JSON when the
//! file extension is `.json`):
//!
//! ```toml
//! [[tables]]
//! name = "users"
//!
//! [[tables.columns]]
//! name = "id"
//! type = "serial"
//! auto_increment = true
//! primary_key = true
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PlumblineError, Result};
use crate::introspect::normalize_default_expr;
use crate::statement::{bare_ident, is_quoted, SqlValue};

/// A managed column default.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    /// Typed value, inlined as a literal.
    Value(SqlValue),
    /// Literal or expression emitted verbatim.
    Expr(String),
    /// Explicitly no default (`DEFAULT NULL`).
    Null,
}

impl DefaultValue {
    /// SQL text placed after `DEFAULT`.
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Value(v) => v.to_literal(),
            DefaultValue::Expr(e) => e.trim().to_string(),
            DefaultValue::Null => "NULL".to_string(),
        }
    }

    /// The form a catalog reports after normalization, `None` meaning no default.
    pub fn comparable(&self) -> Option<String> {
        match self {
            DefaultValue::Value(v) => v.to_plain(),
            DefaultValue::Expr(e) => normalize_default_expr(e),
            DefaultValue::Null => None,
        }
    }
}

/// One column as the model wants it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredColumn {
    pub name: String,
    /// Rendered type, e.g. `serial`, `varchar(255)`, `numeric(10,2)`.
    pub logical_type: String,
    pub nullable: bool,
    /// `None` leaves the column default unmanaged.
    pub default: Option<DefaultValue>,
    pub auto_increment: bool,
    pub unique: bool,
    pub primary_key: bool,
}

impl DesiredColumn {
    pub fn new(name: impl Into<String>, logical_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            logical_type: logical_type.into(),
            nullable: true,
            default: None,
            auto_increment: false,
            unique: false,
            primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn default_expr(self, expr: impl Into<String>) -> Self {
        self.with_default(DefaultValue::Expr(expr.into()))
    }

    pub fn default_value(self, value: impl Into<SqlValue>) -> Self {
        self.with_default(DefaultValue::Value(value.into()))
    }

    pub fn default_null(self) -> Self {
        self.with_default(DefaultValue::Null)
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Primary key columns are always `NOT NULL`.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Whether `name` refers to this column (quotes ignored, ASCII case-insensitive).
    pub fn matches(&self, name: &str) -> bool {
        bare_ident(&self.name).eq_ignore_ascii_case(bare_ident(name))
    }
}

/// Source of the desired shape of one table.
pub trait SchemaModel {
    /// Possibly schema-qualified table name.
    fn table_name(&self) -> &str;

    fn columns(&self) -> &[DesiredColumn];

    fn lookup_field(&self, name: &str) -> Option<&DesiredColumn> {
        self.columns().iter().find(|c| c.matches(name))
    }
}

/// Owned [`SchemaModel`], as loaded from a model file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableModel {
    pub name: String,
    pub columns: Vec<DesiredColumn>,
}

impl TableModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: DesiredColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Copy any model into an owned one.
    pub fn from_model<M: SchemaModel + ?Sized>(model: &M) -> Self {
        Self {
            name: model.table_name().to_string(),
            columns: model.columns().to_vec(),
        }
    }

    pub fn primary_key_columns(&self) -> Vec<&DesiredColumn> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }
}

impl SchemaModel for TableModel {
    fn table_name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> &[DesiredColumn] {
        &self.columns
    }
}

/// A table name split into its optional schema and the table itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    /// Split `schema.table`; an unqualified name takes `default_schema`.
    pub fn parse(qualified: &str, default_schema: Option<&str>) -> Self {
        let qualified = qualified.trim();
        if !is_quoted(qualified) {
            if let Some((schema, name)) = qualified.split_once('.') {
                return Self {
                    schema: Some(schema.to_string()),
                    name: name.to_string(),
                };
            }
        }
        Self {
            schema: default_schema.map(str::to_string),
            name: qualified.to_string(),
        }
    }

    /// Name as rendered into DDL.
    pub fn qualified(&self) -> String {
        self.qualify(&self.name)
    }

    /// Qualify another object (a sequence) with this table's schema.
    pub fn qualify(&self, object: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, object),
            None => object.to_string(),
        }
    }

    /// Table name without quotes, as catalogs compare it.
    pub fn bare_name(&self) -> &str {
        bare_ident(&self.name)
    }

    pub fn bare_schema(&self) -> Option<&str> {
        self.schema.as_deref().map(bare_ident)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified())
    }
}

// ── Model file deserialization ──

/// Serialization format of a model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Toml,
    Json,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ModelFormat::Json,
            _ => ModelFormat::Toml,
        }
    }
}

#[derive(Deserialize, Default)]
struct ModelFile {
    #[serde(default)]
    tables: Vec<RawTable>,
}

#[derive(Deserialize)]
struct RawTable {
    name: String,
    #[serde(default)]
    columns: Vec<RawColumn>,
}

#[derive(Deserialize)]
struct RawColumn {
    name: String,
    #[serde(rename = "type")]
    logical_type: String,
    nullable: Option<bool>,
    #[serde(default)]
    primary_key: bool,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    auto_increment: bool,
    default: Option<String>,
    default_value: Option<RawValue>,
    #[serde(default)]
    default_null: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<RawValue> for SqlValue {
    fn from(raw: RawValue) -> Self {
        match raw {
            RawValue::Bool(b) => SqlValue::Bool(b),
            RawValue::Int(i) => SqlValue::Int(i),
            RawValue::Float(f) => SqlValue::Float(f),
            RawValue::Text(s) => SqlValue::Text(s),
        }
    }
}

impl RawColumn {
    fn into_column(self, table: &str) -> Result<DesiredColumn> {
        if self.name.trim().is_empty() {
            return Err(PlumblineError::ModelError(format!(
                "Table '{}' has a column with an empty name",
                table
            )));
        }
        if self.logical_type.trim().is_empty() {
            return Err(PlumblineError::ModelError(format!(
                "Column '{}.{}' has no type",
                table, self.name
            )));
        }

        let declared = [
            self.default.is_some(),
            self.default_value.is_some(),
            self.default_null,
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if declared > 1 {
            return Err(PlumblineError::ModelError(format!(
                "Column '{}.{}' sets more than one of default, default_value, default_null",
                table, self.name
            )));
        }
        if self.primary_key && self.nullable == Some(true) {
            return Err(PlumblineError::ModelError(format!(
                "Primary key column '{}.{}' cannot be nullable",
                table, self.name
            )));
        }

        let default = if let Some(expr) = self.default {
            Some(DefaultValue::Expr(expr))
        } else if let Some(value) = self.default_value {
            Some(DefaultValue::Value(value.into()))
        } else if self.default_null {
            Some(DefaultValue::Null)
        } else {
            None
        };

        Ok(DesiredColumn {
            name: self.name.trim().to_string(),
            logical_type: self.logical_type.trim().to_string(),
            nullable: !self.primary_key && self.nullable.unwrap_or(true),
            default,
            auto_increment: self.auto_increment,
            unique: self.unique,
            primary_key: self.primary_key,
        })
    }
}

impl RawTable {
    fn into_model(self) -> Result<TableModel> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(PlumblineError::ModelError(
                "Table name cannot be empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(PlumblineError::ModelError(format!(
                "Table '{}' declares no columns",
                name
            )));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for raw in self.columns {
            let column = raw.into_column(&name)?;
            if !seen.insert(bare_ident(&column.name).to_ascii_lowercase()) {
                return Err(PlumblineError::ModelError(format!(
                    "Column '{}' is declared twice in table '{}'",
                    column.name, name
                )));
            }
            columns.push(column);
        }
        Ok(TableModel { name, columns })
    }
}

/// Parse the tables declared in one model document.
pub fn parse_models(content: &str, format: ModelFormat) -> Result<Vec<TableModel>> {
    let file: ModelFile = match format {
        ModelFormat::Toml => toml::from_str(content)
            .map_err(|e| PlumblineError::ModelError(format!("Invalid model TOML: {}", e)))?,
        ModelFormat::Json => serde_json::from_str(content)
            .map_err(|e| PlumblineError::ModelError(format!("Invalid model JSON: {}", e)))?,
    };
    file.tables.into_iter().map(RawTable::into_model).collect()
}

/// Load and merge every model file. A table may be declared only once.
pub fn load_models(paths: &[PathBuf]) -> Result<Vec<TableModel>> {
    let mut tables: Vec<TableModel> = Vec::new();
    let mut seen = HashSet::new();

    for path in paths {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlumblineError::ModelError(format!(
                "Failed to read model file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let parsed = parse_models(&content, ModelFormat::from_path(path)).map_err(|e| match e {
            PlumblineError::ModelError(msg) => {
                PlumblineError::ModelError(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })?;
        log::debug!(
            "Loaded model file; path={}, tables={}",
            path.display(),
            parsed.len()
        );
        for table in parsed {
            if !seen.insert(table.name.to_ascii_lowercase()) {
                return Err(PlumblineError::ModelError(format!(
                    "Table '{}' is declared more than once",
                    table.name
                )));
            }
            tables.push(table);
        }
    }

    Ok(tables)
}
