//! In-memory stand-in for an Oracle-mode backend.
//!
//! `FakeDb` implements `SqlSink` by interpreting the catalog queries and DDL
//! templates the library issues, keeping tables, constraints, indexes and
//! sequences in memory. Every executed DDL statement is logged.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;

use plumbline_core::error::{PlumblineError, Result};
use plumbline_core::identity::COLUMN_DEFAULT_QUERY;
use plumbline_core::introspect::{
    COLUMNS_QUERY, CONSTRAINTS_QUERY, CURRENT_DATABASE_QUERY, CURRENT_SCHEMA_QUERY,
    HAS_COLUMN_QUERY, HAS_CONSTRAINT_QUERY, HAS_INDEX_QUERY, HAS_TABLE_QUERY, TYPES_QUERY,
};
use plumbline_core::sink::{SqlSink, StatementCache};
use plumbline_core::statement::{bare_ident, Arg, Row, SqlValue, Statement};

/// Schema unqualified names resolve to.
pub const CURRENT_SCHEMA: &str = "APP";

#[derive(Debug, Clone, PartialEq)]
pub struct FakeColumn {
    pub name: String,
    /// Type as written in the DDL.
    pub declared: String,
    /// Type as the Oracle views report it.
    pub data_type: String,
    pub length: Option<i64>,
    pub nullable: bool,
    /// Raw default as the catalog stores it.
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeConstraint {
    pub name: String,
    pub kind: &'static str,
    pub column: String,
}

#[derive(Debug, Clone, Default)]
pub struct FakeTable {
    pub schema: String,
    pub name: String,
    pub columns: Vec<FakeColumn>,
    pub constraints: Vec<FakeConstraint>,
    pub indexes: Vec<String>,
}

impl FakeTable {
    fn column(&self, name: &str) -> Option<&FakeColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(bare_ident(name)))
    }

    fn column_mut(&mut self, name: &str) -> Result<&mut FakeColumn> {
        let table = self.name.clone();
        self.columns
            .iter_mut()
            .find(|c| c.name.eq_ignore_ascii_case(bare_ident(name)))
            .ok_or_else(|| rejected(format!("column {} does not exist in {}", name, table)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FakeSequence {
    pub numeric_type: String,
    /// (table key, column) the sequence is owned by.
    pub owner: Option<(String, String)>,
}

#[derive(Default)]
struct FakeState {
    tables: Vec<FakeTable>,
    sequences: BTreeMap<String, FakeSequence>,
    executed: Vec<String>,
    queries: usize,
    resets: usize,
    fail_on: Option<String>,
    next_constraint: usize,
}

pub struct FakeDb {
    state: RefCell<FakeState>,
}

fn rejected(reason: String) -> PlumblineError {
    PlumblineError::Unsupported {
        operation: format!("fake backend rejected statement: {}", reason),
    }
}

/// `(SCHEMA, NAME)` of a possibly qualified name, upper-cased.
fn split_name(name: &str) -> (String, String) {
    let name = bare_ident(name.trim());
    match name.split_once('.') {
        Some((schema, object)) => (
            bare_ident(schema).to_ascii_uppercase(),
            bare_ident(object).to_ascii_uppercase(),
        ),
        None => (CURRENT_SCHEMA.to_string(), name.to_ascii_uppercase()),
    }
}

fn table_key(schema: &str, name: &str) -> String {
    format!("{}.{}", schema.to_ascii_uppercase(), name.to_ascii_uppercase())
}

fn sequence_key(name: &str) -> String {
    let (schema, object) = split_name(name);
    table_key(&schema, &object)
}

fn arg_text(arg: &Arg) -> String {
    match arg {
        Arg::Table(s) | Arg::Column(s) | Arg::Raw(s) => s.clone(),
        Arg::Value(v) => v.to_plain().unwrap_or_default(),
    }
}

/// Schema bound to a catalog query: an explicit value, or the session's.
fn schema_arg(arg: &Arg) -> String {
    match arg {
        Arg::Value(v) => v.to_plain().unwrap_or_default().to_ascii_uppercase(),
        _ => CURRENT_SCHEMA.to_string(),
    }
}

fn base_type(declared: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    for ch in declared.trim().to_ascii_lowercase().chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn type_length(declared: &str) -> Option<i64> {
    let (_, rest) = declared.split_once('(')?;
    let (inner, _) = rest.split_once(')')?;
    inner.split(',').next()?.trim().parse().ok()
}

/// Oracle view spelling of a declared type.
pub fn oracle_type(declared: &str) -> String {
    let base = base_type(declared);
    let native = match base.as_str() {
        "integer" | "int" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "numeric"
        | "decimal" | "number" => "NUMBER",
        "real" | "float" | "float4" | "float8" | "double precision" => "FLOAT",
        "varchar" | "varchar2" | "character varying" => "VARCHAR2",
        "char" | "character" => "CHAR",
        "text" | "clob" => "CLOB",
        "bytea" | "blob" => "BLOB",
        "date" => "DATE",
        "timestamptz" | "timestamp with time zone" => "TIMESTAMP WITH TIME ZONE",
        "timestamp" | "timestamp without time zone" => "TIMESTAMP",
        "boolean" | "bool" => "BOOLEAN",
        other => return other.to_ascii_uppercase(),
    };
    native.to_string()
}

/// Default as the catalog reports it: quoted literals gain a cast.
fn catalog_default(raw: &str, declared: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with('\'') {
        let cast = match base_type(declared).as_str() {
            "varchar" | "varchar2" => "character varying".to_string(),
            other => other.to_string(),
        };
        format!("{}::{}", raw, cast)
    } else {
        raw.to_string()
    }
}

fn new_column(name: &str, declared: &str) -> FakeColumn {
    FakeColumn {
        name: bare_ident(name).to_string(),
        declared: declared.trim().to_string(),
        data_type: oracle_type(declared),
        length: type_length(declared),
        nullable: true,
        default: None,
    }
}

/// Parse `type [DEFAULT x] [NOT NULL] [UNIQUE]`.
fn parse_definition(name: &str, definition: &str) -> (FakeColumn, bool) {
    let mut rest = definition.trim();
    let unique = match rest.strip_suffix(" UNIQUE") {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };
    let not_null = match rest.strip_suffix(" NOT NULL") {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };
    let (declared, default) = match rest.split_once(" DEFAULT ") {
        Some((t, d)) => (t, Some(d)),
        None => (rest, None),
    };
    let mut column = new_column(name, declared);
    column.nullable = !not_null;
    column.default = default.map(|d| catalog_default(d, declared));
    (column, unique)
}

/// Split on commas outside parentheses.
fn split_top_level(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in s.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts.into_iter().map(|p| p.trim().to_string()).collect()
}

impl FakeState {
    fn table(&self, schema: &str, name: &str) -> Option<&FakeTable> {
        self.tables.iter().find(|t| {
            t.schema.eq_ignore_ascii_case(schema) && t.name.eq_ignore_ascii_case(bare_ident(name))
        })
    }

    fn table_named(&self, qualified: &str) -> Option<&FakeTable> {
        let (schema, name) = split_name(qualified);
        self.table(&schema, &name)
    }

    fn table_mut(&mut self, qualified: &str) -> Result<&mut FakeTable> {
        let (schema, name) = split_name(qualified);
        self.tables
            .iter_mut()
            .find(|t| t.schema.eq_ignore_ascii_case(&schema) && t.name.eq_ignore_ascii_case(&name))
            .ok_or_else(|| rejected(format!("table {} does not exist", qualified)))
    }

    fn constraint_name(&mut self) -> String {
        self.next_constraint += 1;
        format!("SYS_C{:05}", self.next_constraint)
    }

    fn add_unique(&mut self, table: &str, name: String, column: &str) -> Result<()> {
        let t = self.table_mut(table)?;
        if t.column(column).is_none() {
            return Err(rejected(format!("column {} does not exist", column)));
        }
        if t.constraints.iter().any(|c| c.name.eq_ignore_ascii_case(&name))
            || t.indexes.iter().any(|i| i.eq_ignore_ascii_case(&name))
        {
            return Err(rejected(format!("name {} is already used", name)));
        }
        t.constraints.push(FakeConstraint {
            name: name.clone(),
            kind: "U",
            column: bare_ident(column).to_string(),
        });
        t.indexes.push(name);
        Ok(())
    }

    fn drop_owned_sequences(&mut self, key: &str, column: Option<&str>) {
        self.sequences.retain(|_, seq| match &seq.owner {
            Some((owner, owned_column)) => {
                owner != key || column.is_some_and(|c| !owned_column.eq_ignore_ascii_case(c))
            }
            None => true,
        });
    }

    fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        let t = stmt.template();
        let args = stmt.args();
        let text = |i: usize| args.get(i).map(arg_text).unwrap_or_default();
        let count =
            |n: usize| -> Result<Vec<Row>> { Ok(vec![Row::new(vec![SqlValue::Int(n as i64)])]) };

        if t == COLUMNS_QUERY {
            let Some(table) = self.table(&schema_arg(&args[0]), &text(1)) else {
                return Ok(Vec::new());
            };
            return Ok(table
                .columns
                .iter()
                .map(|c| {
                    Row::new(vec![
                        c.name.clone().into(),
                        (if c.nullable { "Y" } else { "N" }).into(),
                        c.data_type.clone().into(),
                        c.length.map_or(SqlValue::Null, SqlValue::Int),
                        SqlValue::Null,
                        SqlValue::Null,
                        c.default.clone().map_or(SqlValue::Null, SqlValue::Text),
                    ])
                })
                .collect());
        }
        if t == CONSTRAINTS_QUERY {
            let Some(table) = self.table(&schema_arg(&args[0]), &text(1)) else {
                return Ok(Vec::new());
            };
            return Ok(table
                .constraints
                .iter()
                .map(|c| {
                    Row::new(vec![
                        c.column.clone().into(),
                        c.name.clone().into(),
                        c.kind.into(),
                    ])
                })
                .collect());
        }
        if t == TYPES_QUERY {
            let Some(table) = self.table(&schema_arg(&args[0]), &text(1)) else {
                return Ok(Vec::new());
            };
            return Ok(table
                .columns
                .iter()
                .map(|c| Row::new(vec![c.name.clone().into(), c.declared.to_ascii_lowercase().into()]))
                .collect());
        }
        if t == COLUMN_DEFAULT_QUERY {
            let default = self
                .table(&schema_arg(&args[0]), &text(1))
                .and_then(|table| table.column(&text(2)))
                .and_then(|c| c.default.clone());
            return Ok(match default {
                Some(d) => vec![Row::new(vec![d.into()])],
                None => Vec::new(),
            });
        }
        if t == HAS_TABLE_QUERY {
            return count(self.table(&schema_arg(&args[0]), &text(1)).is_some() as usize);
        }
        if t == HAS_COLUMN_QUERY {
            let found = self
                .table(&schema_arg(&args[0]), &text(1))
                .and_then(|table| table.column(&text(2)))
                .is_some();
            return count(found as usize);
        }
        if t == HAS_INDEX_QUERY {
            let found = self
                .table(&schema_arg(&args[0]), &text(1))
                .is_some_and(|table| table.indexes.iter().any(|i| i.eq_ignore_ascii_case(&text(2))));
            return count(found as usize);
        }
        if t == HAS_CONSTRAINT_QUERY {
            let found = self
                .table(&schema_arg(&args[0]), &text(1))
                .is_some_and(|table| {
                    table
                        .constraints
                        .iter()
                        .any(|c| c.name.eq_ignore_ascii_case(&text(2)))
                });
            return count(found as usize);
        }
        if t == CURRENT_DATABASE_QUERY {
            return Ok(vec![Row::new(vec!["FAKEDB".into()])]);
        }
        if t == CURRENT_SCHEMA_QUERY {
            return Ok(vec![Row::new(vec![CURRENT_SCHEMA.into()])]);
        }
        Err(rejected(format!("unknown query: {}", t)))
    }

    fn execute(&mut self, stmt: &Statement) -> Result<()> {
        let args = stmt.args();
        let text = |i: usize| args.get(i).map(arg_text).unwrap_or_default();

        match stmt.template() {
            "CREATE TABLE ? (?)" => {
                let (schema, name) = split_name(&text(0));
                if self.table(&schema, &name).is_some() {
                    return Err(rejected(format!("table {} already exists", name)));
                }
                let mut table = FakeTable {
                    schema: schema.clone(),
                    name: bare_ident(text(0).rsplit('.').next().unwrap_or_default()).to_string(),
                    ..Default::default()
                };
                let mut uniques = Vec::new();
                for part in split_top_level(&text(1)) {
                    if let Some(keys) = part.strip_prefix("PRIMARY KEY") {
                        let keys = keys.trim().trim_start_matches('(').trim_end_matches(')');
                        for key in keys.split(',') {
                            table.constraints.push(FakeConstraint {
                                name: format!("PK_{}", name),
                                kind: "P",
                                column: bare_ident(key.trim()).to_string(),
                            });
                        }
                        continue;
                    }
                    let (column, definition) = part
                        .split_once(' ')
                        .ok_or_else(|| rejected(format!("bad column definition: {}", part)))?;
                    let (column, unique) = parse_definition(column, definition);
                    if unique {
                        uniques.push(column.name.clone());
                    }
                    table.columns.push(column);
                }
                let qualified = format!("{}.{}", schema, table.name);
                self.tables.push(table);
                for column in uniques {
                    let name = self.constraint_name();
                    self.add_unique(&qualified, name, &column)?;
                }
            }
            "ALTER TABLE ? ADD ? ?" => {
                let table = self.table_mut(&text(0))?;
                if table.column(&text(1)).is_some() {
                    return Err(rejected(format!("column {} already exists", text(1))));
                }
                let (column, unique) = parse_definition(&text(1), &text(2));
                let column_name = column.name.clone();
                table.columns.push(column);
                if unique {
                    let name = self.constraint_name();
                    self.add_unique(&text(0), name, &column_name)?;
                }
            }
            "ALTER TABLE ? MODIFY ? ?" | "ALTER TABLE ? ALTER COLUMN ? TYPE ?" => {
                let column = self.table_mut(&text(0))?.column_mut(&text(1))?;
                column.declared = text(2);
                column.data_type = oracle_type(&text(2));
                column.length = type_length(&text(2));
            }
            "ALTER TABLE ? MODIFY ? NULL" => {
                self.table_mut(&text(0))?.column_mut(&text(1))?.nullable = true;
            }
            "ALTER TABLE ? MODIFY ? NOT NULL" => {
                self.table_mut(&text(0))?.column_mut(&text(1))?.nullable = false;
            }
            "ALTER TABLE ? ADD CONSTRAINT ? UNIQUE(?) ENABLE" => {
                self.add_unique(&text(0), bare_ident(&text(1)).to_string(), &text(2))?;
            }
            "ALTER TABLE ? MODIFY (? DEFAULT ?)" => {
                let column = self.table_mut(&text(0))?.column_mut(&text(1))?;
                column.default = Some(catalog_default(&text(2), &column.declared));
            }
            "ALTER TABLE ? MODIFY (? DEFAULT NULL)" => {
                self.table_mut(&text(0))?.column_mut(&text(1))?.default = Some("NULL".to_string());
            }
            "ALTER TABLE ? ALTER COLUMN ? DROP DEFAULT" => {
                self.table_mut(&text(0))?.column_mut(&text(1))?.default = None;
            }
            "ALTER TABLE ? ALTER COLUMN ? SET DEFAULT nextval('?')" => {
                let sequence = text(2);
                if !self.sequences.contains_key(&sequence_key(&sequence)) {
                    return Err(rejected(format!("sequence {} does not exist", sequence)));
                }
                self.table_mut(&text(0))?.column_mut(&text(1))?.default =
                    Some(format!("nextval('{}'::regclass)", sequence));
            }
            "CREATE SEQUENCE IF NOT EXISTS ? AS ?" => {
                self.sequences
                    .entry(sequence_key(&text(0)))
                    .or_insert(FakeSequence {
                        numeric_type: text(1),
                        owner: None,
                    });
            }
            "ALTER SEQUENCE IF EXISTS ? AS ?" => {
                if let Some(seq) = self.sequences.get_mut(&sequence_key(&text(0))) {
                    seq.numeric_type = text(1);
                }
            }
            "ALTER SEQUENCE ? OWNED BY ?.?" => {
                let (schema, name) = split_name(&text(1));
                if self.table(&schema, &name).and_then(|t| t.column(&text(2))).is_none() {
                    return Err(rejected(format!("column {}.{} does not exist", name, text(2))));
                }
                let seq = self
                    .sequences
                    .get_mut(&sequence_key(&text(0)))
                    .ok_or_else(|| rejected(format!("sequence {} does not exist", text(0))))?;
                seq.owner = Some((table_key(&schema, &name), bare_ident(&text(2)).to_string()));
            }
            "DROP SEQUENCE IF EXISTS ?" => {
                self.sequences.remove(&sequence_key(&text(0)));
            }
            "ALTER TABLE ? DROP COLUMN ?" => {
                let (schema, name) = split_name(&text(0));
                let column = bare_ident(&text(1)).to_string();
                let table = self.table_mut(&text(0))?;
                if table.column(&column).is_none() {
                    return Err(rejected(format!("column {} does not exist", column)));
                }
                table.columns.retain(|c| !c.name.eq_ignore_ascii_case(&column));
                table
                    .constraints
                    .retain(|c| !c.column.eq_ignore_ascii_case(&column));
                self.drop_owned_sequences(&table_key(&schema, &name), Some(&column));
            }
            "DROP TABLE ? CASCADE CONSTRAINTS" => {
                let (schema, name) = split_name(&text(0));
                let before = self.tables.len();
                self.tables.retain(|t| {
                    !(t.schema.eq_ignore_ascii_case(&schema) && t.name.eq_ignore_ascii_case(&name))
                });
                if self.tables.len() == before {
                    return Err(rejected(format!("table {} does not exist", name)));
                }
                self.drop_owned_sequences(&table_key(&schema, &name), None);
            }
            "ALTER TABLE ? RENAME TO ?" => {
                let new_name = bare_ident(&text(1)).to_string();
                self.table_mut(&text(0))?.name = new_name;
            }
            "DROP INDEX ?" => {
                let (schema, index) = split_name(&text(0));
                let table = self
                    .tables
                    .iter_mut()
                    .filter(|t| t.schema.eq_ignore_ascii_case(&schema))
                    .find(|t| t.indexes.iter().any(|i| i.eq_ignore_ascii_case(&index)))
                    .ok_or_else(|| rejected(format!("index {} does not exist", index)))?;
                table.indexes.retain(|i| !i.eq_ignore_ascii_case(&index));
            }
            "ALTER TABLE ? DROP CONSTRAINT ?" => {
                let name = bare_ident(&text(1)).to_string();
                let table = self.table_mut(&text(0))?;
                let before = table.constraints.len();
                table.constraints.retain(|c| !c.name.eq_ignore_ascii_case(&name));
                if table.constraints.len() == before {
                    return Err(rejected(format!("constraint {} does not exist", name)));
                }
                table.indexes.retain(|i| !i.eq_ignore_ascii_case(&name));
            }
            other => return Err(rejected(format!("unknown DDL: {}", other))),
        }
        Ok(())
    }
}

impl FakeDb {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(FakeState::default()),
        }
    }

    /// Seed a table in the current schema with nullable columns `(name, type)`.
    pub fn with_table(self, name: &str, columns: &[(&str, &str)]) -> Self {
        let (schema, _) = split_name(name);
        let table = FakeTable {
            schema,
            name: bare_ident(name.rsplit('.').next().unwrap_or(name)).to_string(),
            columns: columns.iter().map(|(n, t)| new_column(n, t)).collect(),
            ..Default::default()
        };
        self.state.borrow_mut().tables.push(table);
        self
    }

    pub fn set_default(&self, table: &str, column: &str, raw: &str) {
        let mut state = self.state.borrow_mut();
        if let Ok(t) = state.table_mut(table) {
            if let Ok(c) = t.column_mut(column) {
                c.default = Some(raw.to_string());
            }
        }
    }

    pub fn set_not_null(&self, table: &str, column: &str) {
        let mut state = self.state.borrow_mut();
        if let Ok(t) = state.table_mut(table) {
            if let Ok(c) = t.column_mut(column) {
                c.nullable = false;
            }
        }
    }

    pub fn add_index(&self, table: &str, index: &str) {
        let mut state = self.state.borrow_mut();
        if let Ok(t) = state.table_mut(table) {
            t.indexes.push(index.to_string());
        }
    }

    /// Reject every statement whose template starts with `prefix`.
    pub fn fail_on(&self, prefix: &str) {
        self.state.borrow_mut().fail_on = Some(prefix.to_string());
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.borrow().executed.clone()
    }

    pub fn clear_log(&self) {
        self.state.borrow_mut().executed.clear();
    }

    pub fn resets(&self) -> usize {
        self.state.borrow().resets
    }

    pub fn queries(&self) -> usize {
        self.state.borrow().queries
    }

    pub fn column(&self, table: &str, column: &str) -> Option<FakeColumn> {
        self.state
            .borrow()
            .table_named(table)
            .and_then(|t| t.column(column).cloned())
    }

    pub fn constraints(&self, table: &str) -> Vec<FakeConstraint> {
        self.state
            .borrow()
            .table_named(table)
            .map(|t| t.constraints.clone())
            .unwrap_or_default()
    }

    pub fn indexes(&self, table: &str) -> Vec<String> {
        self.state
            .borrow()
            .table_named(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.borrow().table_named(table).is_some()
    }

    pub fn sequence(&self, name: &str) -> Option<FakeSequence> {
        self.state
            .borrow()
            .sequences
            .get(&sequence_key(name))
            .cloned()
    }

    pub fn sequence_count(&self) -> usize {
        self.state.borrow().sequences.len()
    }

    fn check_failure(&self, stmt: &Statement) -> Result<()> {
        match &self.state.borrow().fail_on {
            Some(prefix) if stmt.template().starts_with(prefix.as_str()) => {
                Err(rejected(format!("injected failure: {}", stmt)))
            }
            _ => Ok(()),
        }
    }
}

impl SqlSink for FakeDb {
    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        self.check_failure(stmt)?;
        self.state.borrow_mut().queries += 1;
        self.state.borrow().query(stmt)
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        self.check_failure(stmt)?;
        let mut state = self.state.borrow_mut();
        state.execute(stmt)?;
        state.executed.push(stmt.to_inline_sql());
        Ok(0)
    }
}

impl StatementCache for FakeDb {
    fn reset(&self) {
        self.state.borrow_mut().resets += 1;
    }
}
