//! Parameterized SQL statements with typed placeholders.
//!
//! Templates use `?` for every placeholder. Each placeholder is bound to an
//! [`Arg`]: identifiers are rendered inline (quoted when needed), raw SQL is
//! spliced verbatim, and values become `$n` bind parameters.

use std::fmt;

use serde::Serialize;

use crate::db::quote_ident;

/// A scalar value exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SqlValue {
    /// Render the value as an inline SQL literal.
    ///
    /// DDL cannot take bind parameters, so defaults are inlined with these
    /// rules: strings quoted with `'` doubling, booleans as `1`/`0`, numbers
    /// verbatim.
    pub fn to_literal(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(b) => String::from(if *b { "1" } else { "0" }),
            SqlValue::Int(i) => i.to_string(),
            SqlValue::Float(f) => f.to_string(),
            SqlValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Unquoted textual form, as a catalog reports it after normalization.
    pub fn to_plain(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Text(s) => Some(s.clone()),
            other => Some(other.to_literal()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of the value. Text is parsed, whole floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(i) => Some(*i),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<i64> for SqlValue {
    fn from(i: i64) -> Self {
        SqlValue::Int(i)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

/// An argument bound to one `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// A possibly schema-qualified table (or sequence) name.
    Table(String),
    /// A single identifier: column, index or constraint name.
    Column(String),
    /// SQL spliced verbatim (types, expressions, catalog functions).
    Raw(String),
    /// A bind parameter.
    Value(SqlValue),
}

/// A statement template plus its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    template: String,
    args: Vec<Arg>,
}

/// SQL text with `$n` placeholders and the values bound to them.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            args: Vec::new(),
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.args.push(Arg::Table(name.into()));
        self
    }

    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.args.push(Arg::Column(name.into()));
        self
    }

    pub fn raw(mut self, sql: impl Into<String>) -> Self {
        self.args.push(Arg::Raw(sql.into()));
        self
    }

    pub fn value(mut self, value: impl Into<SqlValue>) -> Self {
        self.args.push(Arg::Value(value.into()));
        self
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    /// The template this statement was built from.
    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Render into backend SQL with `$n` bind parameters.
    pub fn render(&self) -> Rendered {
        let mut params = Vec::new();
        let sql = self.expand(|value| {
            params.push(value.clone());
            format!("${}", params.len())
        });
        Rendered { sql, params }
    }

    /// Render with values inlined as literals. Used for logs, plans and errors.
    pub fn to_inline_sql(&self) -> String {
        self.expand(SqlValue::to_literal)
    }

    fn expand<F>(&self, mut bind: F) -> String
    where
        F: FnMut(&SqlValue) -> String,
    {
        let mut out = String::with_capacity(self.template.len() + 16);
        let mut args = self.args.iter();
        for ch in self.template.chars() {
            if ch != '?' {
                out.push(ch);
                continue;
            }
            match args.next() {
                Some(Arg::Table(name)) => out.push_str(&render_table(name)),
                Some(Arg::Column(name)) => out.push_str(&render_ident(name)),
                Some(Arg::Raw(sql)) => out.push_str(sql),
                Some(Arg::Value(value)) => out.push_str(&bind(value)),
                None => out.push('?'),
            }
        }
        out
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_inline_sql())
    }
}

/// One result row, decoded into [`SqlValue`]s by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<SqlValue>,
}

static NULL_VALUE: SqlValue = SqlValue::Null;

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// Value at `idx`, or `Null` when the row is shorter.
    pub fn get(&self, idx: usize) -> &SqlValue {
        self.values.get(idx).unwrap_or(&NULL_VALUE)
    }

    pub fn get_string(&self, idx: usize) -> Option<String> {
        self.get(idx).to_plain()
    }

    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        self.get(idx).as_i64()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Whether `name` is wrapped in double quotes.
pub fn is_quoted(name: &str) -> bool {
    name.len() >= 2 && name.starts_with('"') && name.ends_with('"')
}

/// Strip one pair of surrounding double quotes, if present.
pub fn bare_ident(name: &str) -> &str {
    if is_quoted(name) {
        &name[1..name.len() - 1]
    } else {
        name
    }
}

fn is_simple_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '#')
}

/// Render one identifier.
///
/// Already-quoted names pass through, simple names stay bare so the backend
/// folds their case, anything else is quoted.
pub fn render_ident(name: &str) -> String {
    if is_quoted(name) || is_simple_ident(name) {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

/// Render a possibly schema-qualified name, one part at a time.
pub fn render_table(name: &str) -> String {
    if is_quoted(name) {
        return name.to_string();
    }
    name.split('.')
        .map(render_ident)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_binds_values_in_order() {
        let stmt = Statement::new("SELECT 1 FROM t WHERE a = ? AND b = ?")
            .value("x")
            .value(5i64);
        let rendered = stmt.render();
        assert_eq!(rendered.sql, "SELECT 1 FROM t WHERE a = $1 AND b = $2");
        assert_eq!(
            rendered.params,
            vec![SqlValue::Text("x".into()), SqlValue::Int(5)]
        );
    }

    #[test]
    fn test_render_identifiers_and_raw() {
        let stmt = Statement::new("ALTER TABLE ? MODIFY ? ?")
            .table("app.users")
            .column("email")
            .raw("varchar(255)");
        assert_eq!(stmt.render().sql, "ALTER TABLE app.users MODIFY email varchar(255)");
        assert!(stmt.render().params.is_empty());
    }

    #[test]
    fn test_placeholder_inside_quotes_is_expanded() {
        let stmt = Statement::new("SET DEFAULT nextval('?')").raw("users_id_seq");
        assert_eq!(stmt.to_inline_sql(), "SET DEFAULT nextval('users_id_seq')");
    }

    #[test]
    fn test_inline_sql_quotes_text() {
        let stmt = Statement::new("SELECT ? FROM dual").value("it's");
        assert_eq!(stmt.to_string(), "SELECT 'it''s' FROM dual");
    }

    #[test]
    fn test_missing_argument_leaves_placeholder() {
        let stmt = Statement::new("DROP INDEX ?");
        assert_eq!(stmt.render().sql, "DROP INDEX ?");
    }

    #[test]
    fn test_render_ident_rules() {
        assert_eq!(render_ident("users"), "users");
        assert_eq!(render_ident("\"level\""), "\"level\"");
        assert_eq!(render_ident("my-col"), "\"my-col\"");
        assert_eq!(render_ident("1abc"), "\"1abc\"");
        assert_eq!(render_table("\"Odd\".x"), "\"Odd\".x");
        assert_eq!(render_table("app.my table"), "app.\"my table\"");
    }

    #[test]
    fn test_bare_ident() {
        assert_eq!(bare_ident("\"level\""), "level");
        assert_eq!(bare_ident("level"), "level");
        assert_eq!(bare_ident("\""), "\"");
    }

    #[test]
    fn test_literal_rendering() {
        assert_eq!(SqlValue::Bool(true).to_literal(), "1");
        assert_eq!(SqlValue::Int(-3).to_literal(), "-3");
        assert_eq!(SqlValue::Null.to_literal(), "NULL");
        assert_eq!(SqlValue::Text("a".into()).to_plain(), Some("a".to_string()));
        assert_eq!(SqlValue::Null.to_plain(), None);
    }

    #[test]
    fn test_row_accessors() {
        let row = Row::new(vec![SqlValue::Text("42".into()), SqlValue::Float(7.0)]);
        assert_eq!(row.get_i64(0), Some(42));
        assert_eq!(row.get_i64(1), Some(7));
        assert!(row.get(5).is_null());
        assert_eq!(row.len(), 2);
    }
}
