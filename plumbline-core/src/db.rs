//! Database connection, TLS support, and the tokio-postgres statement sink.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::Client;

use crate::config::{DatabaseConfig, SslMode};
use crate::error::{PlumblineError, Result};
use crate::sink::{SqlSink, StatementCache};
use crate::statement::{Row, SqlValue, Statement};

/// Quote a SQL identifier to prevent SQL injection.
///
/// Doubles any embedded double-quotes and wraps in double-quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Validate that a SQL identifier contains only safe characters.
///
/// Returns an error for names with characters outside `[a-zA-Z0-9_]`.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PlumblineError::ConfigError(
            "Identifier cannot be empty".to_string(),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(PlumblineError::ConfigError(format!(
            "Identifier '{}' contains invalid characters. Only [a-zA-Z0-9_] are allowed.",
            name
        )));
    }
    Ok(())
}

/// Build a rustls ClientConfig using the Mozilla CA bundle and ring crypto provider.
fn make_rustls_config() -> Result<rustls::ClientConfig> {
    let root_store =
        rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(std::sync::Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| PlumblineError::ConfigError(format!("TLS setup failed: {}", e)))?
    .with_root_certificates(root_store)
    .with_no_client_auth();
    Ok(config)
}

/// Check if a postgres error is a permanent authentication failure that should not be retried.
fn is_permanent_error(e: &tokio_postgres::Error) -> bool {
    if let Some(db_err) = e.as_db_error() {
        let code = db_err.code().code();
        // 28P01 = invalid_password, 28000 = invalid_authorization_specification
        return code == "28P01" || code == "28000";
    }
    false
}

/// Inject TCP keepalive parameters into a connection string if not already present.
///
/// For URL-style strings (`postgres://...`), appends `?keepalives=1&keepalives_idle=N`
/// (or `&` if `?` already exists). For key=value style, appends ` keepalives=1 keepalives_idle=N`.
/// Returns the string unchanged if `keepalive_secs == 0` or keepalive params already exist.
pub fn inject_keepalive(conn_string: &str, keepalive_secs: u32) -> String {
    if keepalive_secs == 0 {
        return conn_string.to_string();
    }
    let lower = conn_string.to_lowercase();
    if lower.contains("keepalives") {
        return conn_string.to_string();
    }
    let params = format!("keepalives=1&keepalives_idle={}", keepalive_secs);
    if conn_string.starts_with("postgres://") || conn_string.starts_with("postgresql://") {
        if conn_string.contains('?') {
            format!("{}&{}", conn_string, params)
        } else {
            format!("{}?{}", conn_string, params)
        }
    } else {
        format!(
            "{} keepalives=1 keepalives_idle={}",
            conn_string, keepalive_secs
        )
    }
}

/// Connection behavior derived from `[database]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub ssl_mode: SslMode,
    /// Extra attempts after the first failure.
    pub retries: u32,
    /// 0 waits forever.
    pub connect_timeout_secs: u32,
    /// Applied with `SET statement_timeout` after connecting; 0 leaves it unset.
    pub statement_timeout_secs: u32,
    pub keepalive_secs: u32,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            ssl_mode: SslMode::Prefer,
            retries: 0,
            connect_timeout_secs: 30,
            statement_timeout_secs: 0,
            keepalive_secs: 120,
        }
    }
}

impl From<&DatabaseConfig> for ConnectOptions {
    fn from(db: &DatabaseConfig) -> Self {
        Self {
            ssl_mode: db.ssl_mode.clone(),
            retries: db.connect_retries,
            connect_timeout_secs: db.connect_timeout_secs,
            statement_timeout_secs: db.statement_timeout_secs,
            keepalive_secs: db.keepalive_secs,
        }
    }
}

/// Spawn the background connection driver task.
fn spawn_connection_task<F>(connection: F)
where
    F: std::future::Future<Output = std::result::Result<(), tokio_postgres::Error>>
        + Send
        + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("Database connection error: {}", e);
        }
    });
}

async fn open(conn_string: &str, ssl_mode: &SslMode) -> Result<Client> {
    match ssl_mode {
        SslMode::Disable => {
            let (client, connection) =
                tokio_postgres::connect(conn_string, tokio_postgres::NoTls).await?;
            spawn_connection_task(connection);
            Ok(client)
        }
        SslMode::Require => {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_rustls_config()?);
            let (client, connection) = tokio_postgres::connect(conn_string, tls).await?;
            spawn_connection_task(connection);
            Ok(client)
        }
        SslMode::Prefer => {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_rustls_config()?);
            match tokio_postgres::connect(conn_string, tls).await {
                Ok((client, connection)) => {
                    spawn_connection_task(connection);
                    Ok(client)
                }
                Err(_) => {
                    log::debug!("TLS connection failed, falling back to plaintext");
                    let (client, connection) =
                        tokio_postgres::connect(conn_string, tokio_postgres::NoTls).await?;
                    spawn_connection_task(connection);
                    Ok(client)
                }
            }
        }
    }
}

async fn connect_once(
    conn_string: &str,
    ssl_mode: &SslMode,
    connect_timeout_secs: u32,
) -> Result<Client> {
    if connect_timeout_secs == 0 {
        return open(conn_string, ssl_mode).await;
    }
    match tokio::time::timeout(
        std::time::Duration::from_secs(connect_timeout_secs as u64),
        open(conn_string, ssl_mode),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(PlumblineError::ConnectTimeout(connect_timeout_secs)),
    }
}

/// Connect to the database, retrying up to `options.retries` times with exponential backoff + jitter.
///
/// Each retry waits `min(2^attempt, 30) + rand(0..1000ms)` before the next attempt.
/// Permanent errors (authentication failures) are not retried.
pub async fn connect(conn_string: &str, options: &ConnectOptions) -> Result<Client> {
    let conn_string = inject_keepalive(conn_string, options.keepalive_secs);
    let mut last_err = None;

    for attempt in 0..=options.retries {
        if attempt > 0 {
            let base_delay = std::cmp::min(1u64 << attempt.min(5), 30);
            let jitter_ms = fastrand::u64(0..1000);
            let delay = std::time::Duration::from_secs(base_delay)
                + std::time::Duration::from_millis(jitter_ms);
            log::info!(
                "Connection attempt failed, retrying; attempt={}, max_attempts={}, delay_ms={}",
                attempt + 1,
                options.retries + 1,
                delay.as_millis() as u64
            );
            tokio::time::sleep(delay).await;
        }

        match connect_once(&conn_string, &options.ssl_mode, options.connect_timeout_secs).await {
            Ok(client) => {
                if attempt > 0 {
                    log::info!(
                        "Connected successfully after retry; attempt={}, max_attempts={}",
                        attempt + 1,
                        options.retries + 1
                    );
                }
                if options.statement_timeout_secs > 0 {
                    let timeout_sql = format!(
                        "SET statement_timeout = '{}s'",
                        options.statement_timeout_secs
                    );
                    client.batch_execute(&timeout_sql).await?;
                }
                return Ok(client);
            }
            Err(PlumblineError::DatabaseError(e)) if is_permanent_error(&e) => {
                log::error!("Permanent connection error, not retrying: {}", e);
                return Err(PlumblineError::DatabaseError(e));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        PlumblineError::ConfigError("No connection attempt was made".to_string())
    }))
}

/// [`SqlSink`] over a tokio-postgres client.
///
/// With `prepare` on, catalog queries are prepared once and reused until
/// [`StatementCache::reset`]. DDL always goes through the unnamed statement.
pub struct PgSink {
    client: Client,
    prepare: bool,
    prepared: Mutex<HashMap<String, tokio_postgres::Statement>>,
}

impl PgSink {
    pub fn new(client: Client, prepare: bool) -> Self {
        Self {
            client,
            prepare,
            prepared: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of prepared statements currently held.
    pub fn cached_statements(&self) -> usize {
        self.cache().len()
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, tokio_postgres::Statement>> {
        self.prepared.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn prepared(&self, sql: &str) -> Result<tokio_postgres::Statement> {
        if let Some(stmt) = self.cache().get(sql).cloned() {
            return Ok(stmt);
        }
        let stmt = self.client.prepare(sql).await?;
        self.cache().insert(sql.to_string(), stmt.clone());
        Ok(stmt)
    }
}

impl SqlSink for PgSink {
    async fn query(&self, stmt: &Statement) -> Result<Vec<Row>> {
        let rendered = stmt.render();
        log::debug!(
            "Running catalog query; sql={}, params={}",
            rendered.sql,
            rendered.params.len()
        );
        let params = bind_params(&rendered.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p).collect();
        let rows = if self.prepare {
            let prepared = self.prepared(&rendered.sql).await?;
            self.client.query(&prepared, &refs).await?
        } else {
            self.client.query(rendered.sql.as_str(), &refs).await?
        };
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, stmt: &Statement) -> Result<u64> {
        let rendered = stmt.render();
        let params = bind_params(&rendered.params);
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p).collect();
        Ok(self.client.execute(rendered.sql.as_str(), &refs).await?)
    }
}

impl StatementCache for PgSink {
    fn reset(&self) {
        let mut cache = self.cache();
        if !cache.is_empty() {
            log::debug!("Dropping prepared statements; count={}", cache.len());
            cache.clear();
        }
    }
}

fn bind_params(values: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync>> {
    values
        .iter()
        .map(|value| -> Box<dyn ToSql + Sync> {
            match value {
                SqlValue::Null => Box::new(None::<String>),
                SqlValue::Bool(b) => Box::new(*b),
                SqlValue::Int(i) => Box::new(*i),
                SqlValue::Float(f) => Box::new(*f),
                SqlValue::Text(s) => Box::new(s.clone()),
            }
        })
        .collect()
}

/// Text-compatible value of any type. Oracle-mode servers report
/// `VARCHAR2` and friends with their own OIDs but send them as text.
struct AnyText(String);

impl<'a> FromSql<'a> for AnyText {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(AnyText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn decode_row(row: &tokio_postgres::Row) -> Row {
    let values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_value(row, idx, column.type_()))
        .collect();
    Row::new(values)
}

fn decode_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> SqlValue {
    let decoded = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Bool))
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |n| SqlValue::Int(n.into())))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |n| SqlValue::Int(n.into())))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Int))
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |n| SqlValue::Int(n.into())))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |n| SqlValue::Float(n.into())))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map(|v| v.map_or(SqlValue::Null, SqlValue::Float))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |t| SqlValue::Text(t.to_rfc3339())))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |t| SqlValue::Text(t.to_string())))
    } else {
        row.try_get::<_, Option<AnyText>>(idx)
            .map(|v| v.map_or(SqlValue::Null, |t| SqlValue::Text(t.0)))
    };

    match decoded {
        Ok(value) => value,
        Err(e) => {
            log::debug!(
                "Could not decode column value; index={}, type={}, error={}",
                idx,
                ty,
                e
            );
            SqlValue::Null
        }
    }
}
