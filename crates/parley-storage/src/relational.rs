//! Relational backend driver.
//!
//! [`RelationalDriver`] is the seam the relational processor talks to.
//! [`SqliteDriver`] implements it over rusqlite; each call opens its own
//! connection on a blocking thread so concurrent turns never share one.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use parley_core::error::ParleyError;

/// Schema-introspection and query-execution capability of a relational store.
#[async_trait]
pub trait RelationalDriver: Send + Sync {
    /// Describe the columns of `schema.table`, one `schema.table, column` line per column.
    async fn describe_columns(
        &self,
        connection: &str,
        schema: &str,
        table: &str,
    ) -> Result<String, ParleyError>;

    /// Run `query` and render every row as a line of `", "`-joined values.
    ///
    /// An empty string means the query produced no rows.
    async fn execute(&self, connection: &str, query: &str) -> Result<String, ParleyError>;

    /// Whether a connection can be opened.
    async fn can_connect(&self, connection: &str) -> bool;
}

/// SQLite implementation of [`RelationalDriver`].
///
/// Connection strings are database file paths, optionally prefixed with
/// `sqlite://` or `Data Source=`. Generated queries run on a read-only
/// connection.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    busy_timeout: Duration,
}

impl SqliteDriver {
    pub fn new() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        Self { busy_timeout }
    }

    fn open(&self, connection: &str) -> Result<Connection, ParleyError> {
        let path = database_path(connection);
        if !path.exists() {
            return Err(ParleyError::Storage(format!(
                "Database not found at {}",
                path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ParleyError::Storage(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| ParleyError::Storage(format!("Failed to set busy timeout: {}", e)))?;

        Ok(conn)
    }

    /// Run a closure against a fresh connection on the blocking pool.
    async fn with_conn<F, T>(&self, connection: &str, f: F) -> Result<T, ParleyError>
    where
        F: FnOnce(&Connection) -> Result<T, ParleyError> + Send + 'static,
        T: Send + 'static,
    {
        let driver = self.clone();
        let connection = connection.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = driver.open(&connection)?;
            f(&conn)
        })
        .await
        .map_err(|e| ParleyError::Storage(format!("Database task panicked: {}", e)))?
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelationalDriver for SqliteDriver {
    async fn describe_columns(
        &self,
        connection: &str,
        schema: &str,
        table: &str,
    ) -> Result<String, ParleyError> {
        validate_identifier(schema)?;
        validate_identifier(table)?;

        let label = format!("{}.{}", schema, table);
        let sqlite_schema = sqlite_schema(schema).to_string();
        let table = table.to_string();

        let columns = self
            .with_conn(connection, move |conn| {
                let mut stmt = conn
                    .prepare("SELECT name FROM pragma_table_info(?1, ?2) ORDER BY cid")
                    .map_err(|e| ParleyError::Storage(format!("Describe prepare: {}", e)))?;
                let rows = stmt
                    .query_map([table.as_str(), sqlite_schema.as_str()], |row| {
                        row.get::<_, String>(0)
                    })
                    .map_err(|e| ParleyError::Storage(format!("Describe query: {}", e)))?;

                let mut columns = Vec::new();
                for row in rows {
                    columns.push(row.map_err(|e| ParleyError::Storage(e.to_string()))?);
                }
                Ok(columns)
            })
            .await?;

        if columns.is_empty() {
            return Err(ParleyError::NotFound(format!("table {}", label)));
        }

        debug!(table = %label, columns = columns.len(), "Described table");

        let mut out = String::new();
        for column in columns {
            out.push_str(&label);
            out.push_str(", ");
            out.push_str(&column);
            out.push('\n');
        }
        Ok(out)
    }

    async fn execute(&self, connection: &str, query: &str) -> Result<String, ParleyError> {
        let query = query.to_string();
        self.with_conn(connection, move |conn| {
            let mut stmt = conn
                .prepare(&query)
                .map_err(|e| ParleyError::Storage(format!("Query prepare: {}", e)))?;
            let column_count = stmt.column_count();

            let mut rows = stmt
                .query([])
                .map_err(|e| ParleyError::Storage(format!("Query: {}", e)))?;

            let mut out = String::new();
            while let Some(row) = rows
                .next()
                .map_err(|e| ParleyError::Storage(format!("Row fetch: {}", e)))?
            {
                for i in 0..column_count {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let value = row
                        .get_ref(i)
                        .map_err(|e| ParleyError::Storage(format!("Column {}: {}", i, e)))?;
                    out.push_str(&render_value(value));
                }
                out.push('\n');
            }
            Ok(out)
        })
        .await
    }

    async fn can_connect(&self, connection: &str) -> bool {
        let result = self
            .with_conn(connection, |conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(|e| ParleyError::Storage(e.to_string()))
            })
            .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Connection check failed");
                false
            }
        }
    }
}

/// Strip the supported connection-string prefixes down to a file path.
fn database_path(connection: &str) -> PathBuf {
    let trimmed = connection.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("Data Source="))
        .unwrap_or(trimmed);
    PathBuf::from(path.trim_end_matches(';'))
}

/// Map a configured schema name onto an SQLite schema.
///
/// `dbo` and an empty schema mean the primary database.
fn sqlite_schema(schema: &str) -> &str {
    if schema.is_empty() || schema.eq_ignore_ascii_case("dbo") {
        "main"
    } else {
        schema
    }
}

fn validate_identifier(ident: &str) -> Result<(), ParleyError> {
    let valid = !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if valid {
        Ok(())
    } else {
        Err(ParleyError::Storage(format!("Invalid identifier: '{}'", ident)))
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db() -> (tempfile::TempDir, String) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY, customer TEXT, amount REAL, note TEXT);
             INSERT INTO invoices (customer, amount, note) VALUES ('Acme', 120.5, NULL);
             INSERT INTO invoices (customer, amount, note) VALUES ('Globex', 80.0, 'late');",
        )
        .unwrap();
        let conn_str = path.to_string_lossy().to_string();
        (dir, conn_str)
    }

    #[tokio::test]
    async fn test_describe_columns_lists_every_column() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        let fields = driver.describe_columns(&conn, "dbo", "invoices").await.unwrap();
        let lines: Vec<&str> = fields.lines().collect();
        assert_eq!(
            lines,
            vec![
                "dbo.invoices, id",
                "dbo.invoices, customer",
                "dbo.invoices, amount",
                "dbo.invoices, note",
            ]
        );
    }

    #[tokio::test]
    async fn test_describe_unknown_table_is_not_found() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        let err = driver.describe_columns(&conn, "main", "missing").await.unwrap_err();
        assert!(matches!(err, ParleyError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_describe_rejects_bad_identifier() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        let err = driver
            .describe_columns(&conn, "main", "invoices; DROP TABLE invoices")
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Storage(_)));
    }

    #[tokio::test]
    async fn test_execute_renders_rows() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        let data = driver
            .execute(&conn, "SELECT customer, amount, note FROM invoices ORDER BY id")
            .await
            .unwrap();
        assert_eq!(data, "Acme, 120.5, \nGlobex, 80, late\n");
    }

    #[tokio::test]
    async fn test_execute_empty_result() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        let data = driver
            .execute(&conn, "SELECT * FROM invoices WHERE amount > 1000")
            .await
            .unwrap();
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn test_execute_invalid_sql_errors() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        assert!(driver.execute(&conn, "SELEC nonsense").await.is_err());
    }

    #[tokio::test]
    async fn test_execute_is_read_only() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        assert!(driver.execute(&conn, "DELETE FROM invoices").await.is_err());
        let data = driver.execute(&conn, "SELECT COUNT(*) FROM invoices").await.unwrap();
        assert_eq!(data, "2\n");
    }

    #[tokio::test]
    async fn test_can_connect() {
        let (_dir, conn) = seeded_db();
        let driver = SqliteDriver::new();
        assert!(driver.can_connect(&conn).await);
        assert!(!driver.can_connect("/nonexistent/db.sqlite").await);
    }

    #[test]
    fn test_database_path_prefixes() {
        assert_eq!(database_path("sqlite://data/a.db"), PathBuf::from("data/a.db"));
        assert_eq!(database_path("Data Source=a.db;"), PathBuf::from("a.db"));
        assert_eq!(database_path(" a.db "), PathBuf::from("a.db"));
    }

    #[test]
    fn test_sqlite_schema_mapping() {
        assert_eq!(sqlite_schema("dbo"), "main");
        assert_eq!(sqlite_schema(""), "main");
        assert_eq!(sqlite_schema("archive"), "archive");
    }

    #[test]
    fn test_render_value() {
        assert_eq!(render_value(ValueRef::Null), "");
        assert_eq!(render_value(ValueRef::Integer(3)), "3");
        assert_eq!(render_value(ValueRef::Text(b"abc")), "abc");
        assert_eq!(render_value(ValueRef::Blob(&[1, 2])), "<2 bytes>");
    }
}
