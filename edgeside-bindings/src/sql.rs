//! SQLite-backed SQL bindings.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql, params_from_iter};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// One result row, keyed by column name.
pub type SqlRow = Map<String, Value>;

/// A SQL database binding.
///
/// File-backed databases run in WAL mode so a writer does not block readers.
/// An in-memory database lives exactly as long as the binding and suits the
/// throwaway state the gallery workers want. Statements run on the blocking
/// pool, one at a time per database.
#[derive(Clone, Debug)]
pub struct SqlDatabase {
    conn: Arc<Mutex<Connection>>,
}

/// Errors opening a database or executing statements against it.
#[derive(Debug, Error)]
pub enum SqlError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("failed to open in-memory database: {0}")]
    OpenInMemory(#[source] rusqlite::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("column `{column}` holds a blob, which has no json representation")]
    BlobColumn { column: String },
    #[error("database task did not complete")]
    Background,
}

impl SqlDatabase {
    /// Opens (creating if needed) a file-backed database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqlError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| SqlError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path).map_err(|source| SqlError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, SqlError> {
        let conn = Connection::open_in_memory().map_err(SqlError::OpenInMemory)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs a batch of semicolon-separated statements synchronously.
    ///
    /// Meant for schema setup and seeding at worker construction time, before
    /// the runtime starts serving; request handlers should use
    /// [`prepare`](SqlDatabase::prepare) instead.
    pub fn execute_batch(&self, sql: &str) -> Result<(), SqlError> {
        lock(&self.conn).execute_batch(sql)?;
        Ok(())
    }

    /// Starts building a statement with positional (`?1`, `?2`, ...)
    /// parameters.
    pub fn prepare(&self, sql: impl Into<String>) -> SqlStatement {
        SqlStatement {
            conn: self.conn.clone(),
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// A statement plus its bound parameters, ready to execute.
#[derive(Debug)]
pub struct SqlStatement {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlStatement {
    /// Appends the next positional parameter.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// Executes the statement and returns every result row.
    pub async fn all(self) -> Result<Vec<SqlRow>, SqlError> {
        let Self { conn, sql, params } = self;
        run_blocking(move || {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(&sql)?;
            let columns = column_names(&stmt);
            let mut rows = stmt.query(params_from_iter(params))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(row_to_json(&columns, row)?);
            }
            Ok(out)
        })
        .await
    }

    /// Executes the statement and returns the first row, if any.
    pub async fn first(self) -> Result<Option<SqlRow>, SqlError> {
        let Self { conn, sql, params } = self;
        run_blocking(move || {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(&sql)?;
            let columns = column_names(&stmt);
            let mut rows = stmt.query(params_from_iter(params))?;
            match rows.next()? {
                Some(row) => Ok(Some(row_to_json(&columns, row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Executes a statement that returns no rows; yields the count of rows
    /// changed.
    pub async fn run(self) -> Result<usize, SqlError> {
        let Self { conn, sql, params } = self;
        run_blocking(move || {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(&sql)?;
            Ok(stmt.execute(params_from_iter(params))?)
        })
        .await
    }
}

/// A parameter value accepted by [`SqlStatement::bind`].
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            SqlValue::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            SqlValue::Real(value) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*value)),
            SqlValue::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Integer(value.into())
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Integer(value.into())
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(value.into())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => SqlValue::Null,
        }
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, SqlError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SqlError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|_| SqlError::Background)?
}

fn lock(conn: &Arc<Mutex<Connection>>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names()
        .iter()
        .map(|name| (*name).to_owned())
        .collect()
}

fn row_to_json(columns: &[String], row: &rusqlite::Row<'_>) -> Result<SqlRow, SqlError> {
    let mut object = Map::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let value = match row.get_ref(index)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(value) => Value::Number(value.into()),
            ValueRef::Real(value) => Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(_) => {
                return Err(SqlError::BlobColumn {
                    column: column.clone(),
                });
            }
        };
        object.insert(column.clone(), value);
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "
        CREATE TABLE people (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            score REAL
        );
    ";

    #[tokio::test]
    async fn insert_and_query_round_trip() {
        let db = SqlDatabase::in_memory().expect("open");
        db.execute_batch(SCHEMA).expect("schema");

        let changed = db
            .prepare("INSERT INTO people (name, score) VALUES (?1, ?2)")
            .bind("alice")
            .bind(9.5)
            .run()
            .await
            .expect("insert");
        assert_eq!(changed, 1);

        let row = db
            .prepare("SELECT id, name, score FROM people WHERE name = ?1")
            .bind("alice")
            .first()
            .await
            .expect("select")
            .expect("row");
        assert_eq!(row["id"], 1);
        assert_eq!(row["name"], "alice");
        assert_eq!(row["score"], 9.5);
    }

    #[tokio::test]
    async fn all_returns_every_row() {
        let db = SqlDatabase::in_memory().expect("open");
        db.execute_batch(SCHEMA).expect("schema");
        for name in ["a", "b", "c"] {
            db.prepare("INSERT INTO people (name) VALUES (?1)")
                .bind(name)
                .run()
                .await
                .expect("insert");
        }

        let rows = db
            .prepare("SELECT name FROM people ORDER BY name")
            .all()
            .await
            .expect("select");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], "a");
        assert_eq!(rows[2]["name"], "c");
    }

    #[tokio::test]
    async fn first_on_empty_result_is_none() {
        let db = SqlDatabase::in_memory().expect("open");
        db.execute_batch(SCHEMA).expect("schema");
        let row = db
            .prepare("SELECT * FROM people WHERE id = ?1")
            .bind(42)
            .first()
            .await
            .expect("select");
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn null_binds_and_reads_back() {
        let db = SqlDatabase::in_memory().expect("open");
        db.execute_batch(SCHEMA).expect("schema");
        db.prepare("INSERT INTO people (name, score) VALUES (?1, ?2)")
            .bind("bob")
            .bind(Option::<f64>::None)
            .run()
            .await
            .expect("insert");

        let row = db
            .prepare("SELECT score FROM people WHERE name = ?1")
            .bind("bob")
            .first()
            .await
            .expect("select")
            .expect("row");
        assert_eq!(row["score"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn blob_columns_are_rejected() {
        let db = SqlDatabase::in_memory().expect("open");
        db.execute_batch("CREATE TABLE raw (data BLOB);")
            .expect("schema");
        db.prepare("INSERT INTO raw (data) VALUES (X'DEADBEEF')")
            .run()
            .await
            .expect("insert");

        let result = db.prepare("SELECT data FROM raw").all().await;
        assert!(matches!(result, Err(SqlError::BlobColumn { column }) if column == "data"));
    }

    #[tokio::test]
    async fn file_backed_database_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("data.db");

        let db = SqlDatabase::open(&path).expect("open");
        db.execute_batch(SCHEMA).expect("schema");
        db.prepare("INSERT INTO people (name) VALUES (?1)")
            .bind("carol")
            .run()
            .await
            .expect("insert");
        drop(db);

        let db = SqlDatabase::open(&path).expect("reopen");
        let row = db
            .prepare("SELECT name FROM people")
            .first()
            .await
            .expect("select")
            .expect("row");
        assert_eq!(row["name"], "carol");
    }

    #[test]
    fn sql_error_is_invalid_statement() {
        let db = SqlDatabase::in_memory().expect("open");
        assert!(matches!(
            db.execute_batch("NOT VALID SQL"),
            Err(SqlError::Sqlite(_))
        ));
    }
}
