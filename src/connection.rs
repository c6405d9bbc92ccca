use std::path::Path;

use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{ToSql, params_from_iter};

use crate::errors::DbError;
use crate::types::{SqlValue, Statement};

/// The engine boundary: runs already-compiled statements.
///
/// Implementations buffer query results fully, so callers never hold a live engine cursor.
pub trait Connection {
    /// Runs a query and returns every row.
    ///
    /// # Errors
    /// Returns `ExecutionError` carrying the engine error.
    fn query(&self, stmt: &Statement) -> Result<Vec<Vec<SqlValue>>, DbError>;

    /// Runs a statement and returns the number of affected rows.
    ///
    /// # Errors
    /// Returns `ExecutionError` carrying the engine error.
    fn execute(&self, stmt: &Statement) -> Result<u64, DbError>;
}

/// A SQLite connection through rusqlite's bundled engine, which ships the JSON1 functions.
#[derive(Debug)]
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// # Errors
    /// Returns `ExecutionError` when the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = rusqlite::Connection::open(path.as_ref())?;
        log::debug!("opened sqlite database at {}", path.as_ref().display());
        Ok(Self { conn })
    }

    /// # Errors
    /// Returns `ExecutionError` when the engine cannot allocate a database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    #[must_use]
    pub const fn from_raw(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// The underlying handle, for statements outside the document model.
    #[must_use]
    pub const fn raw(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl Connection for SqliteConnection {
    fn query(&self, stmt: &Statement) -> Result<Vec<Vec<SqlValue>>, DbError> {
        let mut prepared = self.conn.prepare(&stmt.sql)?;
        let width = prepared.column_count();
        let mut rows = prepared.query(params_from_iter(stmt.params.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_sqlite(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&self, stmt: &Statement) -> Result<u64, DbError> {
        let n = self.conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(u64::try_from(n).unwrap_or(u64::MAX))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(SqliteValue::Null),
            Self::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Self::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

/// Blobs are read as text; the decoder rejects anything that is not a JSON object.
fn from_sqlite(v: ValueRef<'_>) -> SqlValue {
    match v {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(b) | ValueRef::Blob(b) => match std::str::from_utf8(b) {
            Ok(s) => SqlValue::Text(s.to_owned()),
            Err(_) => SqlValue::Blob(b.to_vec()),
        },
    }
}
