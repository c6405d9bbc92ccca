//! MongoDB-style document operations over a single JSON column per table.
//!
//! Match documents compile to parameterized SQL for the configured [`dialect::Dialect`];
//! predicate closures and dialects without JSON paths fall back to scanning with in-process
//! evaluation. Both paths share one [`query::Condition`] tree and agree on results.

pub mod collection;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod document;
pub mod errors;
pub mod id;
pub mod logger;
pub mod query;
pub mod types;
pub mod utils;

use std::path::Path;
use std::sync::Arc;

use crate::collection::Collection;
use crate::config::DocSqlConfig;
use crate::connection::{Connection, SqliteConnection};
use crate::dialect::{Dialect, DialectKind};
use crate::errors::DbError;
use crate::id::{IdGenerator, ObjectIdGenerator};

pub use crate::query::{Cursor, Filter, FindOptions, Order, Projection, SortSpec};
pub use crate::types::{Document, DocumentId};

/// A connection plus the dialect used to talk to it.
pub struct Database {
    conn: Box<dyn Connection>,
    dialect: Arc<dyn Dialect>,
    ids: Arc<dyn IdGenerator>,
}

impl Database {
    /// Opens (or creates) a SQLite database file.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the file cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        Ok(Self::with_connection(
            Box::new(SqliteConnection::open(path)?),
            DialectKind::Sqlite.dialect(),
        ))
    }

    /// # Errors
    /// Returns `ExecutionError` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::with_connection(
            Box::new(SqliteConnection::open_in_memory()?),
            DialectKind::Sqlite.dialect(),
        ))
    }

    /// Opens the built-in SQLite backend described by `cfg`.
    ///
    /// # Errors
    /// Returns `UnsupportedDialect` for dialects that need a caller-supplied connection.
    pub fn from_config(cfg: &DocSqlConfig) -> Result<Self, DbError> {
        if cfg.dialect != DialectKind::Sqlite {
            return Err(DbError::UnsupportedDialect(format!(
                "{} requires a caller-supplied connection (Database::with_connection)",
                cfg.dialect
            )));
        }
        match &cfg.database {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    /// Wraps any engine connection. The caller is responsible for `dialect` matching it.
    #[must_use]
    pub fn with_connection(conn: Box<dyn Connection>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            conn,
            dialect,
            ids: Arc::new(ObjectIdGenerator::new()),
        }
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Returns the collection `name`, creating its table if needed.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the create statement fails.
    pub fn collection(&self, name: &str) -> Result<Collection<'_>, DbError> {
        Collection::new(self.conn.as_ref(), self.dialect.clone(), name, self.ids.clone())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("dialect", &self.dialect.kind()).finish_non_exhaustive()
    }
}
