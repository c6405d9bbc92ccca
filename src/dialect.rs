//! Per-engine SQL syntax: JSON path extraction, identifier quoting, placeholders, DDL and the
//! optional merge-patch expression.
//!
//! Dialects are stateless templates. A capability an engine lacks is reported as `None` and the
//! callers degrade (for example to in-process evaluation) instead of guessing.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::DbError;
use crate::query::path::{FieldPath, json_path_literal, sql_string_literal};
use crate::query::types::{Order, Scalar, ValueKind};
use crate::types::SqlValue;

/// Name of the single column holding the serialized document.
pub const DOCUMENT_COLUMN: &str = "document";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Sqlite,
    Mysql,
    Postgres,
    Text,
}

impl DialectKind {
    #[must_use]
    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            Self::Sqlite => Arc::new(SqliteDialect),
            Self::Mysql => Arc::new(MySqlDialect),
            Self::Postgres => Arc::new(PostgresDialect),
            Self::Text => Arc::new(TextDialect),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgres",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = DbError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "text" => Ok(Self::Text),
            other => Err(DbError::UnsupportedDialect(other.to_owned())),
        }
    }
}

pub trait Dialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Quotes an identifier, doubling any embedded quote character.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quoted name of the document column.
    fn document_column(&self) -> String {
        self.quote_identifier(DOCUMENT_COLUMN)
    }

    /// Positional placeholder for parameter `index` (1-based).
    fn placeholder(&self, _index: usize) -> String {
        "?".to_owned()
    }

    /// Placeholder for a JSON literal compared against an extracted value.
    fn literal_placeholder(&self, index: usize) -> String {
        self.placeholder(index)
    }

    /// Placeholder for a whole serialized document written to the document column.
    fn document_placeholder(&self, index: usize) -> String {
        self.placeholder(index)
    }

    /// Parameter value for a JSON literal, paired with `literal_placeholder`.
    fn bind_literal(&self, value: &Scalar) -> SqlValue;

    /// Expression selecting the document column as text.
    fn select_document(&self) -> String {
        self.document_column()
    }

    /// Whether `extract` and the checks built on it are available.
    fn supports_json_paths(&self) -> bool {
        true
    }

    /// Expression extracting `path` from `column`; SQL NULL when absent.
    fn extract(&self, column: &str, path: &FieldPath) -> Option<String>;

    /// Boolean expression that is true when the value at `path` has JSON type `kind`.
    fn type_guard(&self, column: &str, path: &FieldPath, kind: ValueKind) -> Option<String>;

    /// Boolean expression that is true when `path` is missing or holds JSON null.
    fn null_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        self.extract(column, path).map(|x| format!("{x} IS NULL"))
    }

    /// Boolean expression that is true when `path` is present, JSON null included.
    fn exists_check(&self, column: &str, path: &FieldPath) -> Option<String>;

    fn order_term(&self, expr: &str, order: Order) -> String {
        match order {
            Order::Asc => format!("{expr} ASC"),
            Order::Desc => format!("{expr} DESC"),
        }
    }

    /// Column reflecting insertion order, used as the final sort key.
    fn insertion_order(&self) -> Option<&'static str> {
        None
    }

    /// Renders LIMIT/OFFSET from already-rendered placeholders. Empty when both are absent.
    fn limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> String;

    /// Idempotent DDL for a collection table. `table` is already quoted.
    fn create_table(&self, table: &str) -> String;

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table}")
    }

    /// Expression merging the JSON object bound at `placeholder` over the stored document.
    fn merge_patch(&self, _column: &str, _placeholder: &str) -> Option<String> {
        None
    }
}

fn quote_with(ident: &str, q: char) -> String {
    let doubled: String = [q, q].iter().collect();
    format!("{q}{}{q}", ident.replace(q, &doubled))
}

fn sqlite_bind(value: &Scalar) -> SqlValue {
    match value {
        Scalar::Null => SqlValue::Null,
        Scalar::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Scalar::Number(n) => n
            .as_i64()
            .map(SqlValue::Integer)
            .or_else(|| n.as_f64().map(SqlValue::Real))
            .unwrap_or(SqlValue::Null),
        Scalar::String(s) => SqlValue::Text(s.clone()),
    }
}

fn json_text_bind(value: &Scalar) -> SqlValue {
    SqlValue::Text(value.to_json().to_string())
}

fn sqlite_style_limit(limit: Option<&str>, offset: Option<&str>, unbounded: &str) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(l), None) => format!("LIMIT {l}"),
        (l, Some(o)) => format!("LIMIT {} OFFSET {o}", l.unwrap_or(unbounded)),
    }
}

/// SQLite with the built-in JSON functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn bind_literal(&self, value: &Scalar) -> SqlValue {
        sqlite_bind(value)
    }

    fn extract(&self, column: &str, path: &FieldPath) -> Option<String> {
        Some(format!("json_extract({column}, {})", json_path_literal(path)))
    }

    fn type_guard(&self, column: &str, path: &FieldPath, kind: ValueKind) -> Option<String> {
        let names = match kind {
            ValueKind::Number => "'integer', 'real'",
            ValueKind::String => "'text'",
            ValueKind::Bool => "'true', 'false'",
        };
        Some(format!("json_type({column}, {}) IN ({names})", json_path_literal(path)))
    }

    fn exists_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        Some(format!("json_type({column}, {}) IS NOT NULL", json_path_literal(path)))
    }

    fn insertion_order(&self) -> Option<&'static str> {
        Some("rowid")
    }

    fn limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> String {
        sqlite_style_limit(limit, offset, "-1")
    }

    fn create_table(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({} TEXT NOT NULL)", self.document_column())
    }

    fn merge_patch(&self, column: &str, placeholder: &str) -> Option<String> {
        Some(format!("json_patch({column}, {placeholder})"))
    }
}

/// MySQL 5.7+/8 with a native JSON column.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Mysql
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '`')
    }

    fn literal_placeholder(&self, index: usize) -> String {
        format!("CAST({} AS JSON)", self.placeholder(index))
    }

    fn bind_literal(&self, value: &Scalar) -> SqlValue {
        json_text_bind(value)
    }

    fn extract(&self, column: &str, path: &FieldPath) -> Option<String> {
        Some(format!("JSON_EXTRACT({column}, {})", json_path_literal(path)))
    }

    fn type_guard(&self, column: &str, path: &FieldPath, kind: ValueKind) -> Option<String> {
        let names = match kind {
            ValueKind::Number => "'INTEGER', 'UNSIGNED INTEGER', 'DOUBLE', 'DECIMAL'",
            ValueKind::String => "'STRING'",
            ValueKind::Bool => "'BOOLEAN'",
        };
        let x = self.extract(column, path)?;
        Some(format!("JSON_TYPE({x}) IN ({names})"))
    }

    fn null_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        let x = self.extract(column, path)?;
        Some(format!("COALESCE(JSON_TYPE({x}), 'NULL') = 'NULL'"))
    }

    fn exists_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        Some(format!("JSON_CONTAINS_PATH({column}, 'one', {})", json_path_literal(path)))
    }

    fn limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> String {
        sqlite_style_limit(limit, offset, "18446744073709551615")
    }

    fn create_table(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({} JSON NOT NULL)", self.document_column())
    }

    fn merge_patch(&self, column: &str, placeholder: &str) -> Option<String> {
        Some(format!("JSON_MERGE_PATCH({column}, {placeholder})"))
    }
}

/// PostgreSQL with a JSONB column.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn literal_placeholder(&self, index: usize) -> String {
        format!("CAST(${index} AS JSONB)")
    }

    fn document_placeholder(&self, index: usize) -> String {
        format!("CAST(${index} AS JSONB)")
    }

    fn bind_literal(&self, value: &Scalar) -> SqlValue {
        json_text_bind(value)
    }

    fn select_document(&self) -> String {
        format!("CAST({} AS TEXT)", self.document_column())
    }

    fn extract(&self, column: &str, path: &FieldPath) -> Option<String> {
        let mut out = format!("({column}");
        for seg in path.segments() {
            out.push_str(" -> ");
            out.push_str(&sql_string_literal(seg));
        }
        out.push(')');
        Some(out)
    }

    fn type_guard(&self, column: &str, path: &FieldPath, kind: ValueKind) -> Option<String> {
        let name = match kind {
            ValueKind::Number => "'number'",
            ValueKind::String => "'string'",
            ValueKind::Bool => "'boolean'",
        };
        let x = self.extract(column, path)?;
        Some(format!("jsonb_typeof({x}) = {name}"))
    }

    fn null_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        let x = self.extract(column, path)?;
        Some(format!("COALESCE(jsonb_typeof({x}), 'null') = 'null'"))
    }

    fn exists_check(&self, column: &str, path: &FieldPath) -> Option<String> {
        self.extract(column, path).map(|x| format!("{x} IS NOT NULL"))
    }

    fn order_term(&self, expr: &str, order: Order) -> String {
        match order {
            Order::Asc => format!("{expr} ASC NULLS FIRST"),
            Order::Desc => format!("{expr} DESC NULLS LAST"),
        }
    }

    fn limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> String {
        let mut parts = Vec::new();
        if let Some(l) = limit {
            parts.push(format!("LIMIT {l}"));
        }
        if let Some(o) = offset {
            parts.push(format!("OFFSET {o}"));
        }
        parts.join(" ")
    }

    fn create_table(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({} JSONB NOT NULL)", self.document_column())
    }

    fn merge_patch(&self, column: &str, placeholder: &str) -> Option<String> {
        Some(format!("{column} || {placeholder}"))
    }
}

/// An engine that stores the document as opaque text and has no JSON functions.
///
/// Every declarative filter runs in process against a full scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDialect;

impl Dialect for TextDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Text
    }

    fn quote_identifier(&self, ident: &str) -> String {
        quote_with(ident, '"')
    }

    fn bind_literal(&self, value: &Scalar) -> SqlValue {
        sqlite_bind(value)
    }

    fn supports_json_paths(&self) -> bool {
        false
    }

    fn extract(&self, _column: &str, _path: &FieldPath) -> Option<String> {
        None
    }

    fn type_guard(&self, _column: &str, _path: &FieldPath, _kind: ValueKind) -> Option<String> {
        None
    }

    fn exists_check(&self, _column: &str, _path: &FieldPath) -> Option<String> {
        None
    }

    fn limit_offset(&self, limit: Option<&str>, offset: Option<&str>) -> String {
        sqlite_style_limit(limit, offset, "-1")
    }

    fn create_table(&self, table: &str) -> String {
        format!("CREATE TABLE IF NOT EXISTS {table} ({} TEXT NOT NULL)", self.document_column())
    }
}
