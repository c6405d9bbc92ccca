use serde_json::{Map, Value};

/// A stored document: an ordered JSON object. Every stored document carries a string `_id`.
pub type Document = Map<String, Value>;

/// The opaque 24-hex-character identifier stored under `_id`.
pub type DocumentId = String;

pub const ID_FIELD: &str = "_id";

/// A value crossing the SQL boundary, either as a bound parameter or as a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Column bytes that are not valid UTF-8.
    Blob(Vec<u8>),
}

impl SqlValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// SQL text plus its positional parameters. Values never appear inside `sql`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}
