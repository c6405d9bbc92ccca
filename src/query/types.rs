use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::errors::DbError;
use crate::types::Document;

use super::path::FieldPath;

pub(crate) const MAX_PATH_DEPTH: usize = 32;

/// A MongoDB-style match document, e.g. `{"age": {"$gt": 6}, "name": "b"}`.
pub type MatchDocument = Map<String, Value>;

/// An opaque in-process predicate over decoded documents.
pub type PredicateFn = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// The two filter representations accepted by every collection operation.
///
/// A declarative filter is compiled to SQL when the dialect allows it; a predicate always
/// forces a full scan with in-process evaluation.
#[derive(Clone)]
pub enum Filter {
    Declarative(MatchDocument),
    Predicate(PredicateFn),
}

impl Filter {
    /// The empty match document: matches every document.
    #[must_use]
    pub fn all() -> Self {
        Self::Declarative(Map::new())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// # Errors
    /// Returns `CompilationError` unless `value` is a JSON object.
    pub fn from_json(value: Value) -> Result<Self, DbError> {
        match value {
            Value::Object(m) => Ok(Self::Declarative(m)),
            other => Err(DbError::compile(format!("filter must be a JSON object, got {other}"))),
        }
    }

    /// # Errors
    /// Returns `CompilationError` when `json` is not a JSON object.
    pub fn parse_json(json: &str) -> Result<Self, DbError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| DbError::compile(format!("malformed filter JSON: {e}")))?;
        Self::from_json(value)
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::all()
    }
}

impl From<MatchDocument> for Filter {
    fn from(m: MatchDocument) -> Self {
        Self::Declarative(m)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Declarative(m) => f.debug_tuple("Declarative").field(m).finish(),
            Self::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// JSON type classes that comparisons bracket by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    String,
    Bool,
}

/// A scalar literal taken from a match document.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    /// `None` for arrays and objects.
    #[must_use]
    pub fn from_json(v: &Value) -> Option<Self> {
        match v {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> Option<ValueKind> {
        match self {
            Self::Null => None,
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Number(_) => Some(ValueKind::Number),
            Self::String(_) => Some(ValueKind::String),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CmpOp {
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

/// A validated filter tree, shared by the SQL compiler and the in-process evaluator.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Exists { path: FieldPath, exists: bool },
    /// Missing or JSON null.
    IsNull { path: FieldPath },
    In {
        path: FieldPath,
        values: Vec<Scalar>,
    },
    Cmp {
        path: FieldPath,
        op: CmpOp,
        value: Scalar,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: Order,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: Order::Desc,
        }
    }
}

/// Fields retained in returned documents. `_id` is kept unless `include_id` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<String>,
    #[serde(default = "default_true")]
    pub include_id: bool,
}

const fn default_true() -> bool {
    true
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    #[must_use]
    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }
}

/// Options for `find`.
///
/// Semantics:
/// - `sort` keys apply in order; an empty or absent list leaves row order unspecified.
/// - `skip` discards leading rows; `limit` of `None` or `Some(0)` is unbounded.
/// - `projection` is applied last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub sort: Option<Vec<SortSpec>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub projection: Option<Projection>,
}

impl FindOptions {
    #[must_use]
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|l| *l > 0)
    }

    #[must_use]
    pub fn effective_skip(&self) -> Option<usize> {
        self.skip.filter(|s| *s > 0)
    }

    #[must_use]
    pub fn sort_specs(&self) -> &[SortSpec] {
        self.sort.as_deref().unwrap_or(&[])
    }
}

/// A parsed update document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateSpec {
    /// Plain keys merged over the stored document's top level.
    Merge(Map<String, Value>),
    /// `$set` / `$inc` / `$unset` with dotted paths.
    Operators {
        set: Vec<(FieldPath, Value)>,
        inc: Vec<(FieldPath, Number)>,
        unset: Vec<FieldPath>,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: u64,
}
