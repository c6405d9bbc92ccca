use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Unsupported operator or malformed filter/update document. Raised before any statement runs.
    #[error("Compilation error: {0}")]
    CompilationError(String),

    /// A stored row does not hold a JSON object.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The engine rejected a statement; the engine's own error is kept as the source.
    #[error("Execution error: {0}")]
    ExecutionError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(String),

    /// An insert carried an `_id` already stored in the collection.
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

impl DbError {
    pub(crate) fn compile(msg: impl Into<String>) -> Self {
        Self::CompilationError(msg.into())
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        Self::ExecutionError(Box::new(e))
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<toml::de::Error> for DbError {
    fn from(e: toml::de::Error) -> Self {
        Self::ConfigError(e.to_string())
    }
}
