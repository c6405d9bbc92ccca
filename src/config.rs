use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::DialectKind;
use crate::errors::DbError;

/// Logging section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
    pub retention: Option<u32>,
    pub trace_sql: bool,
}

/// Runtime configuration.
///
/// Precedence: explicit values > environment > TOML file > defaults (SQLite, in-memory).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocSqlConfig {
    pub dialect: DialectKind,
    /// Database file; `None` means in-memory.
    pub database: Option<PathBuf>,
    pub log: LogConfig,
}

impl DocSqlConfig {
    /// # Errors
    /// Returns `ConfigError` for malformed TOML or unknown dialect names.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    /// Loads configuration: `path`, else `DOCSQL_CONFIG`, else `./docsql.toml` if it exists,
    /// else defaults. Environment overrides are applied on top.
    ///
    /// # Errors
    /// Returns `Io` when an explicitly named file cannot be read, `ConfigError` when a file
    /// or an environment value is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self, DbError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("DOCSQL_CONFIG").ok().map(PathBuf::from));
        let mut cfg = match explicit {
            Some(p) => Self::read_file(&p)?,
            None => {
                let local = PathBuf::from("docsql.toml");
                if local.exists() {
                    Self::read_file(&local)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self, DbError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Io(format!("cannot read config {}: {e}", path.display())))?;
        let cfg = Self::from_toml_str(&text)?;
        log::debug!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Overrides fields from `DOCSQL_DIALECT`, `DOCSQL_DB` and the `DOCSQL_LOG_*` variables.
    ///
    /// # Errors
    /// Returns `UnsupportedDialect` for an unknown `DOCSQL_DIALECT`.
    pub fn apply_env(&mut self) -> Result<(), DbError> {
        if let Ok(d) = std::env::var("DOCSQL_DIALECT") {
            self.dialect = d.parse()?;
        }
        if let Ok(p) = std::env::var("DOCSQL_DB") {
            self.database = Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("DOCSQL_LOG_DIR") {
            self.log.dir = Some(PathBuf::from(p));
        }
        if let Ok(l) = std::env::var("DOCSQL_LOG_LEVEL") {
            self.log.level = Some(l);
        }
        if let Some(r) = std::env::var("DOCSQL_LOG_RETENTION").ok().and_then(|s| s.parse().ok()) {
            self.log.retention = Some(r);
        }
        if let Ok(t) = std::env::var("DOCSQL_TRACE_SQL") {
            self.log.trace_sql = crate::logger::is_truthy(&t);
        }
        Ok(())
    }

    /// Installs the log4rs configuration described by `self.log`.
    ///
    /// # Errors
    /// Returns `ConfigError` if log4rs rejects the configuration.
    pub fn init_logging(&self) -> Result<(), DbError> {
        crate::logger::configure_logging(
            self.log.dir.as_deref(),
            self.log.level.as_deref(),
            self.log.retention,
            self.log.trace_sql,
        )
        .map_err(|e| DbError::ConfigError(e.to_string()))
    }
}
