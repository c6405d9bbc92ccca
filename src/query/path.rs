use std::fmt;

use crate::dialect::Dialect;
use crate::errors::DbError;

use super::types::MAX_PATH_DEPTH;

/// A validated dotted field path such as `address.city`.
///
/// Segments are non-empty and never contain the separator, a double quote, a backslash or a
/// control character, so every dialect can embed them in a quoted path literal after doubling
/// single quotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// # Errors
    /// Returns `CompilationError` for empty paths, empty segments, paths deeper than
    /// `MAX_PATH_DEPTH`, operator-looking names or characters no dialect can quote.
    pub fn parse(path: &str) -> Result<Self, DbError> {
        if path.is_empty() {
            return Err(DbError::compile("field path must not be empty"));
        }
        if path.starts_with('$') {
            return Err(DbError::compile(format!("unknown operator or invalid field path: {path}")));
        }
        let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
        if segments.len() > MAX_PATH_DEPTH {
            return Err(DbError::compile(format!(
                "field path '{path}' exceeds {MAX_PATH_DEPTH} segments"
            )));
        }
        for seg in &segments {
            if seg.is_empty() {
                return Err(DbError::compile(format!("field path '{path}' has an empty segment")));
            }
            if seg.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
                return Err(DbError::compile(format!(
                    "field path '{path}' contains a character that cannot be quoted"
                )));
            }
        }
        Ok(Self {
            raw: path.to_owned(),
            segments,
        })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Compiles `path` into the dialect's expression extracting that JSON value from the
/// document column. Missing values at any level evaluate to SQL NULL.
///
/// # Errors
/// Returns `CompilationError` when the dialect has no JSON path extraction.
pub fn compile_path(dialect: &dyn Dialect, path: &FieldPath) -> Result<String, DbError> {
    let column = dialect.document_column();
    dialect.extract(&column, path).ok_or_else(|| {
        DbError::compile(format!("dialect '{}' cannot extract JSON paths", dialect.kind()))
    })
}

/// `'$."a"."b"'` with single quotes doubled for the SQL string literal.
pub(crate) fn json_path_literal(path: &FieldPath) -> String {
    let mut out = String::from("'$");
    for seg in path.segments() {
        out.push_str(".\"");
        out.push_str(&seg.replace('\'', "''"));
        out.push('"');
    }
    out.push('\'');
    out
}

pub(crate) fn sql_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectKind, SqliteDialect};

    #[test]
    fn parses_dotted_segments() {
        let p = FieldPath::parse("a.b.c").unwrap();
        assert_eq!(p.segments(), &["a", "b", "c"]);
        assert_eq!(p.to_string(), "a.b.c");
    }

    #[test]
    fn rejects_malformed_paths() {
        for bad in ["", "a..b", ".a", "a.", "$gt", "a\"b", "a\\b"] {
            assert!(
                matches!(FieldPath::parse(bad), Err(DbError::CompilationError(_))),
                "accepted {bad:?}"
            );
        }
        let deep = vec!["x"; MAX_PATH_DEPTH + 1].join(".");
        assert!(FieldPath::parse(&deep).is_err());
    }

    #[test]
    fn single_quotes_cannot_escape_the_literal() {
        let p = FieldPath::parse("it's').x").unwrap();
        assert_eq!(json_path_literal(&p), "'$.\"it''s'')\".\"x\"'");
        let sql = compile_path(&SqliteDialect, &p).unwrap();
        assert_eq!(sql, "json_extract(\"document\", '$.\"it''s'')\".\"x\"')");
    }

    #[test]
    fn text_dialect_has_no_extraction() {
        let p = FieldPath::parse("a").unwrap();
        let d = DialectKind::Text.dialect();
        assert!(matches!(compile_path(d.as_ref(), &p), Err(DbError::CompilationError(_))));
    }
}
