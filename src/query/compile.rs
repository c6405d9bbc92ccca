use crate::dialect::Dialect;
use crate::errors::DbError;
use crate::types::{SqlValue, Statement};

use super::path::{FieldPath, compile_path};
use super::parse::parse_match;
use super::types::{Condition, Filter, Scalar, ValueKind};

/// Accumulates SQL text and positional parameters for one statement.
///
/// Placeholders are numbered in bind order, so fragments must be pushed in the order they
/// appear in the final text.
pub struct SqlBuilder<'d> {
    dialect: &'d dyn Dialect,
    sql: String,
    params: Vec<SqlValue>,
}

impl<'d> SqlBuilder<'d> {
    #[must_use]
    pub fn new(dialect: &'d dyn Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    pub fn push(&mut self, s: &str) -> &mut Self {
        self.sql.push_str(s);
        self
    }

    /// Binds a plain value and returns its placeholder.
    pub fn bind(&mut self, v: SqlValue) -> String {
        self.params.push(v);
        self.dialect.placeholder(self.params.len())
    }

    /// Binds a JSON literal for comparison with an extracted value.
    pub fn bind_literal(&mut self, v: &Scalar) -> String {
        self.params.push(self.dialect.bind_literal(v));
        self.dialect.literal_placeholder(self.params.len())
    }

    /// Binds serialized document text destined for the document column.
    pub fn bind_document(&mut self, text: String) -> String {
        self.params.push(SqlValue::Text(text));
        self.dialect.document_placeholder(self.params.len())
    }

    #[must_use]
    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// A SQL boolean expression and the parameters it binds, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl CompiledPredicate {
    /// The always-true predicate of the empty match document.
    #[must_use]
    pub fn always_true() -> Self {
        Self {
            sql: "1 = 1".to_owned(),
            params: Vec::new(),
        }
    }
}

/// Compiles a filter into a standalone predicate whose placeholders start at 1.
///
/// Returns `Ok(None)` when the filter is not representable in SQL: a predicate function, or a
/// match document on a dialect without JSON paths. Match documents are validated either way.
///
/// # Errors
/// Returns `CompilationError` for malformed match documents.
pub fn compile_filter(
    dialect: &dyn Dialect,
    filter: &Filter,
) -> Result<Option<CompiledPredicate>, DbError> {
    let Filter::Declarative(doc) = filter else {
        return Ok(None);
    };
    let cond = parse_match(doc)?;
    if !dialect.supports_json_paths() {
        return Ok(None);
    }
    let mut b = SqlBuilder::new(dialect);
    let sql = render_condition(&mut b, &cond)?;
    let Statement { params, .. } = b.finish();
    Ok(Some(CompiledPredicate { sql, params }))
}

/// Renders `cond` as a boolean expression, binding literals into `b` in textual order.
///
/// The returned text is not pushed into `b`; callers place it where it belongs.
///
/// # Errors
/// Returns `CompilationError` when the dialect lacks a capability the condition needs.
pub fn render_condition(b: &mut SqlBuilder<'_>, cond: &Condition) -> Result<String, DbError> {
    let dialect = b.dialect();
    let column = dialect.document_column();
    Ok(match cond {
        Condition::True => "1 = 1".to_owned(),
        Condition::And(cs) if cs.is_empty() => "1 = 1".to_owned(),
        Condition::Or(cs) if cs.is_empty() => "1 = 0".to_owned(),
        Condition::And(cs) => join(b, cs, " AND ")?,
        Condition::Or(cs) => join(b, cs, " OR ")?,
        // COALESCE keeps NOT two-valued when the inner test is NULL on a missing field.
        Condition::Not(c) => format!("NOT COALESCE({}, FALSE)", render_condition(b, c)?),
        Condition::Exists { path, exists } => {
            let check = capability(dialect.exists_check(&column, path), dialect, "$exists")?;
            if *exists { check } else { format!("NOT ({check})") }
        }
        Condition::IsNull { path } => {
            capability(dialect.null_check(&column, path), dialect, "null match")?
        }
        Condition::Cmp { path, op, value } => {
            let x = compile_path(dialect, path)?;
            let guard = type_guard(dialect, &column, path, value)?;
            let p = b.bind_literal(value);
            format!("({guard} AND {x} {} {p})", op.sql())
        }
        Condition::In { path, values } => render_in(b, &column, path, values)?,
    })
}

fn join(b: &mut SqlBuilder<'_>, cs: &[Condition], sep: &str) -> Result<String, DbError> {
    let parts = cs
        .iter()
        .map(|c| render_condition(b, c))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("({})", parts.join(sep)))
}

/// `$in` groups literals by type class so each group is guarded like a comparison.
fn render_in(
    b: &mut SqlBuilder<'_>,
    column: &str,
    path: &FieldPath,
    values: &[Scalar],
) -> Result<String, DbError> {
    if values.is_empty() {
        return Ok("1 = 0".to_owned());
    }
    let dialect = b.dialect();
    let mut alternatives = Vec::new();
    if values.iter().any(|v| *v == Scalar::Null) {
        alternatives.push(capability(dialect.null_check(column, path), dialect, "null match")?);
    }
    let mut kinds: Vec<ValueKind> = Vec::new();
    for k in values.iter().filter_map(Scalar::kind) {
        if !kinds.contains(&k) {
            kinds.push(k);
        }
    }
    let x = compile_path(dialect, path)?;
    for kind in kinds {
        let guard = capability(dialect.type_guard(column, path, kind), dialect, "type check")?;
        let placeholders: Vec<String> = values
            .iter()
            .filter(|v| v.kind() == Some(kind))
            .map(|v| b.bind_literal(v))
            .collect();
        alternatives.push(format!("({guard} AND {x} IN ({}))", placeholders.join(", ")));
    }
    Ok(format!("({})", alternatives.join(" OR ")))
}

fn type_guard(
    dialect: &dyn Dialect,
    column: &str,
    path: &FieldPath,
    value: &Scalar,
) -> Result<String, DbError> {
    let kind = value
        .kind()
        .ok_or_else(|| DbError::compile(format!("cannot compare '{path}' against null")))?;
    capability(dialect.type_guard(column, path, kind), dialect, "type check")
}

fn capability(expr: Option<String>, dialect: &dyn Dialect, what: &str) -> Result<String, DbError> {
    expr.ok_or_else(|| {
        DbError::compile(format!(
            "dialect '{}' does not support {what}",
            dialect.kind()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{DialectKind, MySqlDialect, PostgresDialect, SqliteDialect};
    use serde_json::{Value, json};

    fn filter(v: Value) -> Filter {
        Filter::from_json(v).unwrap()
    }

    fn compile(d: &dyn Dialect, v: Value) -> CompiledPredicate {
        compile_filter(d, &filter(v)).unwrap().unwrap()
    }

    #[test]
    fn empty_filter_is_always_true() {
        assert_eq!(compile(&SqliteDialect, json!({})), CompiledPredicate::always_true());
    }

    #[test]
    fn literals_are_bound_never_inlined() {
        let c = compile(
            &SqliteDialect,
            json!({"name": "x'; DROP TABLE t; --", "age": {"$gt": 6}}),
        );
        assert!(!c.sql.contains("DROP"));
        assert_eq!(
            c.params,
            vec![SqlValue::Text("x'; DROP TABLE t; --".into()), SqlValue::Integer(6)]
        );
        assert_eq!(
            c.sql,
            "((json_type(\"document\", '$.\"name\"') IN ('text') \
             AND json_extract(\"document\", '$.\"name\"') = ?) \
             AND (json_type(\"document\", '$.\"age\"') IN ('integer', 'real') \
             AND json_extract(\"document\", '$.\"age\"') > ?))"
        );
    }

    #[test]
    fn in_and_nin_edge_cases() {
        assert_eq!(compile(&SqliteDialect, json!({"a": {"$in": []}})).sql, "1 = 0");
        assert_eq!(
            compile(&SqliteDialect, json!({"a": {"$nin": []}})).sql,
            "NOT COALESCE(1 = 0, FALSE)"
        );
        let c = compile(&SqliteDialect, json!({"a": {"$in": [1, "x", 2, null]}}));
        assert_eq!(
            c.params,
            vec![
                SqlValue::Integer(1),
                SqlValue::Integer(2),
                SqlValue::Text("x".into())
            ]
        );
        assert!(c.sql.starts_with("(json_extract(\"document\", '$.\"a\"') IS NULL OR "));
    }

    #[test]
    fn postgres_numbers_placeholders_in_order() {
        let c = compile(&PostgresDialect, json!({"$or": [{"a": 1}, {"b": {"$in": ["x", "y"]}}]}));
        let first = c.sql.find("$1").unwrap();
        let second = c.sql.find("$2").unwrap();
        let third = c.sql.find("$3").unwrap();
        assert!(first < second && second < third, "{}", c.sql);
        assert_eq!(c.params[0], SqlValue::Text("1".into()));
        assert_eq!(c.params[2], SqlValue::Text("\"y\"".into()));
    }

    #[test]
    fn mysql_casts_literals_to_json() {
        let c = compile(&MySqlDialect, json!({"flag": true}));
        assert!(c.sql.contains("= CAST(? AS JSON)"), "{}", c.sql);
        assert_eq!(c.params, vec![SqlValue::Text("true".into())]);
    }

    #[test]
    fn not_representable_cases() {
        let pred = Filter::predicate(|_| true);
        assert!(compile_filter(&SqliteDialect, &pred).unwrap().is_none());
        let text = DialectKind::Text.dialect();
        assert!(compile_filter(text.as_ref(), &filter(json!({"a": 1}))).unwrap().is_none());
        assert!(compile_filter(text.as_ref(), &filter(json!({"a": {"$bogus": 1}}))).is_err());
    }

    #[test]
    fn unknown_operator_fails() {
        let err = compile_filter(&SqliteDialect, &filter(json!({"a": {"$size": 2}}))).unwrap_err();
        assert!(matches!(err, DbError::CompilationError(ref m) if m.contains("$size")));
    }
}
