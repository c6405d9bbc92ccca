use std::sync::Arc;

use crate::dialect::Dialect;
use crate::document;
use crate::errors::DbError;
use crate::types::{Document, ID_FIELD, SqlValue, Statement};

use super::compile::{SqlBuilder, render_condition};
use super::eval::eval_condition;
use super::parse::parse_match;
use super::path::{FieldPath, compile_path};
use super::types::{Condition, Filter, FindOptions, Order, PredicateFn, Scalar, SortSpec};

/// In-process test applied to decoded rows when the filter cannot run in SQL.
#[derive(Clone)]
pub enum RowPredicate {
    Condition(Condition),
    Callable(PredicateFn),
}

impl RowPredicate {
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::Condition(c) => eval_condition(doc, c),
            Self::Callable(f) => f(doc),
        }
    }
}

impl std::fmt::Debug for RowPredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Condition(c) => f.debug_tuple("Condition").field(c).finish(),
            Self::Callable(_) => f.write_str("Callable(<fn>)"),
        }
    }
}

/// A WHERE predicate plus, when SQL could not express the filter, the in-process test that
/// must still run on every returned row.
#[derive(Debug, Clone)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub post_filter: Option<RowPredicate>,
}

/// Projection with validated paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProjection {
    pub fields: Vec<FieldPath>,
    pub include_id: bool,
}

impl CompiledProjection {
    #[must_use]
    pub fn apply(&self, doc: &Document) -> Document {
        document::project(doc, &self.fields, self.include_id)
    }
}

#[derive(Debug, Clone)]
pub enum PlanMode {
    /// Filter, order, skip and limit all run in the engine.
    Pushdown,
    /// Every row is returned; filtering, sorting and slicing happen in process.
    Scan {
        predicate: RowPredicate,
        sort: Vec<(FieldPath, Order)>,
        skip: usize,
        limit: Option<usize>,
    },
}

/// A compiled `find`: the statement to run and what remains to do with its rows.
#[derive(Debug, Clone)]
pub struct SelectPlan {
    pub statement: Statement,
    pub mode: PlanMode,
    pub projection: Option<CompiledProjection>,
}

/// How a previously read row is addressed by a later write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKey {
    Id(String),
    /// Exact stored text, for dialects that cannot look inside the document.
    Text(String),
}

/// Composes dialect-correct statements for one engine. Stateless and cheap to clone.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    dialect: Arc<dyn Dialect>,
}

impl QueryBuilder {
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Self { dialect }
    }

    #[must_use]
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    #[must_use]
    pub fn quote_table(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Compiles the WHERE predicate for `filter` with placeholders numbered from 1.
    ///
    /// # Errors
    /// Returns `CompilationError` for malformed match documents.
    pub fn build_where(&self, filter: &Filter) -> Result<WhereClause, DbError> {
        let mut b = SqlBuilder::new(self.dialect());
        let (sql, post_filter) = self.where_into(&mut b, filter)?;
        let Statement { params, .. } = b.finish();
        Ok(WhereClause {
            sql,
            params,
            post_filter,
        })
    }

    fn where_into(
        &self,
        b: &mut SqlBuilder<'_>,
        filter: &Filter,
    ) -> Result<(String, Option<RowPredicate>), DbError> {
        match filter {
            Filter::Predicate(f) => Ok((
                "1 = 1".to_owned(),
                Some(RowPredicate::Callable(f.clone())),
            )),
            Filter::Declarative(doc) => {
                let cond = parse_match(doc)?;
                if self.dialect.supports_json_paths() {
                    Ok((render_condition(b, &cond)?, None))
                } else {
                    Ok(("1 = 1".to_owned(), Some(RowPredicate::Condition(cond))))
                }
            }
        }
    }

    /// `ORDER BY` over the compiled sort paths, or an empty string when there are no sort keys.
    ///
    /// # Errors
    /// Returns `CompilationError` for invalid paths or dialects without JSON paths.
    pub fn build_order_by(&self, sort: &[SortSpec]) -> Result<String, DbError> {
        if sort.is_empty() {
            return Ok(String::new());
        }
        let mut terms = Vec::with_capacity(sort.len() + 1);
        for (path, order) in parse_sort(sort)? {
            let expr = compile_path(self.dialect(), &path)?;
            terms.push(self.dialect.order_term(&expr, order));
        }
        // Ties keep insertion order where the engine exposes it.
        if let Some(col) = self.dialect.insertion_order() {
            terms.push(self.dialect.order_term(col, Order::Asc));
        }
        Ok(format!("ORDER BY {}", terms.join(", ")))
    }

    #[must_use]
    pub fn build_create_table(&self, name: &str) -> String {
        self.dialect.create_table(&self.quote_table(name))
    }

    #[must_use]
    pub fn build_drop_table(&self, name: &str) -> String {
        self.dialect.drop_table(&self.quote_table(name))
    }

    /// # Errors
    /// Returns `Json` if serialization fails.
    pub fn encode(&self, doc: &Document) -> Result<String, DbError> {
        document::encode(doc)
    }

    /// # Errors
    /// Returns `DecodeError` for text that is not a JSON object.
    pub fn decode(&self, text: &str) -> Result<Document, DbError> {
        document::decode(text)
    }

    /// Extraction expression for `path`, typically `_id` in update-by-id statements.
    ///
    /// # Errors
    /// Returns `CompilationError` for invalid paths or dialects without JSON paths.
    pub fn create_path_selector(&self, path: &str) -> Result<String, DbError> {
        compile_path(self.dialect(), &FieldPath::parse(path)?)
    }

    /// Plans a `find`. Match documents push everything down when the dialect can; predicates
    /// and path-less dialects scan every row in insertion order.
    ///
    /// # Errors
    /// Returns `CompilationError` for malformed filters, sort keys or projection paths.
    pub fn build_select(
        &self,
        table: &str,
        filter: &Filter,
        opts: &FindOptions,
    ) -> Result<SelectPlan, DbError> {
        let projection = opts
            .projection
            .as_ref()
            .map(|p| {
                Ok::<_, DbError>(CompiledProjection {
                    fields: p
                        .fields
                        .iter()
                        .map(|f| FieldPath::parse(f))
                        .collect::<Result<_, _>>()?,
                    include_id: p.include_id,
                })
            })
            .transpose()?;
        let sort = parse_sort(opts.sort_specs())?;

        let mut b = SqlBuilder::new(self.dialect());
        let (predicate_sql, post_filter) = self.where_into(&mut b, filter)?;
        let select = format!(
            "SELECT {} FROM {} WHERE {predicate_sql}",
            self.dialect.select_document(),
            self.quote_table(table)
        );
        b.push(&select);

        let mode = match post_filter {
            None => {
                let order_by = self.build_order_by(opts.sort_specs())?;
                if !order_by.is_empty() {
                    b.push(" ").push(&order_by);
                }
                let limit = opts
                    .effective_limit()
                    .map(|l| bind_count(&mut b, l))
                    .transpose()?;
                let offset = opts
                    .effective_skip()
                    .map(|s| bind_count(&mut b, s))
                    .transpose()?;
                let clause = self.dialect.limit_offset(limit.as_deref(), offset.as_deref());
                if !clause.is_empty() {
                    b.push(" ").push(&clause);
                }
                PlanMode::Pushdown
            }
            Some(predicate) => {
                self.push_insertion_order(&mut b);
                PlanMode::Scan {
                    predicate,
                    sort,
                    skip: opts.effective_skip().unwrap_or(0),
                    limit: opts.effective_limit(),
                }
            }
        };
        Ok(SelectPlan {
            statement: b.finish(),
            mode,
            projection,
        })
    }

    fn push_insertion_order(&self, b: &mut SqlBuilder<'_>) {
        if let Some(col) = self.dialect.insertion_order() {
            b.push(" ORDER BY ")
                .push(&self.dialect.order_term(col, Order::Asc));
        }
    }

    /// `SELECT COUNT(*)` for filters SQL can express; `None` when counting must scan.
    ///
    /// # Errors
    /// Returns `CompilationError` for malformed filters.
    pub fn build_count(&self, table: &str, filter: &Filter) -> Result<Option<Statement>, DbError> {
        let mut b = SqlBuilder::new(self.dialect());
        let (sql, post_filter) = self.where_into(&mut b, filter)?;
        if post_filter.is_some() {
            return Ok(None);
        }
        b.push(&format!(
            "SELECT COUNT(*) FROM {} WHERE {sql}",
            self.quote_table(table)
        ));
        Ok(Some(b.finish()))
    }

    /// `DELETE ... WHERE` for filters SQL can express; `None` when deletion must go row by row.
    ///
    /// # Errors
    /// Returns `CompilationError` for malformed filters.
    pub fn build_delete_where(
        &self,
        table: &str,
        filter: &Filter,
    ) -> Result<Option<Statement>, DbError> {
        let mut b = SqlBuilder::new(self.dialect());
        let (sql, post_filter) = self.where_into(&mut b, filter)?;
        if post_filter.is_some() {
            return Ok(None);
        }
        b.push(&format!("DELETE FROM {} WHERE {sql}", self.quote_table(table)));
        Ok(Some(b.finish()))
    }

    #[must_use]
    pub fn build_insert(&self, table: &str, text: String) -> Statement {
        let mut b = SqlBuilder::new(self.dialect());
        let p = b.bind_document(text);
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({p})",
            self.quote_table(table),
            self.dialect.document_column()
        );
        b.push(&sql);
        b.finish()
    }

    /// Addresses a row by `_id` when the dialect can extract it, else by its stored text.
    #[must_use]
    pub fn row_key(&self, raw: &str, doc: &Document) -> RowKey {
        match document::document_id(doc) {
            Some(id) if self.dialect.supports_json_paths() => RowKey::Id(id.to_owned()),
            _ => RowKey::Text(raw.to_owned()),
        }
    }

    fn push_row_selector(&self, b: &mut SqlBuilder<'_>, key: &RowKey) -> Result<(), DbError> {
        let cond = match key {
            RowKey::Id(id) => {
                let sel = self.create_path_selector(ID_FIELD)?;
                let p = b.bind_literal(&Scalar::String(id.clone()));
                format!(" WHERE {sel} = {p}")
            }
            RowKey::Text(raw) => {
                let p = b.bind(SqlValue::Text(raw.clone()));
                format!(" WHERE {} = {p}", self.dialect.document_column())
            }
        };
        b.push(&cond);
        Ok(())
    }

    /// Rewrites one row with the full document text.
    ///
    /// # Errors
    /// Returns `CompilationError` when the key cannot be addressed in this dialect.
    pub fn build_update_row(
        &self,
        table: &str,
        key: &RowKey,
        text: String,
    ) -> Result<Statement, DbError> {
        let mut b = SqlBuilder::new(self.dialect());
        let p = b.bind_document(text);
        b.push(&format!(
            "UPDATE {} SET {} = {p}",
            self.quote_table(table),
            self.dialect.document_column()
        ));
        self.push_row_selector(&mut b, key)?;
        Ok(b.finish())
    }

    /// Merges `patch` into one row with the dialect's merge-patch expression, if it has one.
    ///
    /// # Errors
    /// Returns `CompilationError` when the key cannot be addressed in this dialect.
    pub fn build_patch_row(
        &self,
        table: &str,
        key: &RowKey,
        patch: String,
    ) -> Result<Option<Statement>, DbError> {
        let column = self.dialect.document_column();
        let mut b = SqlBuilder::new(self.dialect());
        let p = b.bind_document(patch);
        let Some(expr) = self.dialect.merge_patch(&column, &p) else {
            return Ok(None);
        };
        b.push(&format!(
            "UPDATE {} SET {column} = {expr}",
            self.quote_table(table)
        ));
        self.push_row_selector(&mut b, key)?;
        Ok(Some(b.finish()))
    }

    /// # Errors
    /// Returns `CompilationError` when the key cannot be addressed in this dialect.
    pub fn build_delete_row(&self, table: &str, key: &RowKey) -> Result<Statement, DbError> {
        let mut b = SqlBuilder::new(self.dialect());
        b.push(&format!("DELETE FROM {}", self.quote_table(table)));
        self.push_row_selector(&mut b, key)?;
        Ok(b.finish())
    }
}

fn parse_sort(sort: &[SortSpec]) -> Result<Vec<(FieldPath, Order)>, DbError> {
    sort.iter()
        .map(|s| Ok((FieldPath::parse(&s.field)?, s.order)))
        .collect()
}

fn bind_count(b: &mut SqlBuilder<'_>, n: usize) -> Result<String, DbError> {
    let n = i64::try_from(n)
        .map_err(|_| DbError::compile(format!("limit/skip {n} out of range")))?;
    Ok(b.bind(SqlValue::Integer(n)))
}
