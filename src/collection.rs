use std::sync::Arc;

use serde_json::Value;

use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::document;
use crate::errors::DbError;
use crate::id::IdGenerator;
use crate::logger::AUDIT_TARGET;
use crate::query::{
    Cursor, DeleteReport, Filter, FindOptions, QueryBuilder, RowKey, StoredRow, UpdateReport,
    UpdateSpec, apply_update, parse_update, validate_replacement,
};
use crate::types::{Document, DocumentId, ID_FIELD, SqlValue, Statement};

/// One table of JSON documents.
///
/// Every operation compiles its statements before issuing any of them, so a malformed filter
/// or update never reaches the engine. Multi-document writes first take a full snapshot of the
/// matching rows and only then write, because the engine is never asked to interleave
/// statements with an open result set.
pub struct Collection<'c> {
    name: String,
    conn: &'c dyn Connection,
    builder: QueryBuilder,
    ids: Arc<dyn IdGenerator>,
}

impl<'c> Collection<'c> {
    /// Binds a collection to `conn`, creating its table if needed.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the create statement fails.
    pub fn new(
        conn: &'c dyn Connection,
        dialect: Arc<dyn Dialect>,
        name: &str,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, DbError> {
        let col = Self {
            name: name.to_owned(),
            conn,
            builder: QueryBuilder::new(dialect),
            ids,
        };
        col.execute(&Statement::new(col.builder.build_create_table(name)))?;
        Ok(col)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn builder(&self) -> &QueryBuilder {
        &self.builder
    }

    fn query(&self, stmt: &Statement) -> Result<Vec<Vec<SqlValue>>, DbError> {
        crate::sql_trace!("{} -- {} params", stmt.sql, stmt.params.len());
        self.conn.query(stmt)
    }

    fn execute(&self, stmt: &Statement) -> Result<u64, DbError> {
        crate::sql_trace!("{} -- {} params", stmt.sql, stmt.params.len());
        self.conn.execute(stmt)
    }

    /// Runs `filter` and returns a cursor over the matching documents.
    ///
    /// # Errors
    /// `CompilationError` for malformed filters or options (nothing is executed), or
    /// `ExecutionError` from the engine.
    pub fn find(&self, filter: &Filter, opts: &FindOptions) -> Result<Cursor, DbError> {
        let plan = self.builder.build_select(&self.name, filter, opts)?;
        let rows = self.query(&plan.statement)?;
        let cursor = Cursor::new(plan, rows.into_iter().map(first_column).collect());
        if cursor.is_pushdown()
            && !opts.sort_specs().is_empty()
            && self.builder.dialect().insertion_order().is_none()
        {
            log::debug!("{}: ties in pushed-down sort follow engine order", self.name);
        }
        Ok(cursor)
    }

    /// First document of `find` with the same options, or `None`.
    ///
    /// # Errors
    /// As [`Collection::find`], plus `DecodeError` if the first row is corrupt.
    pub fn find_one(
        &self,
        filter: &Filter,
        opts: &FindOptions,
    ) -> Result<Option<Document>, DbError> {
        let opts = FindOptions {
            limit: Some(1),
            ..opts.clone()
        };
        let mut cursor = self.find(filter, &opts)?;
        let first = cursor.advance().transpose();
        cursor.close();
        first
    }

    /// # Errors
    /// As [`Collection::find`]; scan-mode counting also surfaces `DecodeError`.
    pub fn count(&self, filter: &Filter) -> Result<u64, DbError> {
        if let Some(stmt) = self.builder.build_count(&self.name, filter)? {
            let rows = self.query(&stmt)?;
            let n = rows
                .first()
                .and_then(|r| r.first())
                .and_then(SqlValue::as_integer)
                .unwrap_or(0);
            return Ok(u64::try_from(n).unwrap_or(0));
        }
        let mut cursor = self.find(filter, &FindOptions::default())?;
        let mut n = 0;
        while let Some(row) = cursor.next_row() {
            row?;
            n += 1;
        }
        Ok(n)
    }

    /// Inserts one document, stamping a generated `_id` when absent.
    ///
    /// # Errors
    /// `CompilationError` for a non-string `_id`, `DuplicateId` when that `_id` is already
    /// stored, or `ExecutionError`.
    pub fn insert_one(&self, doc: Document) -> Result<DocumentId, DbError> {
        let (id, doc) = document::stamp_id(doc, || self.ids.generate_id())?;
        if self.id_taken(&id)? {
            return Err(DbError::DuplicateId(format!("{}: {id}", self.name)));
        }
        let stmt = self.builder.build_insert(&self.name, self.builder.encode(&doc)?);
        self.execute(&stmt)?;
        log::info!(target: AUDIT_TARGET, "insert collection={} id={id}", self.name);
        Ok(id)
    }

    /// Inserts documents in order, stopping at the first failure.
    ///
    /// # Errors
    /// As [`Collection::insert_one`]; documents before the failing one stay inserted.
    pub fn insert_many<I>(&self, docs: I) -> Result<Vec<DocumentId>, DbError>
    where
        I: IntoIterator<Item = Document>,
    {
        docs.into_iter().map(|d| self.insert_one(d)).collect()
    }

    /// Whether a readable stored document already carries `id`.
    fn id_taken(&self, id: &str) -> Result<bool, DbError> {
        let mut by_id = Document::new();
        by_id.insert(ID_FIELD.to_owned(), Value::String(id.to_owned()));
        let mut cursor = self.find(&Filter::Declarative(by_id), &FindOptions::default())?;
        let taken = cursor.by_ref().any(|row| row.is_ok());
        cursor.close();
        Ok(taken)
    }

    /// Fully traverses a cursor over the current matches.
    fn snapshot(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<StoredRow>, DbError> {
        let opts = FindOptions {
            limit,
            ..FindOptions::default()
        };
        let mut cursor = self.find(filter, &opts)?;
        let mut rows = Vec::new();
        while let Some(row) = cursor.next_row() {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// # Errors
    /// `CompilationError` for malformed filters or update documents, raised before any
    /// statement runs; `ExecutionError` or `DecodeError` otherwise.
    pub fn update_one(&self, filter: &Filter, update: &Document) -> Result<UpdateReport, DbError> {
        self.update(filter, update, Some(1))
    }

    /// Applies `update` to every document matching `filter`.
    ///
    /// A plain document merges its keys over the stored top level; `$set`/`$inc`/`$unset`
    /// documents apply per dotted path. `_id` never changes.
    ///
    /// # Errors
    /// As [`Collection::update_one`].
    pub fn update_many(
        &self,
        filter: &Filter,
        update: &Document,
    ) -> Result<UpdateReport, DbError> {
        self.update(filter, update, None)
    }

    fn update(
        &self,
        filter: &Filter,
        update: &Document,
        limit: Option<usize>,
    ) -> Result<UpdateReport, DbError> {
        let spec = parse_update(update)?;
        let patch = match &spec {
            UpdateSpec::Merge(fields)
                if !fields.is_empty() && fields.values().all(is_patch_scalar) =>
            {
                Some(self.builder.encode(fields)?)
            }
            _ => None,
        };
        let report = self.rewrite(filter, limit, patch.as_deref(), |doc| {
            apply_update(doc, &spec)
        })?;
        log::info!(
            target: AUDIT_TARGET,
            "update collection={} matched={} modified={}",
            self.name,
            report.matched,
            report.modified
        );
        Ok(report)
    }

    /// # Errors
    /// `CompilationError` when the replacement carries operators or an `_id`.
    pub fn replace_one(
        &self,
        filter: &Filter,
        replacement: &Document,
    ) -> Result<UpdateReport, DbError> {
        self.replace(filter, replacement, Some(1))
    }

    /// Replaces every matching document with `replacement`, keeping each stored `_id`.
    ///
    /// # Errors
    /// As [`Collection::replace_one`].
    pub fn replace_many(
        &self,
        filter: &Filter,
        replacement: &Document,
    ) -> Result<UpdateReport, DbError> {
        self.replace(filter, replacement, None)
    }

    fn replace(
        &self,
        filter: &Filter,
        replacement: &Document,
        limit: Option<usize>,
    ) -> Result<UpdateReport, DbError> {
        validate_replacement(replacement)?;
        if replacement.contains_key(ID_FIELD) {
            return Err(DbError::compile("_id is immutable and cannot be replaced"));
        }
        let report = self.rewrite(filter, limit, None, |doc| {
            let mut next = Document::with_capacity(replacement.len() + 1);
            if let Some(id) = doc.get(ID_FIELD) {
                next.insert(ID_FIELD.to_owned(), id.clone());
            }
            next.extend(replacement.iter().map(|(k, v)| (k.clone(), v.clone())));
            let changed = next != *doc;
            *doc = next;
            changed
        })?;
        log::info!(
            target: AUDIT_TARGET,
            "replace collection={} matched={} modified={}",
            self.name,
            report.matched,
            report.modified
        );
        Ok(report)
    }

    /// Snapshot, then write back each row that `change` modified.
    fn rewrite<F>(
        &self,
        filter: &Filter,
        limit: Option<usize>,
        patch: Option<&str>,
        change: F,
    ) -> Result<UpdateReport, DbError>
    where
        F: Fn(&mut Document) -> bool,
    {
        let rows = self.snapshot(filter, limit)?;
        let mut report = UpdateReport {
            matched: rows.len() as u64,
            modified: 0,
        };
        for row in rows {
            let mut doc = row.doc.clone();
            if !change(&mut doc) {
                continue;
            }
            let key = self.builder.row_key(&row.raw, &row.doc);
            let stmt = match (patch, &key) {
                (Some(p), RowKey::Id(_)) => {
                    self.builder
                        .build_patch_row(&self.name, &key, p.to_owned())?
                }
                _ => None,
            };
            let stmt = match stmt {
                Some(s) => s,
                None => {
                    self.builder
                        .build_update_row(&self.name, &key, self.builder.encode(&doc)?)?
                }
            };
            self.execute(&stmt)?;
            report.modified += 1;
        }
        Ok(report)
    }

    /// # Errors
    /// As [`Collection::find`].
    pub fn delete_one(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        let rows = self.snapshot(filter, Some(1))?;
        let mut report = DeleteReport::default();
        for row in rows {
            let key = self.builder.row_key(&row.raw, &row.doc);
            report.deleted += self.execute(&self.builder.build_delete_row(&self.name, &key)?)?;
        }
        log::info!(
            target: AUDIT_TARGET,
            "delete collection={} deleted={}",
            self.name,
            report.deleted
        );
        Ok(report)
    }

    /// Deletes every document matching `filter`, in one statement when the filter runs in SQL.
    ///
    /// # Errors
    /// As [`Collection::find`].
    pub fn delete_many(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        let deleted = match self.builder.build_delete_where(&self.name, filter)? {
            Some(stmt) => self.execute(&stmt)?,
            None => {
                let mut n = 0;
                for row in self.snapshot(filter, None)? {
                    let key = self.builder.row_key(&row.raw, &row.doc);
                    n += self.execute(&self.builder.build_delete_row(&self.name, &key)?)?;
                }
                n
            }
        };
        log::info!(target: AUDIT_TARGET, "delete collection={} deleted={deleted}", self.name);
        Ok(DeleteReport { deleted })
    }

    /// Drops the backing table.
    ///
    /// # Errors
    /// Returns `ExecutionError` if the engine rejects the statement.
    pub fn drop(self) -> Result<(), DbError> {
        self.execute(&Statement::new(self.builder.build_drop_table(&self.name)))?;
        log::info!(target: AUDIT_TARGET, "drop collection={}", self.name);
        Ok(())
    }
}

impl std::fmt::Debug for Collection<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("dialect", &self.builder.dialect().kind())
            .finish()
    }
}

fn first_column(row: Vec<SqlValue>) -> SqlValue {
    row.into_iter().next().unwrap_or(SqlValue::Null)
}

const fn is_patch_scalar(v: &Value) -> bool {
    matches!(v, Value::Bool(_) | Value::Number(_) | Value::String(_))
}
