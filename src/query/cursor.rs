use std::collections::VecDeque;
use std::vec;

use crate::document;
use crate::errors::DbError;
use crate::types::{Document, SqlValue};

use super::builder::{CompiledProjection, PlanMode, RowPredicate, SelectPlan};
use super::eval::compare_docs;
use super::path::FieldPath;
use super::types::Order;

/// A decoded row together with the exact text it was stored as.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub raw: String,
    pub doc: Document,
}

/// Iterates the documents of one `find`.
///
/// Rows are decoded lazily; a row that fails to decode yields an `Err` item instead of
/// aborting the iteration, except when an in-process sort needs every row up front.
pub struct Cursor {
    rows: vec::IntoIter<SqlValue>,
    scan: Option<ScanState>,
    projection: Option<CompiledProjection>,
    closed: bool,
}

struct ScanState {
    predicate: RowPredicate,
    sort: Vec<(FieldPath, Order)>,
    skip: usize,
    limit: Option<usize>,
    yielded: usize,
    sorted: Option<VecDeque<StoredRow>>,
}

impl Cursor {
    pub(crate) fn new(plan: SelectPlan, rows: Vec<SqlValue>) -> Self {
        let scan = match plan.mode {
            PlanMode::Pushdown => None,
            PlanMode::Scan {
                predicate,
                sort,
                skip,
                limit,
            } => Some(ScanState {
                predicate,
                sort,
                skip,
                limit,
                yielded: 0,
                sorted: None,
            }),
        };
        Self {
            rows: rows.into_iter(),
            scan,
            projection: plan.projection,
            closed: false,
        }
    }

    /// Whether filtering ran inside the engine.
    #[must_use]
    pub fn is_pushdown(&self) -> bool {
        self.scan.is_none()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases buffered rows. Further calls to `advance` return `None`.
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.rows = Vec::new().into_iter();
            self.scan = None;
            log::trace!("cursor closed");
        }
    }

    pub(crate) fn next_row(&mut self) -> Option<Result<StoredRow, DbError>> {
        if self.closed {
            return None;
        }
        let item = match &mut self.scan {
            None => self.rows.next().map(decode_row),
            Some(scan) if scan.sort.is_empty() => scan.next_streaming(&mut self.rows),
            Some(scan) => scan.next_sorted(&mut self.rows),
        };
        if item.is_none() {
            self.close();
        }
        item
    }

    pub fn advance(&mut self) -> Option<Result<Document, DbError>> {
        let row = self.next_row()?;
        Some(row.map(|r| match &self.projection {
            Some(p) => p.apply(&r.doc),
            None => r.doc,
        }))
    }

    /// Drains the cursor, stopping at the first undecodable row.
    ///
    /// # Errors
    /// Returns the first `DecodeError` encountered.
    pub fn to_vec(mut self) -> Result<Vec<Document>, DbError> {
        let mut out = Vec::new();
        while let Some(d) = self.advance() {
            out.push(d?);
        }
        Ok(out)
    }
}

impl ScanState {
    fn next_streaming(
        &mut self,
        rows: &mut vec::IntoIter<SqlValue>,
    ) -> Option<Result<StoredRow, DbError>> {
        if self.limit.is_some_and(|l| self.yielded >= l) {
            return None;
        }
        loop {
            let row = match decode_row(rows.next()?) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };
            if !self.predicate.matches(&row.doc) {
                continue;
            }
            if self.skip > 0 {
                self.skip -= 1;
                continue;
            }
            self.yielded += 1;
            return Some(Ok(row));
        }
    }

    fn next_sorted(
        &mut self,
        rows: &mut vec::IntoIter<SqlValue>,
    ) -> Option<Result<StoredRow, DbError>> {
        if self.sorted.is_none() {
            let mut matched = Vec::new();
            for raw in rows.by_ref() {
                match decode_row(raw) {
                    Ok(r) if self.predicate.matches(&r.doc) => matched.push(r),
                    Ok(_) => {}
                    Err(e) => {
                        self.sorted = Some(VecDeque::new());
                        return Some(Err(e));
                    }
                }
            }
            // Stable: ties keep insertion order.
            matched.sort_by(|a, b| compare_docs(&a.doc, &b.doc, &self.sort));
            let take = self.limit.unwrap_or(usize::MAX);
            self.sorted = Some(matched.into_iter().skip(self.skip).take(take).collect());
        }
        self.sorted.as_mut()?.pop_front().map(Ok)
    }
}

fn decode_row(value: SqlValue) -> Result<StoredRow, DbError> {
    match value {
        SqlValue::Text(raw) => {
            let doc = document::decode(&raw)?;
            Ok(StoredRow { raw, doc })
        }
        SqlValue::Blob(bytes) => Err(DbError::DecodeError(format!(
            "document column is not valid UTF-8 ({} bytes)",
            bytes.len()
        ))),
        other => Err(DbError::DecodeError(format!(
            "document column holds a non-text value: {other:?}"
        ))),
    }
}

impl Iterator for Cursor {
    type Item = Result<Document, DbError>;
    fn next(&mut self) -> Option<Self::Item> {
        self.advance()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("pending", &self.rows.len())
            .field("pushdown", &self.is_pushdown())
            .field("closed", &self.closed)
            .finish()
    }
}
