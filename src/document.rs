use serde_json::{Map, Value};

use crate::errors::DbError;
use crate::query::FieldPath;
use crate::types::{Document, DocumentId, ID_FIELD};

/// Serializes a document to the JSON text stored in the document column.
///
/// # Errors
/// Returns `Json` if serialization fails.
pub fn encode(doc: &Document) -> Result<String, DbError> {
    Ok(serde_json::to_string(doc)?)
}

/// Parses stored JSON text back into a document.
///
/// # Errors
/// Returns `DecodeError` when the text is not valid JSON or not a JSON object.
pub fn decode(text: &str) -> Result<Document, DbError> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(m)) => Ok(m),
        Ok(other) => Err(DbError::DecodeError(format!(
            "stored document is not a JSON object: {}",
            type_name(&other)
        ))),
        Err(e) => Err(DbError::DecodeError(e.to_string())),
    }
}

const fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[must_use]
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Puts `_id` first, generating one with `generate` when absent.
///
/// # Errors
/// Returns `CompilationError` when the caller supplied a non-string `_id`.
pub fn stamp_id(
    mut doc: Document,
    generate: impl FnOnce() -> DocumentId,
) -> Result<(DocumentId, Document), DbError> {
    let id = match doc.shift_remove(ID_FIELD) {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(DbError::compile(format!("_id must be a string, got {other}")));
        }
        None => generate(),
    };
    let mut out = Map::with_capacity(doc.len() + 1);
    out.insert(ID_FIELD.to_owned(), Value::String(id.clone()));
    out.extend(doc);
    Ok((id, out))
}

/// Value at `path`, or `None` when any level is missing or not an object.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut cur = doc.get(first)?;
    for part in rest {
        match cur {
            Value::Object(m) => cur = m.get(part)?,
            _ => return None,
        }
    }
    Some(cur)
}

/// Sets `path`, creating intermediate objects. Returns whether the document changed.
pub fn set_path(doc: &mut Document, path: &FieldPath, val: Value) -> bool {
    let Some((last, parents)) = path.segments().split_last() else { return false };
    let mut cur = doc;
    for key in parents {
        if !matches!(cur.get(key), Some(Value::Object(_))) {
            cur.insert(key.clone(), Value::Object(Map::new()));
        }
        match cur.get_mut(key) {
            Some(Value::Object(m)) => cur = m,
            _ => return false,
        }
    }
    let changed = cur.get(last) != Some(&val);
    cur.insert(last.clone(), val);
    changed
}

/// Removes `path`. Returns whether anything was removed.
pub fn unset_path(doc: &mut Document, path: &FieldPath) -> bool {
    let Some((last, parents)) = path.segments().split_last() else { return false };
    let mut cur = doc;
    for key in parents {
        match cur.get_mut(key) {
            Some(Value::Object(m)) => cur = m,
            _ => return false,
        }
    }
    cur.shift_remove(last).is_some()
}

/// Keeps only `fields` (nested paths rebuilt as nested objects) plus `_id` when `include_id`.
#[must_use]
pub fn project(doc: &Document, fields: &[FieldPath], include_id: bool) -> Document {
    let mut out = Map::new();
    if include_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_owned(), id.clone());
        }
    }
    for f in fields {
        if let Some(v) = get_path(doc, f) {
            set_path(&mut out, f, v.clone());
        }
    }
    out
}
