use serde_json::{Map, Value};

use crate::errors::DbError;
use crate::types::ID_FIELD;

use super::path::FieldPath;
use super::types::{CmpOp, Condition, MatchDocument, Scalar, UpdateSpec};

/// Parses a match document into a `Condition`.
///
/// Top-level keys are AND-ed. The empty document is `Condition::True`.
///
/// # Errors
/// Returns `CompilationError` for unknown operators, malformed operands and attempts to match a
/// field against a sub-document or array literal.
pub fn parse_match(doc: &MatchDocument) -> Result<Condition, DbError> {
    let mut clauses = doc
        .iter()
        .map(|(key, value)| parse_clause(key, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(match clauses.len() {
        0 => Condition::True,
        1 => clauses.remove(0),
        _ => Condition::And(clauses),
    })
}

fn parse_clause(key: &str, value: &Value) -> Result<Condition, DbError> {
    match key {
        "$and" => Ok(Condition::And(parse_filter_list(key, value)?)),
        "$or" => Ok(Condition::Or(parse_filter_list(key, value)?)),
        "$not" => match value {
            Value::Object(m) => Ok(Condition::Not(Box::new(parse_match(m)?))),
            _ => Err(DbError::compile("$not requires a filter document")),
        },
        k if k.starts_with('$') => Err(DbError::compile(format!(
            "unknown top-level operator: {k}"
        ))),
        _ => parse_field(FieldPath::parse(key)?, value),
    }
}

fn parse_filter_list(op: &str, value: &Value) -> Result<Vec<Condition>, DbError> {
    let Value::Array(items) = value else {
        return Err(DbError::compile(format!(
            "{op} requires an array of filter documents"
        )));
    };
    if items.is_empty() {
        return Err(DbError::compile(format!(
            "{op} requires at least one filter document"
        )));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(m) => parse_match(m),
            other => Err(DbError::compile(format!(
                "{op} element is not a filter document: {other}"
            ))),
        })
        .collect()
}

fn parse_field(path: FieldPath, value: &Value) -> Result<Condition, DbError> {
    match value {
        Value::Object(ops) => {
            let operator_keys = ops.keys().filter(|k| k.starts_with('$')).count();
            if operator_keys == 0 {
                return Err(DbError::compile(format!(
                    "matching '{path}' against a sub-document is not supported; use operators"
                )));
            }
            if operator_keys != ops.len() {
                return Err(DbError::compile(format!(
                    "'{path}' mixes operators and field names"
                )));
            }
            let mut clauses = ops
                .iter()
                .map(|(op, operand)| parse_operator(&path, op, operand))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if clauses.len() == 1 {
                clauses.remove(0)
            } else {
                Condition::And(clauses)
            })
        }
        Value::Array(_) => Err(DbError::compile(format!(
            "matching '{path}' against an array literal is not supported"
        ))),
        scalar => Ok(eq_condition(path, scalar_of(scalar))),
    }
}

fn parse_operator(path: &FieldPath, op: &str, operand: &Value) -> Result<Condition, DbError> {
    match op {
        "$eq" => Ok(eq_condition(path.clone(), scalar_operand(path, op, operand)?)),
        "$ne" => Ok(Condition::Not(Box::new(eq_condition(
            path.clone(),
            scalar_operand(path, op, operand)?,
        )))),
        "$gt" | "$gte" | "$lt" | "$lte" => {
            let value = scalar_operand(path, op, operand)?;
            if value == Scalar::Null {
                return Err(DbError::compile(format!(
                    "{op} on '{path}' cannot compare against null"
                )));
            }
            let cmp = match op {
                "$gt" => CmpOp::Gt,
                "$gte" => CmpOp::Gte,
                "$lt" => CmpOp::Lt,
                _ => CmpOp::Lte,
            };
            Ok(Condition::Cmp {
                path: path.clone(),
                op: cmp,
                value,
            })
        }
        "$in" => Ok(Condition::In {
            path: path.clone(),
            values: scalar_list(path, op, operand)?,
        }),
        "$nin" => Ok(Condition::Not(Box::new(Condition::In {
            path: path.clone(),
            values: scalar_list(path, op, operand)?,
        }))),
        "$exists" => match operand {
            Value::Bool(b) => Ok(Condition::Exists {
                path: path.clone(),
                exists: *b,
            }),
            other => Err(DbError::compile(format!(
                "$exists on '{path}' requires a boolean, got {other}"
            ))),
        },
        "$not" => match operand {
            Value::Object(_) => Ok(Condition::Not(Box::new(parse_field(path.clone(), operand)?))),
            _ => Err(DbError::compile(format!(
                "$not on '{path}' requires an operator document"
            ))),
        },
        other => Err(DbError::compile(format!("unknown operator {other} on '{path}'"))),
    }
}

fn eq_condition(path: FieldPath, value: Scalar) -> Condition {
    match value {
        Scalar::Null => Condition::IsNull { path },
        value => Condition::Cmp {
            path,
            op: CmpOp::Eq,
            value,
        },
    }
}

fn scalar_of(v: &Value) -> Scalar {
    Scalar::from_json(v).unwrap_or(Scalar::Null)
}

fn scalar_operand(path: &FieldPath, op: &str, operand: &Value) -> Result<Scalar, DbError> {
    Scalar::from_json(operand)
        .ok_or_else(|| DbError::compile(format!("{op} on '{path}' requires a scalar operand")))
}

fn scalar_list(path: &FieldPath, op: &str, operand: &Value) -> Result<Vec<Scalar>, DbError> {
    let Value::Array(items) = operand else {
        return Err(DbError::compile(format!("{op} on '{path}' requires an array")));
    };
    items.iter().map(|v| scalar_operand(path, op, v)).collect()
}

/// Parses an update document.
///
/// A document with no `$` keys is a top-level merge. A document whose keys are all update
/// operators is applied operator by operator. `_id` can never be written.
///
/// # Errors
/// Returns `CompilationError` for mixed documents, unknown operators, non-numeric `$inc`
/// operands and any write to `_id`.
pub fn parse_update(doc: &Map<String, Value>) -> Result<UpdateSpec, DbError> {
    let operator_keys = doc.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        if doc.contains_key(ID_FIELD) {
            return Err(DbError::compile("_id is immutable and cannot be updated"));
        }
        return Ok(UpdateSpec::Merge(doc.clone()));
    }
    if operator_keys != doc.len() {
        return Err(DbError::compile("update document mixes operators and field names"));
    }
    let mut set = Vec::new();
    let mut inc = Vec::new();
    let mut unset = Vec::new();
    for (op, operand) in doc {
        match op.as_str() {
            "$set" => {
                for (k, v) in operator_fields(op, operand)? {
                    set.push((update_path(k)?, v.clone()));
                }
            }
            "$inc" => {
                for (k, v) in operator_fields(op, operand)? {
                    let Value::Number(n) = v else {
                        return Err(DbError::compile(format!("$inc on '{k}' requires a number")));
                    };
                    inc.push((update_path(k)?, n.clone()));
                }
            }
            "$unset" => match operand {
                Value::Array(names) => {
                    for name in names {
                        let Value::String(k) = name else {
                            return Err(DbError::compile("$unset array must hold field names"));
                        };
                        unset.push(update_path(k)?);
                    }
                }
                _ => {
                    for (k, _) in operator_fields(op, operand)? {
                        unset.push(update_path(k)?);
                    }
                }
            },
            other => return Err(DbError::compile(format!("unknown update operator {other}"))),
        }
    }
    Ok(UpdateSpec::Operators { set, inc, unset })
}

fn operator_fields<'a>(op: &str, operand: &'a Value) -> Result<&'a Map<String, Value>, DbError> {
    match operand {
        Value::Object(m) => Ok(m),
        _ => Err(DbError::compile(format!("{op} requires a document of fields"))),
    }
}

fn update_path(k: &str) -> Result<FieldPath, DbError> {
    let path = FieldPath::parse(k)?;
    if path.segments()[0] == ID_FIELD {
        return Err(DbError::compile("_id is immutable and cannot be updated"));
    }
    Ok(path)
}

/// Checks that a replacement document carries no operators.
///
/// # Errors
/// Returns `CompilationError` when any top-level key starts with `$`.
pub fn validate_replacement(doc: &Map<String, Value>) -> Result<(), DbError> {
    match doc.keys().find(|k| k.starts_with('$')) {
        Some(k) => Err(DbError::compile(format!(
            "replacement document cannot contain operator {k}"
        ))),
        None => Ok(()),
    }
}
