use serde_json::{Number, Value};
use std::cmp::Ordering;

use crate::document::{get_path, set_path, unset_path};
use crate::types::{Document, ID_FIELD};

use super::path::FieldPath;
use super::types::{CmpOp, Condition, Order, Scalar, UpdateSpec};

/// Evaluates a parsed condition against a decoded document.
///
/// Mirrors the SQL the compiler emits: comparisons are type-bracketed and missing fields never
/// satisfy a comparison.
#[must_use]
pub fn eval_condition(doc: &Document, cond: &Condition) -> bool {
    match cond {
        Condition::True => true,
        Condition::And(cs) => cs.iter().all(|c| eval_condition(doc, c)),
        Condition::Or(cs) => cs.iter().any(|c| eval_condition(doc, c)),
        Condition::Not(c) => !eval_condition(doc, c),
        Condition::Exists { path, exists } => get_path(doc, path).is_some() == *exists,
        Condition::IsNull { path } => matches!(get_path(doc, path), None | Some(Value::Null)),
        Condition::In { path, values } => {
            let v = get_path(doc, path);
            values.iter().any(|x| match x {
                Scalar::Null => matches!(v, None | Some(Value::Null)),
                x => v.is_some_and(|v| compare_scalar(v, x) == Some(Ordering::Equal)),
            })
        }
        Condition::Cmp { path, op, value } => {
            let Some(ord) = get_path(doc, path).and_then(|v| compare_scalar(v, value)) else {
                return false;
            };
            match op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Gte => ord != Ordering::Less,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Lte => ord != Ordering::Greater,
            }
        }
    }
}

/// Ordering between a stored value and a literal of the same type class, `None` otherwise.
fn compare_scalar(v: &Value, x: &Scalar) -> Option<Ordering> {
    match (v, x) {
        (Value::Number(a), Scalar::Number(b)) => Some(compare_numbers(a, b)),
        (Value::String(a), Scalar::String(b)) => Some(a.as_str().cmp(b.as_str())),
        (Value::Bool(a), Scalar::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

/// Total order over JSON values used for in-process sorting.
///
/// Types rank null < number < string < object < array < bool; a missing field ranks as null.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y) {
                let ord = compare_values(Some(l), Some(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ord = lk.cmp(rk).then_with(|| compare_values(Some(lv), Some(rv)));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

const fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

#[must_use]
pub fn compare_docs(a: &Document, b: &Document, sort: &[(FieldPath, Order)]) -> Ordering {
    for (path, order) in sort {
        let ord = compare_values(get_path(a, path), get_path(b, path));
        if ord != Ordering::Equal {
            return if *order == Order::Asc { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

/// Applies an update in place, never touching `_id`. Returns whether the document changed.
pub fn apply_update(doc: &mut Document, upd: &UpdateSpec) -> bool {
    let mut modified = false;
    match upd {
        UpdateSpec::Merge(fields) => {
            for (k, v) in fields {
                if k == ID_FIELD {
                    continue;
                }
                if doc.get(k) != Some(v) {
                    doc.insert(k.clone(), v.clone());
                    modified = true;
                }
            }
        }
        UpdateSpec::Operators { set, inc, unset } => {
            for (path, val) in set {
                modified |= set_path(doc, path, val.clone());
            }
            for (path, delta) in inc {
                modified |= inc_path(doc, path, delta);
            }
            for path in unset {
                modified |= unset_path(doc, path);
            }
        }
    }
    modified
}

/// Integer deltas on integer fields stay integral; anything else becomes a double.
/// Non-numeric targets are left untouched.
fn inc_path(doc: &mut Document, path: &FieldPath, delta: &Number) -> bool {
    let new_val = match get_path(doc, path) {
        None => Value::Number(delta.clone()),
        Some(Value::Number(cur)) => match (cur.as_i64(), delta.as_i64()) {
            (Some(a), Some(b)) if a.checked_add(b).is_some() => Value::from(a + b),
            _ => Number::from_f64(cur.as_f64().unwrap_or(0.0) + delta.as_f64().unwrap_or(0.0))
                .map_or(Value::Null, Value::Number),
        },
        Some(_) => return false,
    };
    set_path(doc, path, new_val)
}
