//! Evaluates native filters against in-memory documents.
//!
//! Covers the dialect emitted by the compiler and the storage layer: `$and`, `$or`, `$nor`,
//! `$not`, comparisons, `$in`/`$nin`, `$regex` with `$options`, `$elemMatch`, and dotted paths
//! that fan out across arrays. `$numberDecimal` and `$date` values compare by value.

use crate::constants::ops;
use crate::query::is_operator_doc;
use crate::{extjson, Error, Result};
use regex::RegexBuilder;
use serde_json::{Map, Value as JsonValue};
use std::cmp::Ordering;

/// True if `document` satisfies `filter`.
pub fn matches(document: &JsonValue, filter: &JsonValue) -> Result<bool> {
    let clauses = filter
        .as_object()
        .ok_or_else(|| Error::Store(format!("filter must be an object, got {filter}")))?;

    for (key, condition) in clauses {
        let ok = match key.as_str() {
            ops::AND => {
                let mut all = true;
                for f in each_filter(condition)? {
                    if !matches(document, f)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            ops::OR => {
                let mut any = false;
                for f in each_filter(condition)? {
                    if matches(document, f)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            ops::NOR => {
                let mut none = true;
                for f in each_filter(condition)? {
                    if matches(document, f)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(Error::Store(format!("unsupported top-level operator {op}")));
            }
            path => field_matches(&resolve(document, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn each_filter(value: &JsonValue) -> Result<&Vec<JsonValue>> {
    value
        .as_array()
        .ok_or_else(|| Error::Store(format!("logical operator expects an array, got {value}")))
}

/// Values reachable through a dotted path. Arrays met on the way fan out to their elements.
pub(crate) fn resolve<'a>(document: &'a JsonValue, path: &str) -> Vec<&'a JsonValue> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(document, &segments, &mut out);
    out
}

fn walk<'a>(value: &'a JsonValue, segments: &[&str], out: &mut Vec<&'a JsonValue>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        JsonValue::Object(map) => {
            if let Some(child) = map.get(*head) {
                walk(child, rest, out);
            }
        }
        JsonValue::Array(items) => {
            for item in items {
                walk(item, segments, out);
            }
        }
        _ => {}
    }
}

fn field_matches(candidates: &[&JsonValue], condition: &JsonValue) -> Result<bool> {
    if !is_operator_doc(condition) {
        return Ok(any_expanded(candidates, |v| values_equal(v, condition)));
    }
    let Some(operators) = condition.as_object() else {
        return Ok(false);
    };

    for (op, operand) in operators {
        let ok = match op.as_str() {
            ops::EQ => any_expanded(candidates, |v| values_equal(v, operand)),
            ops::NE => !any_expanded(candidates, |v| values_equal(v, operand)),
            ops::GT => any_ordered(candidates, operand, |o| o == Ordering::Greater),
            ops::GTE => any_ordered(candidates, operand, |o| o != Ordering::Less),
            ops::LT => any_ordered(candidates, operand, |o| o == Ordering::Less),
            ops::LTE => any_ordered(candidates, operand, |o| o != Ordering::Greater),
            ops::IN => {
                let options = in_list(operand)?;
                any_expanded(candidates, |v| options.iter().any(|o| values_equal(v, o)))
            }
            ops::NIN => {
                let options = in_list(operand)?;
                !any_expanded(candidates, |v| options.iter().any(|o| values_equal(v, o)))
            }
            ops::REGEX => regex_matches(candidates, operand, operators)?,
            ops::OPTIONS => true,
            ops::NOT => !field_matches(candidates, operand)?,
            ops::ELEM_MATCH => elem_match(candidates, operand)?,
            other => return Err(Error::Store(format!("unsupported operator {other}"))),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn elem_match(candidates: &[&JsonValue], body: &JsonValue) -> Result<bool> {
    for candidate in candidates {
        let JsonValue::Array(items) = candidate else {
            continue;
        };
        for item in items {
            let hit = if is_element_condition(body) {
                field_matches(&[item], body)?
            } else {
                matches(item, body)?
            };
            if hit {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// An `$elemMatch` body made of field operators (`{"$gt": 1}`) tests each element as a value.
/// Bodies with fields or logical operators (`$and`, `$or`, `$nor`) are queries on the element.
fn is_element_condition(body: &JsonValue) -> bool {
    is_operator_doc(body)
        && body.as_object().is_some_and(|map| {
            !map.keys()
                .any(|k| matches!(k.as_str(), ops::AND | ops::OR | ops::NOR))
        })
}

fn regex_matches(
    candidates: &[&JsonValue],
    pattern: &JsonValue,
    operators: &Map<String, JsonValue>,
) -> Result<bool> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| Error::Store("$regex expects a string".to_string()))?;
    let options = operators
        .get(ops::OPTIONS)
        .and_then(JsonValue::as_str)
        .unwrap_or("");
    let re = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .build()
        .map_err(|e| Error::Store(format!("invalid $regex '{pattern}': {e}")))?;
    Ok(any_expanded(candidates, |v| {
        v.as_str().is_some_and(|s| re.is_match(s))
    }))
}

fn in_list(operand: &JsonValue) -> Result<&Vec<JsonValue>> {
    operand
        .as_array()
        .ok_or_else(|| Error::Store(format!("$in/$nin expects an array, got {operand}")))
}

/// Applies `test` to each candidate and, for array candidates, to each element.
fn any_expanded(candidates: &[&JsonValue], test: impl Fn(&JsonValue) -> bool) -> bool {
    candidates.iter().copied().any(|c| {
        test(c)
            || match c {
                JsonValue::Array(items) => items.iter().any(&test),
                _ => false,
            }
    })
}

fn any_ordered(
    candidates: &[&JsonValue],
    operand: &JsonValue,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    any_expanded(candidates, |v| compare_values(v, operand).is_some_and(&accept))
}

fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match compare_values(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

/// Ordering between two scalars of the same kind. Mixed kinds do not compare.
pub(crate) fn compare_values(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (extjson::as_decimal(a), extjson::as_decimal(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (extjson::as_date(a), extjson::as_date(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        (JsonValue::Bool(x), JsonValue::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
