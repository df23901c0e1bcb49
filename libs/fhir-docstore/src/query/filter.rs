use crate::constants::ops;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;

/// Native filter fragment.
///
/// Fragments are immutable values combined with `and`/`or`/`nor` and rendered once at the end
/// of a compile.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `{path: condition}`, where the condition is a plain value or an operator document.
    Field { path: String, condition: JsonValue },
    /// `{path: {"$elemMatch": body}}`; all conditions must hold for one array element.
    ElemMatch { path: String, conditions: Vec<Filter> },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
}

impl Filter {
    pub fn field(path: impl Into<String>, condition: JsonValue) -> Self {
        Self::Field {
            path: path.into(),
            condition,
        }
    }

    pub fn elem_match(path: impl Into<String>, conditions: Vec<Filter>) -> Self {
        Self::ElemMatch {
            path: path.into(),
            conditions,
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or(filters)
    }

    /// Negates a fragment.
    ///
    /// Field conditions are negated in place with `$not`, which keeps them usable inside an
    /// element match. Any other fragment becomes a single-member `$nor`.
    pub fn negate(self) -> Self {
        match self {
            Self::Field { path, condition } => {
                let inner = if is_operator_doc(&condition) {
                    condition
                } else {
                    single(ops::EQ, condition)
                };
                Self::Field {
                    path,
                    condition: single(ops::NOT, inner),
                }
            }
            other => Self::Nor(vec![other]),
        }
    }

    pub fn render(&self) -> JsonValue {
        match self {
            Self::Field { path, condition } => single(path, condition.clone()),
            Self::ElemMatch { path, conditions } => {
                single(path, single(ops::ELEM_MATCH, render_conjunction(conditions)))
            }
            Self::And(items) => single(ops::AND, render_all(items)),
            Self::Or(items) => single(ops::OR, render_all(items)),
            Self::Nor(items) => single(ops::NOR, render_all(items)),
        }
    }
}

/// Renders conditions that must all hold as one object when their keys are distinct, otherwise
/// as an explicit `$and`.
fn render_conjunction(conditions: &[Filter]) -> JsonValue {
    let rendered: Vec<JsonValue> = conditions.iter().map(Filter::render).collect();

    let mut seen = HashSet::new();
    let distinct = rendered.iter().all(|doc| match doc.as_object() {
        Some(map) => map.keys().all(|k| seen.insert(k.clone())),
        None => false,
    });

    if !distinct {
        return single(ops::AND, JsonValue::Array(rendered));
    }

    let mut merged = Map::new();
    for doc in rendered {
        if let JsonValue::Object(map) = doc {
            merged.extend(map);
        }
    }
    JsonValue::Object(merged)
}

fn render_all(items: &[Filter]) -> JsonValue {
    JsonValue::Array(items.iter().map(Filter::render).collect())
}

fn single(key: &str, value: JsonValue) -> JsonValue {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    JsonValue::Object(map)
}

/// True when `value` is a query-operator document such as `{"$gt": 5}`.
///
/// Extended-JSON scalars (`$numberDecimal`, `$date`) are values, not operators.
pub fn is_operator_doc(value: &JsonValue) -> bool {
    match value.as_object() {
        Some(map) if !map.is_empty() => map
            .keys()
            .all(|k| k.starts_with('$') && k != ops::NUMBER_DECIMAL && k != ops::DATE),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn negating_a_plain_value_uses_eq() {
        let f = Filter::field("Value.String", json!("x")).negate();
        assert_eq!(f.render(), json!({"Value.String": {"$not": {"$eq": "x"}}}));
    }

    #[test]
    fn negating_an_operator_doc_wraps_it() {
        let f = Filter::field("Value.n", json!({"$gt": {"$numberDecimal": "4"}})).negate();
        assert_eq!(
            f.render(),
            json!({"Value.n": {"$not": {"$gt": {"$numberDecimal": "4"}}}})
        );
    }

    #[test]
    fn decimal_wrapper_is_not_an_operator_doc() {
        assert!(!is_operator_doc(&json!({"$numberDecimal": "1"})));
        assert!(is_operator_doc(&json!({"$regex": "^a", "$options": "i"})));
    }

    #[test]
    fn negating_a_group_uses_nor() {
        let f = Filter::and(vec![Filter::field("a", json!(1))]).negate();
        assert_eq!(f.render(), json!({"$nor": [{"$and": [{"a": 1}]}]}));
    }

    #[test]
    fn elem_match_merges_distinct_keys() {
        let f = Filter::elem_match(
            "searchIndexes",
            vec![
                Filter::field("SearchParameter.Code", json!("name")),
                Filter::field("Value.String", json!({"$eq": "Peter"})),
            ],
        );
        assert_eq!(
            f.render(),
            json!({"searchIndexes": {"$elemMatch": {
                "SearchParameter.Code": "name",
                "Value.String": {"$eq": "Peter"}
            }}})
        );
    }

    #[test]
    fn elem_match_with_repeated_keys_uses_and() {
        let f = Filter::elem_match(
            "searchIndexes",
            vec![
                Filter::field("Value.String", json!({"$regex": "^Pe"})),
                Filter::field("Value.String", json!({"$regex": "ter"})),
            ],
        );
        assert_eq!(
            f.render(),
            json!({"searchIndexes": {"$elemMatch": {"$and": [
                {"Value.String": {"$regex": "^Pe"}},
                {"Value.String": {"$regex": "ter"}}
            ]}}})
        );
    }
}
