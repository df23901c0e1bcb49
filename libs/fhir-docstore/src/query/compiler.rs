//! Expression compiler
//!
//! Walks a predicate tree with one exhaustive `match` and drives a [`QueryAssembler`]. Every node
//! kind has exactly one rule; kinds without a native translation fail with
//! `UnsupportedExpression` instead of being dropped.

use super::assembler::{missing_parameter_filter, QueryAssembler};
use super::filter::Filter;
use crate::constants::{entry_code_path, fields, ops, reserved, resource_path};
use crate::expression::{BooleanOperator, Expression, ExpressionValue, FieldName, StringOperator};
use crate::{extjson, mapping, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;

/// How `Not` nodes are translated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NegationMode {
    /// Each leaf reached under a `Not` is negated on its own. Groups are not rewritten, so
    /// `Not(And(a, b))` means `And(Not(a), Not(b))`.
    #[default]
    LeafOnly,
    /// `Not` above any boolean group is rejected.
    RejectComposite,
}

impl FromStr for NegationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "leaf-only" => Ok(Self::LeafOnly),
            "reject-composite" => Ok(Self::RejectComposite),
            other => Err(Error::Validation(format!("unknown negation mode '{other}'"))),
        }
    }
}

impl fmt::Display for NegationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeafOnly => f.write_str("leaf-only"),
            Self::RejectComposite => f.write_str("reject-composite"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    #[serde(default)]
    pub negation: NegationMode,
}

impl CompileOptions {
    pub fn with_negation(negation: NegationMode) -> Self {
        Self { negation }
    }
}

/// Compiles a predicate tree into a rendered native filter.
pub fn compile(expression: &Expression, options: &CompileOptions) -> Result<JsonValue> {
    let mut assembler = QueryAssembler::new();
    compile_into(expression, &mut assembler, options)?;
    let filter = assembler.render_filters()?;
    tracing::debug!(
        kind = expression.kind_name(),
        filter = %filter,
        "Compiled search expression"
    );
    Ok(filter)
}

/// Filter used when a search carries no predicate tree.
pub fn match_all() -> JsonValue {
    json!({ (ops::AND): [{ (fields::IS_DELETED): false }] })
}

/// Compiles `expression` into an existing assembler without rendering it.
pub fn compile_into(
    expression: &Expression,
    assembler: &mut QueryAssembler,
    options: &CompileOptions,
) -> Result<()> {
    let mut compiler = ExpressionCompiler {
        assembler,
        options,
        parameter: None,
    };
    compiler.visit(expression)
}

struct ExpressionCompiler<'a> {
    assembler: &'a mut QueryAssembler,
    options: &'a CompileOptions,
    /// Code of the parameter whose subtree is being visited.
    parameter: Option<String>,
}

impl ExpressionCompiler<'_> {
    fn visit(&mut self, expression: &Expression) -> Result<()> {
        match expression {
            Expression::Parameter { code, expression } => {
                self.visit_parameter(code, expression.as_deref())
            }
            Expression::MissingParameter { code } => self.visit_missing_parameter(code),
            Expression::Boolean {
                operator,
                expressions,
            } => {
                // `$and`/`$or` take a non-empty array.
                if expressions.is_empty() {
                    return Err(Error::UnsupportedExpression(format!(
                        "empty {operator:?} group"
                    )));
                }
                self.assembler.push_multiary_operator(*operator);
                for child in expressions {
                    self.visit(child)?;
                }
                self.assembler.pop_multiary_operator()
            }
            Expression::Not { expression } => {
                if self.options.negation == NegationMode::RejectComposite
                    && expression.contains_boolean()
                {
                    return Err(Error::UnsupportedExpression(
                        "Not over a boolean group".to_string(),
                    ));
                }
                self.assembler.push_negation();
                self.visit(expression)?;
                self.assembler.pop_negation()
            }
            Expression::Binary {
                field,
                operator,
                value,
            } => {
                let path = mapping::value_path(*field)?;
                let op = mapping::binary_operator(*operator)?;
                let encoded = encode_binary_value(value)?;
                self.assembler
                    .add_condition(Filter::field(path, json!({ (op): encoded })))
            }
            Expression::StringMatch {
                field,
                operator,
                value,
                ignore_case,
            } => {
                let condition = string_condition(*field, *operator, value, *ignore_case)?;
                self.assembler.add_condition(condition)
            }
            Expression::Chained { .. }
            | Expression::Union { .. }
            | Expression::In { .. }
            | Expression::Compartment { .. }
            | Expression::SmartCompartment { .. }
            | Expression::Include { .. }
            | Expression::Sort { .. }
            | Expression::MissingField { .. } => {
                Err(Error::UnsupportedExpression(expression.kind_name().to_string()))
            }
        }
    }

    fn visit_parameter(&mut self, code: &str, child: Option<&Expression>) -> Result<()> {
        if let Some(outer) = &self.parameter {
            return Err(Error::UnsupportedExpression(format!(
                "Parameter '{code}' nested inside parameter '{outer}'"
            )));
        }

        match code {
            reserved::RESOURCE_TYPE => {
                let filter = resource_type_filter(child)?;
                return self.assembler.add_filter(filter);
            }
            reserved::ID | reserved::LAST_UPDATED | reserved::WILDCARD_REFERENCE => {
                return Err(Error::UnsupportedExpression(format!(
                    "reserved parameter '{code}'"
                )));
            }
            _ => {}
        }

        self.assembler.start_new_filter()?;
        self.assembler
            .add_scope_condition(Filter::field(entry_code_path(), json!(code)))?;
        self.parameter = Some(code.to_string());
        let visited = match child {
            Some(child) => self.visit(child),
            None => Ok(()),
        };
        self.parameter = None;
        visited?;
        self.assembler.complete_filter()
    }

    fn visit_missing_parameter(&mut self, code: &str) -> Result<()> {
        if code.starts_with('_') {
            return Err(Error::UnsupportedExpression(format!(
                "missing check on reserved parameter '{code}'"
            )));
        }
        if let Some(outer) = &self.parameter {
            return Err(Error::UnsupportedExpression(format!(
                "MissingParameter '{code}' nested inside parameter '{outer}'"
            )));
        }
        self.assembler.add_filter(missing_parameter_filter(code))
    }
}

fn encode_binary_value(value: &ExpressionValue) -> Result<JsonValue> {
    match value {
        ExpressionValue::Decimal(d) => Ok(extjson::decimal(*d)),
        ExpressionValue::DateTime(dt) => Ok(extjson::date(dt)),
        ExpressionValue::String(s) => Ok(JsonValue::String(s.clone())),
        ExpressionValue::Integer(_) | ExpressionValue::Boolean(_) => {
            Err(Error::UnsupportedValueType(value.type_name().to_string()))
        }
    }
}

fn string_condition(
    field: FieldName,
    operator: StringOperator,
    value: &str,
    ignore_case: bool,
) -> Result<Filter> {
    let path = mapping::value_path(field)?;
    let escaped = regex::escape(value);
    let condition = match operator {
        StringOperator::Equals if !ignore_case => json!({ (ops::EQ): value }),
        StringOperator::Equals => pattern(format!("^{escaped}$"), true),
        StringOperator::StartsWith => pattern(format!("^{escaped}"), ignore_case),
        StringOperator::Contains => pattern(escaped, ignore_case),
        StringOperator::EndsWith
        | StringOperator::NotContains
        | StringOperator::NotEndsWith
        | StringOperator::NotStartsWith
        | StringOperator::LeftSideStartsWith => {
            return Err(Error::UnsupportedStringOperator(operator));
        }
    };
    Ok(Filter::field(path, condition))
}

fn pattern(regex: String, ignore_case: bool) -> JsonValue {
    if ignore_case {
        json!({ (ops::REGEX): regex, (ops::OPTIONS): "i" })
    } else {
        json!({ (ops::REGEX): regex })
    }
}

/// `_type` filters on the stored resource type instead of the index.
fn resource_type_filter(child: Option<&Expression>) -> Result<Filter> {
    let path = resource_path(fields::RESOURCE_TYPE);
    match child {
        Some(Expression::StringMatch {
            operator: StringOperator::Equals,
            value,
            ignore_case: false,
            ..
        }) => Ok(Filter::field(path, json!(value))),
        Some(Expression::Boolean {
            operator: BooleanOperator::Or,
            expressions,
        }) if !expressions.is_empty() => {
            let types = expressions
                .iter()
                .map(|e| match e {
                    Expression::StringMatch {
                        operator: StringOperator::Equals,
                        value,
                        ignore_case: false,
                        ..
                    } => Ok(value.clone()),
                    other => Err(Error::UnsupportedExpression(format!(
                        "_type alternative of kind {}",
                        other.kind_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Filter::field(path, json!({ (ops::IN): types })))
        }
        Some(other) => Err(Error::UnsupportedExpression(format!(
            "_type with {} child",
            other.kind_name()
        ))),
        None => Err(Error::UnsupportedExpression(
            "_type without a value".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::BinaryOperator;
    use rust_decimal::Decimal;

    fn leaf_only() -> CompileOptions {
        CompileOptions::default()
    }

    fn name_equals(v: &str) -> Expression {
        Expression::parameter("name", Expression::string_equals(FieldName::String, v))
    }

    #[test]
    fn parameter_compiles_to_single_elem_match() {
        let filter = compile(
            &Expression::parameter("foo", Expression::string_equals(FieldName::String, "bar")),
            &leaf_only(),
        )
        .unwrap();

        assert_eq!(
            filter,
            json!({"$and": [
                {"searchIndexes": {"$elemMatch": {
                    "SearchParameter.Code": "foo",
                    "Value.String": {"$eq": "bar"}
                }}},
                {"isDeleted": false}
            ]})
        );
    }

    #[test]
    fn parameter_without_child_asserts_presence() {
        let filter = compile(
            &Expression::Parameter {
                code: "telecom".into(),
                expression: None,
            },
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(
            filter["$and"][0],
            json!({"searchIndexes": {"$elemMatch": {"SearchParameter.Code": "telecom"}}})
        );
    }

    #[test]
    fn missing_parameter_is_a_direct_filter() {
        let filter = compile(&Expression::missing_parameter("foo"), &leaf_only()).unwrap();
        assert_eq!(
            filter,
            json!({"$and": [
                {"searchIndexes.SearchParameter.Code": {"$nin": ["foo"]}},
                {"isDeleted": false}
            ]})
        );
        assert!(!filter.to_string().contains("$elemMatch"));
    }

    #[test]
    fn binary_decimal_comparison() {
        let filter = compile(
            &Expression::parameter(
                "probability",
                Expression::binary(
                    FieldName::Number,
                    BinaryOperator::GreaterThan,
                    ExpressionValue::Decimal(Decimal::new(45, 1)),
                ),
            ),
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"]["Value.n"],
            json!({"$gt": {"$numberDecimal": "4.5"}})
        );
    }

    #[test]
    fn binary_datetime_comparison_is_stored_in_utc() {
        let since = chrono::DateTime::parse_from_rfc3339("1980-05-01T02:00:00+02:00").unwrap();
        let filter = compile(
            &Expression::parameter(
                "birthdate",
                Expression::binary(
                    FieldName::DateTimeStart,
                    BinaryOperator::GreaterThanOrEqual,
                    ExpressionValue::DateTime(since),
                ),
            ),
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"]["Value.Start"],
            json!({"$gte": {"$date": "1980-05-01T00:00:00.000Z"}})
        );
    }

    #[test]
    fn binary_string_comparison() {
        let filter = compile(
            &Expression::parameter(
                "url",
                Expression::binary(
                    FieldName::Uri,
                    BinaryOperator::NotEqual,
                    ExpressionValue::String("http://acme.org/fhir".into()),
                ),
            ),
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"]["Value.u"],
            json!({"$ne": "http://acme.org/fhir"})
        );
    }

    #[test]
    fn boolean_comparison_is_rejected() {
        let err = compile(
            &Expression::parameter(
                "active",
                Expression::binary(
                    FieldName::TokenCode,
                    BinaryOperator::Equal,
                    ExpressionValue::Boolean(true),
                ),
            ),
            &leaf_only(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueType(ref t) if t == "boolean"));
    }

    #[test]
    fn empty_groups_are_rejected() {
        let empty_or = Expression::parameter("name", Expression::or(vec![]));
        assert!(matches!(
            compile(&empty_or, &leaf_only()),
            Err(Error::UnsupportedExpression(_))
        ));
        assert!(matches!(
            compile(&Expression::and(vec![]), &leaf_only()),
            Err(Error::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn integer_comparison_is_rejected() {
        let err = compile(
            &Expression::parameter(
                "count",
                Expression::binary(
                    FieldName::Number,
                    BinaryOperator::Equal,
                    ExpressionValue::Integer(3),
                ),
            ),
            &leaf_only(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedValueType(ref t) if t == "integer"));
    }

    #[test]
    fn string_patterns_escape_user_text() {
        let starts = string_condition(FieldName::String, StringOperator::StartsWith, "a.b", false)
            .unwrap();
        assert_eq!(starts.render(), json!({"Value.String": {"$regex": "^a\\.b"}}));

        let contains =
            string_condition(FieldName::String, StringOperator::Contains, "ete", true).unwrap();
        assert_eq!(
            contains.render(),
            json!({"Value.String": {"$regex": "ete", "$options": "i"}})
        );

        let equals_ci =
            string_condition(FieldName::String, StringOperator::Equals, "Peter", true).unwrap();
        assert_eq!(
            equals_ci.render(),
            json!({"Value.String": {"$regex": "^Peter$", "$options": "i"}})
        );
    }

    #[test]
    fn unsupported_string_operators_fail_fast() {
        for op in [
            StringOperator::EndsWith,
            StringOperator::NotContains,
            StringOperator::NotEndsWith,
            StringOperator::NotStartsWith,
            StringOperator::LeftSideStartsWith,
        ] {
            let err = compile(
                &Expression::parameter("name", Expression::string(FieldName::String, op, "x")),
                &leaf_only(),
            )
            .unwrap_err();
            assert!(matches!(err, Error::UnsupportedStringOperator(o) if o == op));
        }
    }

    #[test]
    fn unsupported_kinds_are_named() {
        let err = compile(&Expression::Sort { code: "name".into() }, &leaf_only()).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported expression: Sort");

        let err = compile(
            &Expression::Chained {
                reference_code: "subject".into(),
                target_resource_types: vec!["Patient".into()],
                reversed: false,
                expression: Box::new(name_equals("x")),
            },
            &leaf_only(),
        )
        .unwrap_err();
        assert!(err.is_compile_error());
        assert!(err.to_string().contains("Chained"));
    }

    #[test]
    fn nested_or_stays_nested_under_root_and() {
        let tree = Expression::and(vec![
            Expression::or(vec![name_equals("a"), name_equals("b")]),
            name_equals("c"),
        ]);
        let filter = compile(&tree, &leaf_only()).unwrap();
        let conjuncts = filter["$and"].as_array().unwrap();

        assert_eq!(conjuncts.len(), 3);
        let alternatives = conjuncts[0]["$or"].as_array().unwrap();
        assert_eq!(alternatives.len(), 2);
        assert!(alternatives[0]["searchIndexes"]["$elemMatch"].is_object());
        assert_eq!(
            conjuncts[1]["searchIndexes"]["$elemMatch"]["Value.String"],
            json!({"$eq": "c"})
        );
        assert_eq!(conjuncts[2], json!({"isDeleted": false}));
    }

    #[test]
    fn root_or_is_kept_as_disjunction() {
        let tree = Expression::or(vec![name_equals("a"), name_equals("b")]);
        let filter = compile(&tree, &leaf_only()).unwrap();
        let conjuncts = filter["$and"].as_array().unwrap();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0]["$or"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn or_inside_parameter_is_nested_in_elem_match() {
        let tree = Expression::parameter(
            "name",
            Expression::or(vec![
                Expression::string_equals(FieldName::String, "a"),
                Expression::string_equals(FieldName::String, "b"),
            ]),
        );
        let filter = compile(&tree, &leaf_only()).unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"],
            json!({
                "SearchParameter.Code": "name",
                "$or": [
                    {"Value.String": {"$eq": "a"}},
                    {"Value.String": {"$eq": "b"}}
                ]
            })
        );
    }

    #[test]
    fn and_inside_parameter_is_flattened() {
        let tree = Expression::parameter(
            "identifier",
            Expression::and(vec![
                Expression::string_equals(FieldName::TokenSystem, "urn:sys"),
                Expression::string_equals(FieldName::TokenCode, "123"),
            ]),
        );
        let filter = compile(&tree, &leaf_only()).unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"],
            json!({
                "SearchParameter.Code": "identifier",
                "Value.System": {"$eq": "urn:sys"},
                "Value.Code": {"$eq": "123"}
            })
        );
    }

    #[test]
    fn not_leaf_wraps_only_the_leaf() {
        let filter = compile(&Expression::not(name_equals("x")), &leaf_only()).unwrap();
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"],
            json!({
                "SearchParameter.Code": "name",
                "Value.String": {"$not": {"$eq": "x"}}
            })
        );
    }

    #[test]
    fn not_and_negates_each_leaf_in_leaf_only_mode() {
        let tree = Expression::not(Expression::parameter(
            "name",
            Expression::and(vec![
                Expression::string_equals(FieldName::String, "x"),
                Expression::string(FieldName::String, StringOperator::StartsWith, "y"),
            ]),
        ));
        let filter = compile(&tree, &leaf_only()).unwrap();
        // Both leaves address Value.String, so the body needs an explicit $and.
        assert_eq!(
            filter["$and"][0]["searchIndexes"]["$elemMatch"],
            json!({"$and": [
                {"SearchParameter.Code": "name"},
                {"Value.String": {"$not": {"$eq": "x"}}},
                {"Value.String": {"$not": {"$regex": "^y"}}}
            ]})
        );
    }

    #[test]
    fn not_and_is_rejected_in_reject_composite_mode() {
        let options = CompileOptions::with_negation(NegationMode::RejectComposite);
        let tree = Expression::not(Expression::and(vec![name_equals("x"), name_equals("y")]));
        let err = compile(&tree, &options).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(_)));

        // A plain leaf is still fine.
        assert!(compile(&Expression::not(name_equals("x")), &options).is_ok());
    }

    #[test]
    fn type_parameter_filters_resource_type() {
        let single = compile(
            &Expression::parameter("_type", Expression::string_equals(FieldName::String, "Patient")),
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(single["$and"][0], json!({"resource.resourceType": "Patient"}));

        let many = compile(
            &Expression::parameter(
                "_type",
                Expression::or(vec![
                    Expression::string_equals(FieldName::String, "Patient"),
                    Expression::string_equals(FieldName::String, "Group"),
                ]),
            ),
            &leaf_only(),
        )
        .unwrap();
        assert_eq!(
            many["$and"][0],
            json!({"resource.resourceType": {"$in": ["Patient", "Group"]}})
        );
    }

    #[test]
    fn other_reserved_parameters_are_unsupported() {
        for code in ["_id", "_lastUpdated", "_wildcardReference"] {
            let err = compile(
                &Expression::parameter(code, Expression::string_equals(FieldName::String, "x")),
                &leaf_only(),
            )
            .unwrap_err();
            assert!(matches!(err, Error::UnsupportedExpression(_)), "{code}");
        }
        assert!(compile(&Expression::missing_parameter("_type"), &leaf_only()).is_err());
    }

    #[test]
    fn nested_parameters_are_rejected() {
        let tree = Expression::parameter("outer", name_equals("x"));
        assert!(matches!(
            compile(&tree, &leaf_only()),
            Err(Error::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn leaf_outside_parameter_is_assembler_misuse() {
        let err = compile(
            &Expression::string_equals(FieldName::String, "x"),
            &leaf_only(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::AssemblerState(_)));
    }

    #[test]
    fn negation_mode_parses_from_cli_names() {
        assert_eq!(
            "reject-composite".parse::<NegationMode>().unwrap(),
            NegationMode::RejectComposite
        );
        assert_eq!(NegationMode::LeafOnly.to_string(), "leaf-only");
        assert!("both".parse::<NegationMode>().is_err());
    }
}
