//! Abstract search predicate tree
//!
//! Trees are built by the request pipeline (parameter parsing, validation, rewriting) and handed
//! to the compiler read-only. The enum is closed: adding a variant forces every `match` over it
//! to grow a rule, which is how the compiler keeps its dispatch exhaustive.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One node of a search predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Expression {
    /// Numeric, date or decimal comparison against one index field.
    Binary {
        field: FieldName,
        operator: BinaryOperator,
        value: ExpressionValue,
    },

    /// String comparison against one index field.
    StringMatch {
        field: FieldName,
        operator: StringOperator,
        value: String,
        #[serde(default)]
        ignore_case: bool,
    },

    /// Conjunction or disjunction of child predicates.
    Boolean {
        operator: BooleanOperator,
        expressions: Vec<Expression>,
    },

    Not { expression: Box<Expression> },

    /// Names the search parameter a subtree belongs to.
    ///
    /// A parameter without a child asserts that at least one index entry exists for `code`.
    Parameter {
        code: String,
        #[serde(default)]
        expression: Option<Box<Expression>>,
    },

    /// Asserts that no index entry exists for `code`.
    MissingParameter { code: String },

    Chained {
        reference_code: String,
        target_resource_types: Vec<String>,
        reversed: bool,
        expression: Box<Expression>,
    },

    Union {
        operator: BooleanOperator,
        expressions: Vec<Expression>,
    },

    In { field: FieldName, values: Vec<String> },

    Compartment {
        compartment_type: String,
        compartment_id: String,
    },

    SmartCompartment {
        compartment_type: String,
        compartment_id: String,
    },

    Include {
        source_resource_type: String,
        reference_code: String,
        target_resource_type: Option<String>,
        reversed: bool,
        iterate: bool,
    },

    Sort { code: String },

    MissingField { field: FieldName },
}

impl Expression {
    /// Stable name of the node kind, used in error messages and logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Binary { .. } => "Binary",
            Expression::StringMatch { .. } => "StringMatch",
            Expression::Boolean { .. } => "Boolean",
            Expression::Not { .. } => "Not",
            Expression::Parameter { .. } => "Parameter",
            Expression::MissingParameter { .. } => "MissingParameter",
            Expression::Chained { .. } => "Chained",
            Expression::Union { .. } => "Union",
            Expression::In { .. } => "In",
            Expression::Compartment { .. } => "Compartment",
            Expression::SmartCompartment { .. } => "SmartCompartment",
            Expression::Include { .. } => "Include",
            Expression::Sort { .. } => "Sort",
            Expression::MissingField { .. } => "MissingField",
        }
    }

    /// True if a `Boolean` node appears anywhere in this subtree (including the root).
    pub fn contains_boolean(&self) -> bool {
        match self {
            Expression::Boolean { .. } => true,
            Expression::Not { expression } => expression.contains_boolean(),
            Expression::Parameter {
                expression: Some(child),
                ..
            } => child.contains_boolean(),
            _ => false,
        }
    }

    pub fn parameter(code: impl Into<String>, expression: Expression) -> Self {
        Expression::Parameter {
            code: code.into(),
            expression: Some(Box::new(expression)),
        }
    }

    pub fn missing_parameter(code: impl Into<String>) -> Self {
        Expression::MissingParameter { code: code.into() }
    }

    pub fn and(expressions: Vec<Expression>) -> Self {
        Expression::Boolean {
            operator: BooleanOperator::And,
            expressions,
        }
    }

    pub fn or(expressions: Vec<Expression>) -> Self {
        Expression::Boolean {
            operator: BooleanOperator::Or,
            expressions,
        }
    }

    pub fn not(expression: Expression) -> Self {
        Expression::Not {
            expression: Box::new(expression),
        }
    }

    pub fn binary(field: FieldName, operator: BinaryOperator, value: ExpressionValue) -> Self {
        Expression::Binary {
            field,
            operator,
            value,
        }
    }

    pub fn string(field: FieldName, operator: StringOperator, value: impl Into<String>) -> Self {
        Expression::StringMatch {
            field,
            operator,
            value: value.into(),
            ignore_case: false,
        }
    }

    pub fn string_equals(field: FieldName, value: impl Into<String>) -> Self {
        Self::string(field, StringOperator::Equals, value)
    }
}

/// Index value fields a predicate can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldName {
    DateTimeStart,
    DateTimeEnd,
    DateTimeIsLongerThanADay,
    Number,
    ParamName,
    Quantity,
    QuantityLow,
    QuantityHigh,
    QuantityCode,
    QuantitySystem,
    ReferenceBaseUri,
    ReferenceResourceId,
    ReferenceResourceType,
    String,
    TokenCode,
    TokenSystem,
    TokenText,
    Uri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    /// `sa` prefix; rewritten into range comparisons before compilation.
    StartsAfter,
    /// `eb` prefix; rewritten into range comparisons before compilation.
    EndsBefore,
    /// `ap` prefix; rewritten into range comparisons before compilation.
    Approximately,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringOperator {
    Equals,
    StartsWith,
    Contains,
    EndsWith,
    NotContains,
    NotEndsWith,
    NotStartsWith,
    LeftSideStartsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BooleanOperator {
    And,
    Or,
}

/// Right-hand side of a `Binary` comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionValue {
    Decimal(Decimal),
    DateTime(DateTime<FixedOffset>),
    String(String),
    Integer(i64),
    Boolean(bool),
}

impl ExpressionValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ExpressionValue::Decimal(_) => "decimal",
            ExpressionValue::DateTime(_) => "dateTime",
            ExpressionValue::String(_) => "string",
            ExpressionValue::Integer(_) => "integer",
            ExpressionValue::Boolean(_) => "boolean",
        }
    }
}
