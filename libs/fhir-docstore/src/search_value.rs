//! Indexed search values extracted from a resource
//!
//! One `SearchIndexEntry` is produced per (parameter, value) pair by the extraction pipeline.
//! The encoder turns each entry into the sub-document stored under `searchIndexes`.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Search parameter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    String,
    Number,
    Date,
    Token,
    Reference,
    Quantity,
    Uri,
    Composite,
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSearchParamTypeError;

impl FromStr for SearchParamType {
    type Err = ParseSearchParamTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "token" => Ok(Self::Token),
            "reference" => Ok(Self::Reference),
            "quantity" => Ok(Self::Quantity),
            "uri" => Ok(Self::Uri),
            "composite" => Ok(Self::Composite),
            "special" => Ok(Self::Special),
            _ => Err(ParseSearchParamTypeError),
        }
    }
}

impl SearchParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Token => "token",
            Self::Reference => "reference",
            Self::Quantity => "quantity",
            Self::Uri => "uri",
            Self::Composite => "composite",
            Self::Special => "special",
        }
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search parameter definition as seen by the indexer.
///
/// Only `code`, `name`, `url` and `param_type` are persisted; the rest is stripped by the
/// encoder to keep documents small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameterInfo {
    pub code: String,
    pub name: String,
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub param_type: SearchParamType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub base_resource_types: Vec<String>,
    #[serde(default)]
    pub target_resource_types: Vec<String>,
}

impl SearchParameterInfo {
    pub fn new(code: impl Into<String>, param_type: SearchParamType) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            url: None,
            param_type,
            description: None,
            expression: None,
            base_resource_types: Vec::new(),
            target_resource_types: Vec::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// Typed value of one index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SearchValue {
    String {
        value: String,
    },
    Token {
        system: Option<String>,
        code: Option<String>,
        text: Option<String>,
    },
    Reference {
        base_uri: Option<String>,
        resource_type: Option<String>,
        resource_id: String,
    },
    Number {
        value: Decimal,
    },
    Uri {
        value: String,
    },
    /// Inclusive instant range; a partial date such as `2024-03` covers the whole month.
    Date {
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
        #[serde(default)]
        is_valid_as_composite_component: bool,
        #[serde(default)]
        is_min: bool,
        #[serde(default)]
        is_max: bool,
    },
    Quantity {
        system: Option<String>,
        code: Option<String>,
        low: Decimal,
        high: Decimal,
    },
    /// Ordered component values of a composite parameter.
    Composite {
        components: Vec<SearchValue>,
    },
}

impl SearchValue {
    /// Parameter type this value is encoded for.
    pub fn param_type(&self) -> SearchParamType {
        match self {
            SearchValue::String { .. } => SearchParamType::String,
            SearchValue::Token { .. } => SearchParamType::Token,
            SearchValue::Reference { .. } => SearchParamType::Reference,
            SearchValue::Number { .. } => SearchParamType::Number,
            SearchValue::Uri { .. } => SearchParamType::Uri,
            SearchValue::Date { .. } => SearchParamType::Date,
            SearchValue::Quantity { .. } => SearchParamType::Quantity,
            SearchValue::Composite { .. } => SearchParamType::Composite,
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        SearchValue::String {
            value: value.into(),
        }
    }

    pub fn token(system: Option<&str>, code: impl Into<String>) -> Self {
        SearchValue::Token {
            system: system.map(str::to_string),
            code: Some(code.into()),
            text: None,
        }
    }

    pub fn quantity(low: Decimal, high: Decimal) -> Self {
        SearchValue::Quantity {
            system: None,
            code: None,
            low,
            high,
        }
    }
}

/// One denormalized index row attached to a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIndexEntry {
    pub search_parameter: SearchParameterInfo,
    pub value: SearchValue,
}

impl SearchIndexEntry {
    pub fn new(search_parameter: SearchParameterInfo, value: SearchValue) -> Self {
        Self {
            search_parameter,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_param_types() {
        assert_eq!("token".parse::<SearchParamType>(), Ok(SearchParamType::Token));
        assert_eq!(
            "Token".parse::<SearchParamType>(),
            Err(ParseSearchParamTypeError)
        );
        assert_eq!(SearchParamType::Quantity.to_string(), "quantity");
    }

    #[test]
    fn value_reports_its_param_type() {
        assert_eq!(
            SearchValue::token(Some("http://loinc.org"), "1234-5").param_type(),
            SearchParamType::Token
        );
        assert_eq!(
            SearchValue::Composite { components: vec![] }.param_type(),
            SearchParamType::Composite
        );
    }
}
