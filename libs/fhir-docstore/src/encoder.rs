//! Search-index encoder
//!
//! Converts one `SearchIndexEntry` into the sub-document stored per entry under
//! `searchIndexes`:
//!
//! ```json
//! { "SearchParameter": { "Code": "...", "Name": "...", "Url": "...", "Type": "token" },
//!   "Value": { "System": "...", "Code": "..." } }
//! ```
//!
//! Parameter metadata is trimmed to what queries and reindexing need. The description, the
//! base/target resource type lists and the extraction expression are dropped.

use crate::constants::values;
use crate::extjson;
use crate::search_value::{SearchIndexEntry, SearchParamType, SearchParameterInfo, SearchValue};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Trimmed parameter metadata persisted with every index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSearchParameter {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Url", skip_serializing_if = "Option::is_none", default)]
    pub url: Option<String>,
    #[serde(rename = "Type")]
    pub param_type: SearchParamType,
}

impl From<&SearchParameterInfo> for StoredSearchParameter {
    fn from(info: &SearchParameterInfo) -> Self {
        Self {
            code: info.code.clone(),
            name: info.name.clone(),
            url: info.url.clone(),
            param_type: info.param_type,
        }
    }
}

/// Encoded form of one index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchIndexEntryDocument {
    #[serde(rename = "SearchParameter")]
    pub search_parameter: StoredSearchParameter,
    #[serde(rename = "Value")]
    pub value: JsonValue,
}

impl SearchIndexEntryDocument {
    pub fn to_json(&self) -> Result<JsonValue> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Encode one entry.
pub fn encode(entry: &SearchIndexEntry) -> Result<SearchIndexEntryDocument> {
    let declared = entry.search_parameter.param_type;
    let actual = entry.value.param_type();
    if declared != actual {
        return Err(Error::UnsupportedValueEncoding(format!(
            "parameter '{}' is declared as {} but carries a {} value",
            entry.search_parameter.code, declared, actual
        )));
    }

    let value = match &entry.value {
        SearchValue::Composite { components } => {
            encode_composite(&entry.search_parameter.code, components)?
        }
        other => encode_scalar(other)?,
    };

    Ok(SearchIndexEntryDocument {
        search_parameter: StoredSearchParameter::from(&entry.search_parameter),
        value: JsonValue::Object(value),
    })
}

/// Encode a full index set into the `searchIndexes` array. Any failing entry fails the set.
pub fn encode_all(entries: &[SearchIndexEntry]) -> Result<JsonValue> {
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        out.push(encode(entry)?.to_json()?);
    }
    Ok(JsonValue::Array(out))
}

fn encode_scalar(value: &SearchValue) -> Result<Map<String, JsonValue>> {
    let mut doc = Map::new();
    match value {
        SearchValue::String { value } => {
            doc.insert(values::STRING.into(), value.clone().into());
        }
        SearchValue::Token { system, code, text } => {
            insert_opt(&mut doc, values::SYSTEM, system);
            insert_opt(&mut doc, values::CODE, code);
            insert_opt(&mut doc, values::TEXT, text);
        }
        SearchValue::Reference {
            base_uri,
            resource_type,
            resource_id,
        } => {
            insert_opt(&mut doc, values::REFERENCE_BASE_URI, base_uri);
            insert_opt(&mut doc, values::REFERENCE_RESOURCE_TYPE, resource_type);
            doc.insert(
                values::REFERENCE_RESOURCE_ID.into(),
                resource_id.clone().into(),
            );
        }
        SearchValue::Number { value } => {
            doc.insert(values::NUMBER.into(), extjson::decimal(*value));
        }
        SearchValue::Uri { value } => {
            doc.insert(values::URI.into(), value.clone().into());
        }
        SearchValue::Date {
            start,
            end,
            is_valid_as_composite_component,
            is_min,
            is_max,
        } => {
            doc.insert(values::DATE_TIME_START.into(), extjson::date(start));
            doc.insert(values::DATE_TIME_END.into(), extjson::date(end));
            doc.insert(
                values::IS_VALID_AS_COMPOSITE_COMPONENT.into(),
                (*is_valid_as_composite_component).into(),
            );
            doc.insert(values::IS_MIN.into(), (*is_min).into());
            doc.insert(values::IS_MAX.into(), (*is_max).into());
        }
        SearchValue::Quantity {
            system,
            code,
            low,
            high,
        } => {
            insert_opt(&mut doc, values::SYSTEM, system);
            insert_opt(&mut doc, values::CODE, code);
            // Collapsed value for the common exact-match case.
            if low == high {
                doc.insert(values::QUANTITY.into(), extjson::decimal(*low));
            }
            doc.insert(values::LOW_QUANTITY.into(), extjson::decimal(*low));
            doc.insert(values::HIGH_QUANTITY.into(), extjson::decimal(*high));
        }
        SearchValue::Composite { .. } => {
            return Err(Error::UnsupportedValueEncoding(
                "composite values cannot be nested inside a composite".to_string(),
            ));
        }
    }
    Ok(doc)
}

fn encode_composite(code: &str, components: &[SearchValue]) -> Result<Map<String, JsonValue>> {
    if components.is_empty() {
        return Err(Error::UnsupportedValueEncoding(format!(
            "composite parameter '{code}' has no components"
        )));
    }

    let mut encoded = Vec::with_capacity(components.len());
    for component in components {
        let mut item = Map::new();
        item.insert(
            values::COMPONENT_TYPE.into(),
            component.param_type().as_str().into(),
        );
        item.insert(
            values::COMPONENT_VALUE.into(),
            JsonValue::Object(encode_scalar(component)?),
        );
        encoded.push(JsonValue::Object(item));
    }

    let mut doc = Map::new();
    doc.insert(values::COMPONENTS.into(), JsonValue::Array(encoded));
    Ok(doc)
}

fn insert_opt(doc: &mut Map<String, JsonValue>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        doc.insert(key.to_string(), JsonValue::String(v.clone()));
    }
}
