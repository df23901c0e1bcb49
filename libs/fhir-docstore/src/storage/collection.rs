use crate::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLLECTION: &str = "resource";

/// Physical layout of resources across collections. Chosen once per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CollectionStrategy {
    /// Every resource type lives in one collection.
    Shared { name: String },
    /// One collection per resource type, named `<prefix><lower-cased type>`.
    PerResourceType {
        #[serde(default)]
        prefix: String,
    },
}

impl Default for CollectionStrategy {
    fn default() -> Self {
        Self::Shared {
            name: DEFAULT_COLLECTION.to_string(),
        }
    }
}

impl CollectionStrategy {
    pub fn collection_for(&self, resource_type: &str) -> String {
        match self {
            Self::Shared { name } => name.clone(),
            Self::PerResourceType { prefix } => {
                format!("{prefix}{}", resource_type.to_ascii_lowercase())
            }
        }
    }

    /// Collection a search targets. Per-type layouts cannot search across types.
    pub fn collection_for_search(&self, resource_type: Option<&str>) -> Result<String> {
        match (self, resource_type) {
            (Self::Shared { name }, _) => Ok(name.clone()),
            (Self::PerResourceType { .. }, Some(ty)) => Ok(self.collection_for(ty)),
            (Self::PerResourceType { .. }, None) => Err(Error::Validation(
                "a resource type is required when collections are partitioned by type".to_string(),
            )),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Shared { name } if name.trim().is_empty() => Err(Error::Validation(
                "shared collection name must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shared_ignores_resource_type() {
        let strategy = CollectionStrategy::default();
        assert_eq!(strategy.collection_for("Patient"), "resource");
        assert_eq!(strategy.collection_for_search(None).unwrap(), "resource");
    }

    #[test]
    fn per_type_lowercases_and_prefixes() {
        let strategy = CollectionStrategy::PerResourceType {
            prefix: "fhir_".into(),
        };
        assert_eq!(strategy.collection_for("MedicationRequest"), "fhir_medicationrequest");
        assert!(strategy.collection_for_search(None).is_err());
    }

    #[test]
    fn deserializes_from_config_shape() {
        let strategy: CollectionStrategy =
            serde_json::from_value(json!({"kind": "per-resource-type"})).unwrap();
        assert_eq!(
            strategy,
            CollectionStrategy::PerResourceType {
                prefix: String::new()
            }
        );
        assert!(CollectionStrategy::Shared { name: " ".into() }.validate().is_err());
    }
}
