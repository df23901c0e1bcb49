use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataStoreKind {
    MongoDb,
}

/// Features the document-store backend advertises to the server host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCapabilities {
    pub data_store: DataStoreKind,
    pub supports_selective_search_parameters: bool,
    pub supports_export: bool,
    pub supports_transactions: bool,
    pub supports_query_cache: bool,
}

impl StoreCapabilities {
    pub fn document_store() -> Self {
        Self {
            data_store: DataStoreKind::MongoDb,
            supports_selective_search_parameters: false,
            supports_export: true,
            supports_transactions: false,
            supports_query_cache: false,
        }
    }
}
