//! Document field names shared by the encoder, the compiler and the storage layer

/// Top-level and resource-level document fields.
pub mod fields {
    pub const RESOURCE: &str = "resource";
    pub const ID: &str = "id";
    pub const RESOURCE_TYPE: &str = "resourceType";
    pub const IS_DELETED: &str = "isDeleted";
    pub const SEARCH_INDEXES: &str = "searchIndexes";
    pub const VERSION: &str = "version";
    pub const LAST_MODIFIED: &str = "lastModified";

    /// Sub-document of an index entry holding trimmed parameter metadata.
    pub const SEARCH_PARAMETER: &str = "SearchParameter";
    pub const SEARCH_PARAMETER_CODE: &str = "Code";
    pub const SEARCH_PARAMETER_NAME: &str = "Name";
    pub const SEARCH_PARAMETER_URL: &str = "Url";
    pub const SEARCH_PARAMETER_TYPE: &str = "Type";

    /// Sub-document of an index entry holding the typed value.
    pub const VALUE: &str = "Value";
}

/// Field names inside an index entry's `Value` sub-document.
pub mod values {
    pub const PARAM_NAME: &str = "p";
    pub const DATE_TIME_START: &str = "Start";
    pub const DATE_TIME_END: &str = "End";
    pub const IS_VALID_AS_COMPOSITE_COMPONENT: &str = "IsValidAsCompositeComponent";
    pub const IS_MIN: &str = "IsMin";
    pub const IS_MAX: &str = "IsMax";
    pub const NUMBER: &str = "n";
    pub const QUANTITY: &str = "Quantity";
    pub const LOW_QUANTITY: &str = "Low";
    pub const HIGH_QUANTITY: &str = "High";
    pub const SYSTEM: &str = "System";
    pub const CODE: &str = "Code";
    pub const REFERENCE_BASE_URI: &str = "rb";
    pub const REFERENCE_RESOURCE_TYPE: &str = "ResourceType";
    pub const REFERENCE_RESOURCE_ID: &str = "ResourceId";
    pub const STRING: &str = "String";
    pub const TEXT: &str = "t";
    pub const URI: &str = "u";
    pub const COMPONENTS: &str = "Components";
    pub const COMPONENT_TYPE: &str = "Type";
    pub const COMPONENT_VALUE: &str = "Value";
}

/// Search parameter codes that bypass index compilation.
pub mod reserved {
    pub const RESOURCE_TYPE: &str = "_type";
    pub const ID: &str = "_id";
    pub const LAST_UPDATED: &str = "_lastUpdated";
    pub const WILDCARD_REFERENCE: &str = "_wildcardReference";
}

/// Native filter operators.
pub mod ops {
    pub const AND: &str = "$and";
    pub const OR: &str = "$or";
    pub const NOR: &str = "$nor";
    pub const NOT: &str = "$not";
    pub const EQ: &str = "$eq";
    pub const NE: &str = "$ne";
    pub const GT: &str = "$gt";
    pub const GTE: &str = "$gte";
    pub const LT: &str = "$lt";
    pub const LTE: &str = "$lte";
    pub const IN: &str = "$in";
    pub const NIN: &str = "$nin";
    pub const REGEX: &str = "$regex";
    pub const OPTIONS: &str = "$options";
    pub const ELEM_MATCH: &str = "$elemMatch";
    pub const SET: &str = "$set";

    /// Extended-JSON type wrappers.
    pub const NUMBER_DECIMAL: &str = "$numberDecimal";
    pub const DATE: &str = "$date";
}

/// `searchIndexes.SearchParameter.Code`
pub fn search_index_code_path() -> String {
    format!(
        "{}.{}.{}",
        fields::SEARCH_INDEXES,
        fields::SEARCH_PARAMETER,
        fields::SEARCH_PARAMETER_CODE
    )
}

/// `SearchParameter.Code`, relative to one index entry.
pub fn entry_code_path() -> String {
    format!("{}.{}", fields::SEARCH_PARAMETER, fields::SEARCH_PARAMETER_CODE)
}

/// `resource.<field>`
pub fn resource_path(field: &str) -> String {
    format!("{}.{}", fields::RESOURCE, field)
}
