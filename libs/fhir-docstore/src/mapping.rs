//! Static lookup from predicate fields and operators to document paths and native operators

use crate::constants::{fields, ops, values};
use crate::expression::{BinaryOperator, FieldName};
use crate::{Error, Result};

/// Index value sub-path for a predicate field, without the `Value.` namespace.
pub fn field_name(field: FieldName) -> Option<&'static str> {
    match field {
        FieldName::DateTimeStart => Some(values::DATE_TIME_START),
        FieldName::DateTimeEnd => Some(values::DATE_TIME_END),
        FieldName::Number => Some(values::NUMBER),
        FieldName::ParamName => Some(values::PARAM_NAME),
        FieldName::Quantity => Some(values::QUANTITY),
        FieldName::QuantityLow => Some(values::LOW_QUANTITY),
        FieldName::QuantityHigh => Some(values::HIGH_QUANTITY),
        FieldName::QuantityCode => Some(values::CODE),
        FieldName::QuantitySystem => Some(values::SYSTEM),
        FieldName::ReferenceBaseUri => Some(values::REFERENCE_BASE_URI),
        FieldName::ReferenceResourceId => Some(values::REFERENCE_RESOURCE_ID),
        FieldName::ReferenceResourceType => Some(values::REFERENCE_RESOURCE_TYPE),
        FieldName::String => Some(values::STRING),
        FieldName::TokenCode => Some(values::CODE),
        FieldName::TokenSystem => Some(values::SYSTEM),
        FieldName::TokenText => Some(values::TEXT),
        FieldName::Uri => Some(values::URI),
        // Not stored by the encoder.
        FieldName::DateTimeIsLongerThanADay => None,
    }
}

/// Full path of a predicate field relative to one index entry, e.g. `Value.Code`.
pub fn value_path(field: FieldName) -> Result<String> {
    let name = field_name(field).ok_or(Error::UnmappedField(field))?;
    Ok(format!("{}.{}", fields::VALUE, name))
}

/// Native comparison operator for a binary predicate.
pub fn binary_operator(operator: BinaryOperator) -> Result<&'static str> {
    match operator {
        BinaryOperator::Equal => Ok(ops::EQ),
        BinaryOperator::NotEqual => Ok(ops::NE),
        BinaryOperator::GreaterThan => Ok(ops::GT),
        BinaryOperator::GreaterThanOrEqual => Ok(ops::GTE),
        BinaryOperator::LessThan => Ok(ops::LT),
        BinaryOperator::LessThanOrEqual => Ok(ops::LTE),
        BinaryOperator::StartsAfter
        | BinaryOperator::EndsBefore
        | BinaryOperator::Approximately => Err(Error::UnmappedOperator(format!("{operator:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_quantity_share_code_and_system_paths() {
        assert_eq!(value_path(FieldName::TokenCode).unwrap(), "Value.Code");
        assert_eq!(value_path(FieldName::QuantityCode).unwrap(), "Value.Code");
        assert_eq!(value_path(FieldName::TokenSystem).unwrap(), "Value.System");
        assert_eq!(value_path(FieldName::QuantitySystem).unwrap(), "Value.System");
    }

    #[test]
    fn unstored_field_is_unmapped() {
        let err = value_path(FieldName::DateTimeIsLongerThanADay).unwrap_err();
        assert!(matches!(
            err,
            Error::UnmappedField(FieldName::DateTimeIsLongerThanADay)
        ));
    }

    #[test]
    fn maps_comparison_operators() {
        assert_eq!(binary_operator(BinaryOperator::Equal).unwrap(), "$eq");
        assert_eq!(binary_operator(BinaryOperator::LessThanOrEqual).unwrap(), "$lte");
        assert!(matches!(
            binary_operator(BinaryOperator::Approximately),
            Err(Error::UnmappedOperator(_))
        ));
    }
}
