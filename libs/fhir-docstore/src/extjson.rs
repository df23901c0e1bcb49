//! Extended-JSON scalar wrappers used in documents and filters
//!
//! Decimals travel as `{"$numberDecimal": "..."}` and instants as `{"$date": "..."}` so that
//! neither loses precision through `serde_json` number handling.

use crate::constants::ops;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::str::FromStr;

/// Keeps the scale of `value`, so `5.000` is stored as `"5.000"`.
pub fn decimal(value: Decimal) -> JsonValue {
    json!({ (ops::NUMBER_DECIMAL): value.to_string() })
}

pub fn date<Tz: TimeZone>(value: &DateTime<Tz>) -> JsonValue {
    let utc = value.with_timezone(&Utc);
    json!({ (ops::DATE): utc.to_rfc3339_opts(SecondsFormat::Millis, true) })
}

/// Reads a `$numberDecimal` wrapper or a plain JSON number.
pub fn as_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Object(map) if map.len() == 1 => map
            .get(ops::NUMBER_DECIMAL)
            .and_then(|v| v.as_str())
            .and_then(|s| Decimal::from_str(s).ok()),
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

pub fn as_date(value: &JsonValue) -> Option<DateTime<Utc>> {
    let JsonValue::Object(map) = value else {
        return None;
    };
    if map.len() != 1 {
        return None;
    }
    let raw = map.get(ops::DATE)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn decimal_keeps_its_scale() {
        let v = decimal(Decimal::from_str("5.000").unwrap());
        assert_eq!(v, json!({"$numberDecimal": "5.000"}));
        assert_eq!(as_decimal(&v), Some(Decimal::from(5)));
        assert_eq!(as_decimal(&v).map(|d| d.scale()), Some(3));
    }

    #[test]
    fn dates_are_stored_in_utc() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = offset.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let v = date(&local);
        assert_eq!(v, json!({"$date": "2024-03-01T08:00:00.000Z"}));
        assert_eq!(as_date(&v), Some(local.with_timezone(&Utc)));
    }

    #[test]
    fn plain_numbers_read_as_decimal() {
        assert_eq!(as_decimal(&json!(12)), Some(Decimal::from(12)));
        assert_eq!(as_decimal(&json!("12")), None);
    }
}
