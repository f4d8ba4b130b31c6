//! Field extraction from untyped JSON payloads.
//!
//! Every record in this crate is built by a hand-written `from_map`
//! function rather than a derived `Deserialize`. The helpers here give
//! each field an explicit rule:
//!
//! - `required_*`: absent or `null` is a [`DecodeError::MissingField`].
//! - `*_or`: absent or `null` substitutes the given default.
//! - `optional_*`: absent or `null` is `None`.
//!
//! In every case a value of the wrong JSON type is a
//! [`DecodeError::InvalidValue`]; defaults never paper over bad data.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::DecodeError;

/// An untyped JSON object, as received from the API.
pub type Map = serde_json::Map<String, Value>;

/// Looks up `field`, treating an explicit `null` the same as absence.
fn present<'a>(map: &'a Map, field: &str) -> Option<&'a Value> {
    map.get(field).filter(|value| !value.is_null())
}

fn invalid(field: &str, value: &Value) -> DecodeError {
    DecodeError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Borrows `value` as an object, or fails naming `context`.
pub(crate) fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map, DecodeError> {
    value.as_object().ok_or_else(|| DecodeError::NotAnObject {
        context: context.to_string(),
    })
}

pub(crate) fn optional_str(map: &Map, field: &str) -> Result<Option<String>, DecodeError> {
    match present(map, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(field, other)),
    }
}

pub(crate) fn required_str(map: &Map, field: &str) -> Result<String, DecodeError> {
    optional_str(map, field)?.ok_or_else(|| DecodeError::MissingField {
        field: field.to_string(),
    })
}

pub(crate) fn str_or(map: &Map, field: &str, default: &str) -> Result<String, DecodeError> {
    Ok(optional_str(map, field)?.unwrap_or_else(|| default.to_string()))
}

/// Reads an integer that must fit in `T` (ports in `u16`, pids in `u32`...).
pub(crate) fn optional_int<T>(map: &Map, field: &str) -> Result<Option<T>, DecodeError>
where
    T: TryFrom<i64>,
{
    match present(map, field) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .and_then(|n| T::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
    }
}

pub(crate) fn int_or<T>(map: &Map, field: &str, default: T) -> Result<T, DecodeError>
where
    T: TryFrom<i64>,
{
    Ok(optional_int(map, field)?.unwrap_or(default))
}

pub(crate) fn bool_or(map: &Map, field: &str, default: bool) -> Result<bool, DecodeError> {
    match present(map, field) {
        None => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(field, other)),
    }
}

/// Parses an ISO-8601 / RFC 3339 timestamp and normalises it to UTC.
pub(crate) fn required_timestamp(map: &Map, field: &str) -> Result<DateTime<Utc>, DecodeError> {
    let raw = required_str(map, field)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| DecodeError::InvalidTimestamp {
            field: field.to_string(),
            value: raw,
            source,
        })
}

/// Parses a string-valued enum. Unknown spellings are invalid values.
pub(crate) fn required_enum<T: FromStr>(map: &Map, field: &str) -> Result<T, DecodeError> {
    let raw = required_str(map, field)?;
    raw.parse()
        .map_err(|_| invalid(field, &Value::String(raw.clone())))
}

pub(crate) fn enum_or<T: FromStr>(map: &Map, field: &str, default: T) -> Result<T, DecodeError> {
    if present(map, field).is_none() {
        return Ok(default);
    }
    required_enum(map, field)
}

pub(crate) fn object_or_empty(map: &Map, field: &str) -> Result<Map, DecodeError> {
    match present(map, field) {
        None => Ok(Map::new()),
        Some(Value::Object(inner)) => Ok(inner.clone()),
        Some(other) => Err(invalid(field, other)),
    }
}

// ── Collections ────────────────────────────────────────────────────────

/// One page of a list endpoint.
///
/// List responses wrap their records in a named array (`events`,
/// `devices`, `patterns`, `matches`) next to optional paging metadata:
///
/// ```json
/// { "events": [ ... ], "total_count": 1234, "has_more": true }
/// ```
///
/// A response without the array decodes as an empty page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    /// Records on this page, in server order.
    pub items: Vec<T>,
    /// Total number of matching records, when the server reports it.
    pub total_count: Option<u64>,
    /// Whether another page exists past this one.
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Decodes the array under `field`, running each element through
    /// `decode`. The first bad element fails the whole page.
    pub(crate) fn from_value<E>(
        value: &Value,
        field: &str,
        decode: impl Fn(&Map) -> Result<T, E>,
    ) -> Result<Self, E>
    where
        E: From<DecodeError>,
    {
        let map = as_object(value, "list response")?;
        let items = match present(map, field) {
            None => Vec::new(),
            Some(Value::Array(elements)) => elements
                .iter()
                .map(|element| decode(as_object(element, field)?))
                .collect::<Result<Vec<_>, E>>()?,
            Some(other) => return Err(invalid(field, other).into()),
        };
        Ok(Page {
            items,
            total_count: optional_int(map, "total_count")?,
            has_more: bool_or(map, "has_more", false)?,
        })
    }

    /// Number of records on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn null_counts_as_absent() {
        let m = map(json!({"id": null, "pid": null}));
        assert!(matches!(
            required_str(&m, "id"),
            Err(DecodeError::MissingField { field }) if field == "id"
        ));
        assert_eq!(int_or::<u32>(&m, "pid", 0).unwrap(), 0);
    }

    #[test]
    fn wrong_type_is_invalid_not_defaulted() {
        let m = map(json!({"pid": "1234", "enabled": "yes", "path": 7}));
        assert!(matches!(
            int_or::<u32>(&m, "pid", 0),
            Err(DecodeError::InvalidValue { .. })
        ));
        assert!(matches!(
            bool_or(&m, "enabled", true),
            Err(DecodeError::InvalidValue { .. })
        ));
        assert!(matches!(
            str_or(&m, "path", ""),
            Err(DecodeError::InvalidValue { .. })
        ));
    }

    #[test]
    fn integers_must_fit_target_width() {
        let m = map(json!({"port": 70000, "pid": -1}));
        assert!(optional_int::<u16>(&m, "port").is_err());
        assert!(optional_int::<u32>(&m, "pid").is_err());
        assert_eq!(optional_int::<i64>(&m, "pid").unwrap(), Some(-1));
    }

    #[test]
    fn timestamps_accept_offsets_and_normalise_to_utc() {
        let m = map(json!({"ts": "2025-01-01T10:00:00+10:00"}));
        let ts = required_timestamp(&m, "ts").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn timestamps_reject_non_iso_strings() {
        let m = map(json!({"ts": "01/02/2025"}));
        assert!(matches!(
            required_timestamp(&m, "ts"),
            Err(DecodeError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn page_without_array_is_empty() {
        let page: Page<String> =
            Page::from_value(&json!({}), "events", |m| required_str(m, "id")).unwrap();
        assert!(page.is_empty());
        assert_eq!(page.total_count, None);
        assert!(!page.has_more);
    }

    #[test]
    fn page_reads_metadata_and_items() {
        let body = json!({
            "devices": [{"id": "d1"}, {"id": "d2"}],
            "total_count": 42,
            "has_more": true
        });
        let page: Page<String> = Page::from_value(&body, "devices", |m| required_str(m, "id")).unwrap();
        assert_eq!(page.items, vec!["d1", "d2"]);
        assert_eq!(page.total_count, Some(42));
        assert!(page.has_more);
    }

    #[test]
    fn page_rejects_non_object_elements() {
        let body = json!({"devices": ["d1"]});
        let result: Result<Page<String>, DecodeError> =
            Page::from_value(&body, "devices", |m| required_str(m, "id"));
        assert!(matches!(result, Err(DecodeError::NotAnObject { .. })));
    }
}
