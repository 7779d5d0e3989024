//! Batch item validation.
//!
//! Turns one raw JSON element of an incoming batch into a [`BatchItem`].
//! Checks run in a fixed order, and the first failing check decides the
//! error:
//!
//! 1. `package_url`, `key` and `operation` must all be present
//!    (item-local: `Missing required field`).
//! 2. `package_url` must parse as a package URL (batch-fatal).
//! 3. `operation` must be `insert` or `replace`
//!    (item-local: `Invalid operation specified`).
//! 4. `values` must be present (item-local: `No values specified`).
//!
//! Structural problems (an element that is not an object, a non-string
//! `package_url` or `key`, a non-array `values`, a value entry that is not an
//! object) are batch-fatal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::StepError;
use crate::models::{BatchItem, Operation, ValueEntry};
use crate::purl::PackageUrl;

/// Validate the batch element at `index`.
pub fn validate_item(index: usize, raw: &Value) -> Result<BatchItem, StepError> {
    let fields = raw
        .as_object()
        .ok_or_else(|| StepError::fatal(Some(index), "batch item must be a JSON object"))?;

    let (Some(package_url), Some(key), Some(operation)) = (
        fields.get("package_url"),
        fields.get("key"),
        fields.get("operation"),
    ) else {
        return Err(StepError::item(index, "Missing required field"));
    };

    let package_url = package_url
        .as_str()
        .ok_or_else(|| StepError::fatal(Some(index), "package_url must be a string"))?;
    let package_url =
        PackageUrl::parse(package_url).map_err(|e| StepError::fatal(Some(index), e))?;

    let key = key
        .as_str()
        .ok_or_else(|| StepError::fatal(Some(index), "key must be a string"))?;

    let operation = operation
        .as_str()
        .and_then(Operation::parse)
        .ok_or_else(|| StepError::item(index, "Invalid operation specified"))?;

    let values = fields
        .get("values")
        .ok_or_else(|| StepError::item(index, "No values specified"))?
        .as_array()
        .ok_or_else(|| StepError::fatal(Some(index), "values must be an array"))?;

    let mut entries = Vec::with_capacity(values.len());
    for (position, entry) in values.iter().enumerate() {
        if let Some(entry) = parse_value_entry(index, entry)? {
            entries.push(entry);
        } else {
            tracing::warn!(index, position, key, "skipping value entry without a value");
        }
    }

    Ok(BatchItem {
        package_url,
        key: key.to_string(),
        operation,
        values: entries,
    })
}

/// Parse one element of `values`. Returns `Ok(None)` for entries that carry
/// no `value` (or a `null` one); those are skipped.
fn parse_value_entry(index: usize, raw: &Value) -> Result<Option<ValueEntry>, StepError> {
    let fields = raw
        .as_object()
        .ok_or_else(|| StepError::fatal(Some(index), "value entry must be a JSON object"))?;

    let value = match fields.get("value") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => s.clone(),
        // Numbers keep their source text.
        Some(other) => other.to_string(),
    };

    let timestamp = fields
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    let properties = match fields.get("properties") {
        None | Some(Value::Null) => None,
        Some(props) => Some(props.clone()),
    };

    Ok(Some(ValueEntry {
        timestamp,
        value,
        properties,
    }))
}

/// Parse an RFC 3339 timestamp. Offset-less date-times and bare dates are
/// accepted and read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_valid_insert_item() {
        let raw = json!({
            "package_url": "pkg:npm/foo@1.0.0",
            "key": "downloads",
            "operation": "insert",
            "values": [
                { "value": 5 },
                { "value": "many", "timestamp": "2021-04-01T12:00:00Z", "properties": { "source": "npm" } }
            ]
        });
        let item = validate_item(0, &raw).unwrap();
        assert_eq!(item.package_url.to_string(), "pkg:npm/foo@1.0.0");
        assert_eq!(item.key, "downloads");
        assert_eq!(item.operation, Operation::Insert);
        assert_eq!(item.values.len(), 2);
        assert_eq!(item.values[0].value, "5");
        assert_eq!(item.values[0].timestamp, None);
        assert_eq!(item.values[1].value, "many");
        assert_eq!(
            item.values[1].timestamp,
            Some(Utc.with_ymd_and_hms(2021, 4, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(item.values[1].properties, Some(json!({ "source": "npm" })));
    }

    #[test]
    fn test_missing_required_field() {
        for missing in ["package_url", "key", "operation"] {
            let mut raw = json!({
                "package_url": "pkg:npm/foo@1.0.0",
                "key": "downloads",
                "operation": "insert",
                "values": [{ "value": 1 }]
            });
            raw.as_object_mut().unwrap().remove(missing);
            let err = validate_item(2, &raw).unwrap_err();
            assert_eq!(err.kind, ErrorKind::ItemLocal, "missing {}", missing);
            assert_eq!(err.message(), "Missing required field (index #2)");
        }
    }

    #[test]
    fn test_invalid_operation() {
        let raw = json!({
            "package_url": "pkg:npm/foo@1.0.0",
            "key": "downloads",
            "operation": "upsert",
            "values": []
        });
        let err = validate_item(1, &raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ItemLocal);
        assert_eq!(err.message(), "Invalid operation specified (index #1)");
    }

    #[test]
    fn test_operation_is_case_sensitive() {
        let raw = json!({
            "package_url": "pkg:npm/foo@1.0.0",
            "key": "downloads",
            "operation": "Insert",
            "values": []
        });
        assert_eq!(validate_item(0, &raw).unwrap_err().kind, ErrorKind::ItemLocal);
    }

    #[test]
    fn test_no_values() {
        let raw = json!({
            "package_url": "pkg:npm/foo@1.0.0",
            "key": "downloads",
            "operation": "replace"
        });
        let err = validate_item(4, &raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ItemLocal);
        assert_eq!(err.message(), "No values specified (index #4)");
    }

    #[test]
    fn test_malformed_identifier_is_fatal() {
        let raw = json!({
            "package_url": "bad::not-a-purl",
            "key": "downloads",
            "operation": "insert",
            "values": [{ "value": 1 }]
        });
        let err = validate_item(0, &raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BatchFatal);
        assert!(err.message().contains("bad::not-a-purl"));
    }

    #[test]
    fn test_malformed_identifier_checked_before_operation() {
        let raw = json!({
            "package_url": "bad::not-a-purl",
            "key": "downloads",
            "operation": "bogus",
            "values": []
        });
        assert!(validate_item(0, &raw).unwrap_err().is_fatal());
    }

    #[test]
    fn test_structural_errors_are_fatal() {
        let cases = [
            json!(42),
            json!({ "package_url": 7, "key": "k", "operation": "insert", "values": [] }),
            json!({ "package_url": "pkg:npm/foo", "key": null, "operation": "insert", "values": [] }),
            json!({ "package_url": "pkg:npm/foo", "key": "k", "operation": "insert", "values": {} }),
            json!({ "package_url": "pkg:npm/foo", "key": "k", "operation": "insert", "values": [3] }),
        ];
        for raw in cases {
            let err = validate_item(0, &raw).unwrap_err();
            assert!(err.is_fatal(), "expected fatal for {}", raw);
        }
    }

    #[test]
    fn test_entries_without_value_are_skipped() {
        let raw = json!({
            "package_url": "pkg:npm/foo",
            "key": "k",
            "operation": "insert",
            "values": [{ "timestamp": "2021-01-01T00:00:00Z" }, { "value": null }, { "value": true }]
        });
        let item = validate_item(0, &raw).unwrap();
        assert_eq!(item.values.len(), 1);
        assert_eq!(item.values[0].value, "true");
    }

    #[test]
    fn test_value_text_forms() {
        let raw = json!({
            "package_url": "pkg:npm/foo",
            "key": "k",
            "operation": "insert",
            "values": [{ "value": 1.5 }, { "value": "text" }, { "value": [1, 2] }]
        });
        let item = validate_item(0, &raw).unwrap();
        let texts: Vec<&str> = item.values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(texts, vec!["1.5", "text", "[1,2]"]);
    }

    #[test]
    fn test_numbers_keep_their_source_text() {
        let raw: Value = serde_json::from_str(
            r#"{
                "package_url": "pkg:npm/foo",
                "key": "k",
                "operation": "insert",
                "values": [
                    { "value": 1.50 },
                    { "value": 1e3 },
                    { "value": 123456789012345678901234 }
                ]
            }"#,
        )
        .unwrap();
        let item = validate_item(0, &raw).unwrap();
        let texts: Vec<&str> = item.values.iter().map(|v| v.value.as_str()).collect();
        assert_eq!(texts, vec!["1.50", "1e3", "123456789012345678901234"]);
    }

    #[test]
    fn test_unparsable_timestamp_treated_as_absent() {
        let raw = json!({
            "package_url": "pkg:npm/foo",
            "key": "k",
            "operation": "insert",
            "values": [{ "value": 1, "timestamp": "yesterday" }, { "value": 2, "timestamp": 1617278400 }]
        });
        let item = validate_item(0, &raw).unwrap();
        assert!(item.values.iter().all(|v| v.timestamp.is_none()));
    }

    #[test]
    fn test_null_properties_treated_as_absent() {
        let raw = json!({
            "package_url": "pkg:npm/foo",
            "key": "k",
            "operation": "insert",
            "values": [{ "value": 1, "properties": null }]
        });
        let item = validate_item(0, &raw).unwrap();
        assert_eq!(item.values[0].properties, None);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2021, 3, 30, 18, 23, 0).unwrap();
        assert_eq!(parse_timestamp("2021-03-30T18:23:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-30T20:23:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2021-03-30T18:23:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2021-03-30"),
            Some(Utc.with_ymd_and_hms(2021, 3, 30, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("not a date"), None);
    }
}
