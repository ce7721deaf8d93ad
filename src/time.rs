//! Timestamp parsing shared by ingestion and filter normalization.
//!
//! Everything resolves to epoch milliseconds, the canonical unit stored in
//! the `time` column.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Parses a calendar date/time string to epoch milliseconds (UTC when no
/// offset is given).
pub fn parse_datetime_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Reads a value already expressed in epoch milliseconds: integers, floats,
/// decimal strings, date strings, and MongoDB extended-JSON wrappers such as
/// `{"$date": {"$numberLong": "1609459200000"}}`.
pub fn epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
                .map(|f| f.round() as i64)
        }),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| parse_datetime_millis(trimmed))
        }
        Value::Object(obj) => extended_json_millis(obj),
        _ => None,
    }
}

/// True for `{"$date": …}` and `{"$numberLong": …}` wrappers.
pub fn is_extended_json_time(obj: &Map<String, Value>) -> bool {
    obj.len() == 1 && (obj.contains_key("$date") || obj.contains_key("$numberLong"))
}

fn extended_json_millis(obj: &Map<String, Value>) -> Option<i64> {
    if !is_extended_json_time(obj) {
        return None;
    }
    if let Some(inner) = obj.get("$date") {
        return epoch_millis(inner);
    }
    match obj.get("$numberLong")? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
