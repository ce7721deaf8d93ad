//! ARGO profile records
//!
//! A profile is one water-column measurement at a location and time, with
//! parallel depth-indexed series. `NewProfile` is the schema-checked shape a
//! document must have before it can be stored; `ProfileRecord` is what the
//! store hands back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys assigned by the store; ignored when present in ingested documents.
pub const RESERVED_KEYS: [&str; 3] = ["_id", "createdAt", "updatedAt"];

/// Fields with a dedicated column in the profile table.
pub const KNOWN_FIELDS: [&str; 7] = [
    "lat",
    "lon",
    "time",
    "temperature",
    "pressure",
    "salinity",
    "metadata",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    /// Epoch milliseconds
    pub time: i64,
    pub temperature: Vec<f64>,
    pub pressure: Vec<f64>,
    #[serde(default)]
    pub salinity: Vec<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Unknown top-level fields carried over from ingestion
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProfile {
    pub lat: f64,
    pub lon: f64,
    pub time: i64,
    pub temperature: Vec<f64>,
    pub pressure: Vec<f64>,
    pub salinity: Vec<f64>,
    pub metadata: Map<String, Value>,
    pub extra: Map<String, Value>,
}

impl NewProfile {
    /// Validate a normalized ingestion document against the profile schema.
    ///
    /// Returns a human-readable reason on failure; callers report it per item.
    pub fn from_document(doc: &Value) -> std::result::Result<Self, String> {
        let obj = doc
            .as_object()
            .ok_or_else(|| format!("expected an object, got {}", json_kind(doc)))?;

        let lat = required_number(obj, "lat")?;
        let lon = required_number(obj, "lon")?;
        let time = match obj.get("time") {
            Some(v) => v
                .as_i64()
                .ok_or_else(|| format!("field 'time' must be an integer epoch, got {}", v))?,
            None => return Err("missing required field 'time'".to_string()),
        };
        let temperature = optional_series(obj, "temperature")?;
        let pressure = optional_series(obj, "pressure")?;
        let salinity = optional_series(obj, "salinity")?;
        let metadata = match obj.get("metadata") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(m)) => m.clone(),
            Some(other) => {
                return Err(format!(
                    "field 'metadata' must be an object, got {}",
                    json_kind(other)
                ))
            }
        };

        let extra = obj
            .iter()
            .filter(|(k, _)| {
                !KNOWN_FIELDS.contains(&k.as_str()) && !RESERVED_KEYS.contains(&k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            lat,
            lon,
            time,
            temperature,
            pressure,
            salinity,
            metadata,
            extra,
        })
    }

    pub fn has_parallel_series(&self) -> bool {
        self.temperature.len() == self.pressure.len()
    }
}

/// Reads a number, accepting numeric strings the way a lenient schema caster would.
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn required_number(obj: &Map<String, Value>, key: &str) -> std::result::Result<f64, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(format!("missing required field '{}'", key)),
        Some(v) => coerce_f64(v).ok_or_else(|| format!("field '{}' must be a number, got {}", key, v)),
    }
}

/// Absent series are stored empty.
fn optional_series(obj: &Map<String, Value>, key: &str) -> std::result::Result<Vec<f64>, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => series(v, key),
    }
}

fn series(value: &Value, key: &str) -> std::result::Result<Vec<f64>, String> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                coerce_f64(item)
                    .ok_or_else(|| format!("field '{}[{}]' must be a number, got {}", key, i, item))
            })
            .collect(),
        // A bare reading is a single-level profile
        other => coerce_f64(other)
            .map(|f| vec![f])
            .ok_or_else(|| format!("field '{}' must be an array of numbers, got {}", key, json_kind(other))),
    }
}
