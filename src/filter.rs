//! Filter Normalizer
//!
//! The translator hands us an untrusted JSON object shaped like a MongoDB
//! filter. `FilterNormalizer::normalize` turns it into a typed [`Filter`]:
//!
//! 1. Field aliases (`latitude`, `longitude`, NetCDF names) become the stored
//!    field names, with numeric coercion for coordinates.
//! 2. `$near` on `lat`/`lon` becomes an inclusive range of ± tolerance.
//! 3. `timeRange: [start, end]` becomes a `time` range.
//! 4. Extended-JSON date wrappers on `time` unwrap to epoch milliseconds.
//!
//! Shapes outside the supported subset are rejected rather than passed to the
//! store. Rendering a `Filter` back to JSON and normalizing again yields the
//! same filter.

use crate::error::{ArgoError, Result};
use crate::profile::{coerce_f64, json_kind};
use crate::time::{epoch_millis, is_extended_json_time};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A literal filter operand
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Scalar {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(Scalar::Int)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Object(obj) if is_extended_json_time(obj) => epoch_millis(value).map(Scalar::Int),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Int(i) => json!(i),
            Scalar::Float(f) => json!(f),
            Scalar::Text(s) => json!(s),
            Scalar::Bool(b) => json!(b),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{:?}", s),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Scalar,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: Scalar) -> Self {
        Self { value, inclusive: true }
    }

    pub fn exclusive(value: Scalar) -> Self {
        Self { value, inclusive: false }
    }
}

/// What a single field must satisfy
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equals(Scalar),
    /// `$in`
    OneOf(Vec<Scalar>),
    Range {
        lower: Option<Bound>,
        upper: Option<Bound>,
    },
    /// A "near this point" constraint already widened to `center ± tolerance`
    ProximityExpanded { center: f64, tolerance: f64 },
}

impl Constraint {
    /// Lower and upper bounds for the range-like variants.
    pub fn bounds(&self) -> Option<(Option<Bound>, Option<Bound>)> {
        match self {
            Constraint::Range { lower, upper } => Some((lower.clone(), upper.clone())),
            Constraint::ProximityExpanded { center, tolerance } => Some((
                Some(Bound::inclusive(Scalar::Float(center - tolerance))),
                Some(Bound::inclusive(Scalar::Float(center + tolerance))),
            )),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Constraint::Equals(s) => s.to_json(),
            Constraint::OneOf(values) => {
                json!({ "$in": values.iter().map(Scalar::to_json).collect::<Vec<_>>() })
            }
            Constraint::Range { .. } | Constraint::ProximityExpanded { .. } => {
                let mut ops = Map::new();
                if let Some((lower, upper)) = self.bounds() {
                    if let Some(b) = lower {
                        let op = if b.inclusive { "$gte" } else { "$gt" };
                        ops.insert(op.to_string(), b.value.to_json());
                    }
                    if let Some(b) = upper {
                        let op = if b.inclusive { "$lte" } else { "$lt" };
                        ops.insert(op.to_string(), b.value.to_json());
                    }
                }
                Value::Object(ops)
            }
        }
    }
}

/// A normalized filter: field name → constraint, all ANDed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    fields: BTreeMap<String, Constraint>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, constraint: Constraint) -> Self {
        self.fields.insert(field.into(), constraint);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Constraint> {
        self.fields.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Constraint)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The MongoDB-style JSON form reported back as `appliedFilter`.
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|(k, c)| (k.clone(), c.to_json()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// `lat`/`lon`: numeric degrees, proximity allowed
    Coordinate,
    /// `time`: epoch milliseconds
    Time,
    /// `temperature`/`pressure`/`salinity`: numeric per-level readings
    Series,
    Other,
}

fn field_kind(field: &str) -> FieldKind {
    match field {
        "lat" | "lon" => FieldKind::Coordinate,
        "time" => FieldKind::Time,
        "temperature" | "pressure" | "salinity" => FieldKind::Series,
        _ => FieldKind::Other,
    }
}

/// Lower-cased alias → stored field name
const FIELD_ALIASES: [(&str, &str); 12] = [
    ("lat", "lat"),
    ("latitude", "lat"),
    ("lon", "lon"),
    ("longitude", "lon"),
    ("time", "time"),
    ("juld", "time"),
    ("temperature", "temperature"),
    ("temp", "temperature"),
    ("pressure", "pressure"),
    ("pres", "pressure"),
    ("salinity", "salinity"),
    ("psal", "salinity"),
];

const TIME_RANGE_KEYS: [&str; 2] = ["timeRange", "time_range"];

fn canonical_field(key: &str) -> Option<&'static str> {
    let lower = key.to_lowercase();
    FIELD_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| *canonical)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Near,
}

fn operator(key: &str) -> Option<Operator> {
    match key.strip_prefix('$').unwrap_or(key) {
        "eq" => Some(Operator::Eq),
        "gt" => Some(Operator::Gt),
        "gte" => Some(Operator::Gte),
        "lt" => Some(Operator::Lt),
        "lte" => Some(Operator::Lte),
        "in" => Some(Operator::In),
        "near" => Some(Operator::Near),
        _ => None,
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().all(|k| k.starts_with('$') || operator(k).is_some())
}

#[derive(Debug, Clone)]
pub struct FilterNormalizer {
    tolerance: f64,
}

impl Default for FilterNormalizer {
    fn default() -> Self {
        Self::new(crate::config::AppConfig::DEFAULT_PROXIMITY_TOLERANCE)
    }
}

impl FilterNormalizer {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Normalize any JSON value; only objects are filters.
    pub fn normalize_value(&self, raw: &Value) -> Result<Filter> {
        match raw {
            Value::Object(obj) => self.normalize(obj),
            other => Err(ArgoError::filter_parse(
                format!("filter must be a JSON object, got {}", json_kind(other)),
                other.to_string(),
            )),
        }
    }

    pub fn normalize(&self, raw: &Map<String, Value>) -> Result<Filter> {
        self.normalize_inner(raw)
            .map_err(|message| ArgoError::filter_parse(message, Value::Object(raw.clone()).to_string()))
    }

    fn normalize_inner(&self, raw: &Map<String, Value>) -> std::result::Result<Filter, String> {
        // Canonical spellings first so that an alias overwrites them
        let mut staged: BTreeMap<String, Value> = BTreeMap::new();
        let mut aliased: Vec<(&'static str, &Value)> = Vec::new();
        let mut time_range: Option<&Value> = None;

        for (key, value) in raw {
            if TIME_RANGE_KEYS.contains(&key.as_str()) {
                time_range = Some(value);
                continue;
            }
            if key.starts_with('$') {
                return Err(format!("top-level operator '{}' is not supported", key));
            }
            match canonical_field(key) {
                Some(canonical) if canonical == key.as_str() => {
                    staged.insert(key.clone(), value.clone());
                }
                Some(canonical) => aliased.push((canonical, value)),
                None => {
                    staged.insert(key.clone(), value.clone());
                }
            }
        }
        for (canonical, value) in aliased {
            staged.insert(canonical.to_string(), value.clone());
        }

        let mut filter = Filter::new();
        for (field, value) in staged {
            if field == "metadata" {
                self.flatten_metadata("metadata", &value, &mut filter)?;
                continue;
            }
            validate_field_name(&field)?;
            let constraint = self.parse_constraint(&field, &value)?;
            filter.fields.insert(field, constraint);
        }

        if let Some(range) = time_range {
            filter.fields.insert("time".to_string(), parse_time_range(range)?);
        }

        Ok(filter)
    }

    fn flatten_metadata(
        &self,
        prefix: &str,
        value: &Value,
        filter: &mut Filter,
    ) -> std::result::Result<(), String> {
        match value {
            Value::Object(obj) if !is_operator_object(obj) && !is_extended_json_time(obj) => {
                if obj.is_empty() {
                    return Err(format!("field '{}' has an empty object", prefix));
                }
                for (key, inner) in obj {
                    validate_path_segment(prefix, key)?;
                    self.flatten_metadata(&format!("{}.{}", prefix, key), inner, filter)?;
                }
                Ok(())
            }
            _ if prefix == "metadata" => {
                Err("field 'metadata' can only be matched through its keys".to_string())
            }
            _ => {
                let constraint = self.parse_constraint(prefix, value)?;
                filter.fields.insert(prefix.to_string(), constraint);
                Ok(())
            }
        }
    }

    fn parse_constraint(&self, field: &str, value: &Value) -> std::result::Result<Constraint, String> {
        let kind = field_kind(field);
        match value {
            Value::Object(obj) if is_extended_json_time(obj) => {
                Ok(Constraint::Equals(coerce(field, kind, value)?))
            }
            Value::Object(obj) => self.parse_operators(field, kind, obj),
            Value::Null => Err(format!("field '{}' cannot be matched against null", field)),
            Value::Array(_) => Err(format!(
                "field '{}' has an array literal; use $in to match any of several values",
                field
            )),
            scalar => Ok(Constraint::Equals(coerce(field, kind, scalar)?)),
        }
    }

    fn parse_operators(
        &self,
        field: &str,
        kind: FieldKind,
        obj: &Map<String, Value>,
    ) -> std::result::Result<Constraint, String> {
        if obj.is_empty() {
            return Err(format!("field '{}' has an empty operator object", field));
        }

        let mut ops: Vec<(Operator, &Value)> = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            let op = operator(key)
                .ok_or_else(|| format!("operator '{}' on field '{}' is not supported", key, field))?;
            ops.push((op, value));
        }

        if let Some(&(op, value)) = ops
            .iter()
            .find(|(op, _)| matches!(op, Operator::Near | Operator::Eq | Operator::In))
        {
            if ops.len() != 1 {
                return Err(format!(
                    "operator {:?} on field '{}' cannot be combined with other operators",
                    op, field
                ));
            }
            return match op {
                Operator::Near => {
                    if kind != FieldKind::Coordinate {
                        return Err(format!("proximity is only supported on lat/lon, not '{}'", field));
                    }
                    let center = coerce_f64(value)
                        .ok_or_else(|| format!("proximity center for '{}' must be a number, got {}", field, value))?;
                    Ok(Constraint::ProximityExpanded {
                        center,
                        tolerance: self.tolerance,
                    })
                }
                Operator::Eq => Ok(Constraint::Equals(coerce(field, kind, value)?)),
                _ => {
                    let items = value
                        .as_array()
                        .ok_or_else(|| format!("$in on field '{}' expects an array", field))?;
                    let values = items
                        .iter()
                        .map(|item| coerce(field, kind, item))
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    Ok(Constraint::OneOf(values))
                }
            };
        }

        let mut lower: Option<Bound> = None;
        let mut upper: Option<Bound> = None;
        for (op, value) in ops {
            let scalar = coerce(field, kind, value)?;
            let (slot, bound) = match op {
                Operator::Gt => (&mut lower, Bound::exclusive(scalar)),
                Operator::Gte => (&mut lower, Bound::inclusive(scalar)),
                Operator::Lt => (&mut upper, Bound::exclusive(scalar)),
                _ => (&mut upper, Bound::inclusive(scalar)),
            };
            if slot.is_some() {
                return Err(format!("field '{}' has conflicting bounds", field));
            }
            *slot = Some(bound);
        }
        Ok(Constraint::Range { lower, upper })
    }
}

fn parse_time_range(value: &Value) -> std::result::Result<Constraint, String> {
    let pair = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| format!("timeRange must be a [start, end] pair, got {}", value))?;
    let start = coerce("time", FieldKind::Time, &pair[0])?;
    let end = coerce("time", FieldKind::Time, &pair[1])?;
    Ok(Constraint::Range {
        lower: Some(Bound::inclusive(start)),
        upper: Some(Bound::inclusive(end)),
    })
}

fn coerce(field: &str, kind: FieldKind, value: &Value) -> std::result::Result<Scalar, String> {
    match kind {
        FieldKind::Coordinate | FieldKind::Series => coerce_f64(value)
            .map(Scalar::Float)
            .ok_or_else(|| format!("field '{}' expects a number, got {}", field, value)),
        FieldKind::Time => epoch_millis(value)
            .map(Scalar::Int)
            .ok_or_else(|| format!("field '{}' expects an epoch-millisecond time, got {}", field, value)),
        FieldKind::Other => Scalar::from_json(value)
            .ok_or_else(|| format!("field '{}' has an unsupported value {}", field, value)),
    }
}

fn validate_field_name(field: &str) -> std::result::Result<(), String> {
    if field.trim().is_empty() {
        return Err("empty field name".to_string());
    }
    if field.contains('"') {
        return Err(format!("field name {:?} contains a quote", field));
    }
    Ok(())
}

fn validate_path_segment(prefix: &str, key: &str) -> std::result::Result<(), String> {
    if key.is_empty() || key.starts_with('$') || key.contains('.') || key.contains('"') {
        return Err(format!("invalid key {:?} under '{}'", key, prefix));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(raw: Value) -> Result<Filter> {
        FilterNormalizer::new(0.4).normalize_value(&raw)
    }

    fn assert_close(value: &Value, expected: f64) {
        let actual = value.as_f64().expect("numeric");
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_renames_coordinates() {
        let filter = normalize(json!({"latitude": 10, "longitude": "20"})).unwrap();
        assert_eq!(filter.to_json(), json!({"lat": 10.0, "lon": 20.0}));
    }

    #[test]
    fn test_alias_overwrites_canonical() {
        let filter = normalize(json!({"lat": 1, "Latitude": 2})).unwrap();
        assert_eq!(filter.get("lat"), Some(&Constraint::Equals(Scalar::Float(2.0))));
    }

    #[test]
    fn test_netcdf_aliases() {
        let filter = normalize(json!({"TEMP": {"$gt": 20}, "PSAL": {"$lte": 35}})).unwrap();
        assert!(filter.get("temperature").is_some());
        assert!(filter.get("salinity").is_some());
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_series_values_are_numeric() {
        let filter = normalize(json!({"temperature": {"$gt": "20"}, "PRES": {"$lte": 500}})).unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"temperature": {"$gt": 20.0}, "pressure": {"$lte": 500.0}})
        );

        let filter = normalize(json!({"salinity": {"$in": ["35", 35.5]}})).unwrap();
        assert_eq!(
            filter.get("salinity"),
            Some(&Constraint::OneOf(vec![Scalar::Float(35.0), Scalar::Float(35.5)]))
        );
    }

    #[test]
    fn test_proximity_expands_to_range() {
        let filter = normalize(json!({"lat": {"near": 5}, "lon": {"$near": "-40"}})).unwrap();
        assert_eq!(
            filter.get("lat"),
            Some(&Constraint::ProximityExpanded { center: 5.0, tolerance: 0.4 })
        );
        let rendered = filter.to_json();
        assert_close(&rendered["lat"]["$gte"], 4.6);
        assert_close(&rendered["lat"]["$lte"], 5.4);
        assert_close(&rendered["lon"]["$gte"], -40.4);
        assert_close(&rendered["lon"]["$lte"], -39.6);
    }

    #[test]
    fn test_tolerance_is_configurable() {
        let filter = FilterNormalizer::new(0.01)
            .normalize_value(&json!({"latitude": {"$near": 12}}))
            .unwrap();
        let rendered = filter.to_json();
        assert_close(&rendered["lat"]["$gte"], 11.99);
        assert_close(&rendered["lat"]["$lte"], 12.01);
    }

    #[test]
    fn test_time_range_rewritten() {
        let filter = normalize(json!({"timeRange": [100, "200"]})).unwrap();
        assert_eq!(filter.to_json(), json!({"time": {"$gte": 100, "$lte": 200}}));
    }

    #[test]
    fn test_time_range_overrides_time() {
        let filter = normalize(json!({"time": 5, "timeRange": ["2021-01-01", "2021-01-02"]})).unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"time": {"$gte": 1_609_459_200_000i64, "$lte": 1_609_545_600_000i64}})
        );
    }

    #[test]
    fn test_date_wrappers_unwrap() {
        let filter = normalize(json!({
            "time": {
                "$gte": {"$date": {"$numberLong": "1609459200000"}},
                "$lt": {"$date": "2021-02-01T00:00:00Z"}
            }
        }))
        .unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"time": {"$gte": 1_609_459_200_000i64, "$lt": 1_612_137_600_000i64}})
        );
    }

    #[test]
    fn test_metadata_flattens() {
        let filter = normalize(json!({"metadata": {"platform": "2902746", "qc": {"flag": {"$in": [1, 2]}}}})).unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"metadata.platform": "2902746", "metadata.qc.flag": {"$in": [1, 2]}})
        );
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let filter = normalize(json!({"cycle_number": {"gte": 3}, "project": "ARGO"})).unwrap();
        assert_eq!(
            filter.to_json(),
            json!({"cycle_number": {"$gte": 3}, "project": "ARGO"})
        );
    }

    #[test]
    fn test_rejects_unsupported_shapes() {
        let cases = [
            json!({"$or": [{"lat": 1}, {"lat": 2}]}),
            json!({"temperature": {"$near": 5}}),
            json!({"lat": {"$near": 5, "$maxDistance": 10}}),
            json!({"lat": {"$gt": 1, "$gte": 2}}),
            json!({"lat": "north"}),
            json!({"salinity": null}),
            json!({"pressure": [1, 2]}),
            json!({"pressure": "hot"}),
            json!({"temperature": {"$gt": "warm"}}),
            json!({"timeRange": [1]}),
            json!({"time": {"$regex": "2021"}}),
            json!({"metadata": "x"}),
            json!([1, 2]),
        ];
        for case in cases {
            let err = normalize(case.clone()).unwrap_err();
            match err {
                ArgoError::FilterParse { raw, .. } => assert_eq!(raw, case.to_string()),
                other => panic!("unexpected error for {}: {}", case, other),
            }
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let normalizer = FilterNormalizer::new(0.4);
        let cases = [
            json!({}),
            json!({"latitude": 10, "longitude": 20}),
            json!({"lat": {"near": 5}, "lon": {"$near": 7.25}}),
            json!({"timeRange": [100, 200], "temperature": {"$gt": 20}}),
            json!({"time": {"$gte": {"$date": {"$numberLong": "5"}}}}),
            json!({"metadata": {"platform": "X1"}, "salinity": {"$in": [35, 35.5]}}),
            json!({"TEMP": {"lt": 4}, "JULD": "2021-06-01"}),
        ];
        for case in cases {
            let once = normalizer.normalize_value(&case).unwrap();
            let twice = normalizer.normalize_value(&once.to_json()).unwrap();
            assert_eq!(once.to_json(), twice.to_json(), "not idempotent for {}", case);
        }
    }
}
