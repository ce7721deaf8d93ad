//! Ingestion Normalizer
//!
//! Raw profile batches arrive from the NetCDF upload service or directly from
//! clients. Each item gets a canonical millisecond `time` (converted from the
//! configured raw unit, or defaulted to "now"); every other field passes
//! through. The batch then goes to the store as one unordered insert.

use crate::clock::Clock;
use crate::config::TimeUnit;
use crate::db::{InsertFailure, ProfileStore};
use crate::error::{ArgoError, Result};
use crate::profile::{json_kind, ProfileRecord};
use crate::time::{epoch_millis, is_extended_json_time, parse_datetime_millis};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct IngestionNormalizer {
    time_unit: TimeUnit,
    clock: Arc<dyn Clock>,
}

impl IngestionNormalizer {
    pub fn new(time_unit: TimeUnit, clock: Arc<dyn Clock>) -> Self {
        Self { time_unit, clock }
    }

    /// Normalize a batch. Fails only when the batch itself is not an array.
    pub fn normalize(&self, body: &Value) -> Result<Vec<Value>> {
        let items = body.as_array().ok_or_else(|| {
            ArgoError::Validation(format!("Expected an array of profiles, got {}", json_kind(body)))
        })?;
        let now = self.clock.now_millis();
        Ok(items.iter().map(|item| self.normalize_item(item, now)).collect())
    }

    /// Non-object items are returned untouched for the store to reject.
    fn normalize_item(&self, item: &Value, now: i64) -> Value {
        let Value::Object(obj) = item else {
            return item.clone();
        };
        let mut doc = obj.clone();
        let time = match obj.get("time") {
            None | Some(Value::Null) => Some(now),
            Some(Value::String(s)) if s.trim().is_empty() => Some(now),
            Some(raw) => self.to_millis(raw),
        };
        if let Some(millis) = time {
            doc.insert("time".to_string(), Value::from(millis));
        }
        Value::Object(doc)
    }

    /// Raw counts are read in the configured unit; calendar strings and
    /// `$date` wrappers are absolute already.
    fn to_millis(&self, raw: &Value) -> Option<i64> {
        match raw {
            Value::Number(n) => match n.as_i64() {
                Some(i) => self.time_unit.to_millis(i128::from(i)),
                None => match n.as_u64() {
                    Some(u) => self.time_unit.to_millis(i128::from(u)),
                    None => n.as_f64().and_then(|f| self.time_unit.float_to_millis(f)),
                },
            },
            Value::String(s) => {
                let s = s.trim();
                if let Ok(count) = s.parse::<i128>() {
                    self.time_unit.to_millis(count)
                } else if let Ok(f) = s.parse::<f64>() {
                    self.time_unit.float_to_millis(f)
                } else {
                    parse_datetime_millis(s)
                }
            }
            Value::Object(obj) if is_extended_json_time(obj) => epoch_millis(raw),
            _ => None,
        }
    }
}

/// Response body of a bulk ingest
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    #[serde(rename = "insertedCount")]
    pub inserted_count: usize,
    pub inserted: Vec<ProfileRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<InsertFailure>,
}

pub struct Ingestor {
    normalizer: IngestionNormalizer,
    store: Arc<dyn ProfileStore>,
    timeout: Duration,
}

impl Ingestor {
    pub fn new(normalizer: IngestionNormalizer, store: Arc<dyn ProfileStore>, timeout: Duration) -> Self {
        Self {
            normalizer,
            store,
            timeout,
        }
    }

    pub async fn ingest(&self, body: &Value) -> Result<IngestReport> {
        let docs = self.normalizer.normalize(body)?;
        let submitted = docs.len();

        let outcome = tokio::time::timeout(self.timeout, self.store.insert_many_unordered(docs))
            .await
            .map_err(|_| ArgoError::Store(format!("ingest timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| {
                error!("Ingest error: {}", e);
                e
            })?;

        info!(
            "Inserted {} of {} profiles ({} rejected)",
            outcome.inserted.len(),
            submitted,
            outcome.failures.len()
        );
        Ok(IngestReport {
            inserted_count: outcome.inserted.len(),
            inserted: outcome.inserted,
            failures: outcome.failures,
        })
    }
}
