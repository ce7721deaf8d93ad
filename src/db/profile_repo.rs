//! SQLite-backed profile repository
//!
//! rusqlite is synchronous, so every call runs on the blocking pool with the
//! connection behind a mutex.

use super::sql_filter::compile_find;
use super::{InsertFailure, InsertOutcome, ProfileStore};
use crate::clock::Clock;
use crate::error::{ArgoError, Result};
use crate::filter::Filter;
use crate::profile::{NewProfile, ProfileRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct SqliteProfileRepository {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl SqliteProfileRepository {
    pub fn open(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::from_connection(super::open_connection(path)?, clock))
    }

    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self::from_connection(super::open_in_memory()?, clock))
    }

    pub fn from_connection(conn: Connection, clock: Arc<dyn Clock>) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| ArgoError::Store("profile database lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| ArgoError::Store(format!("database task failed: {}", e)))?
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ProfileRecord> {
    Ok(ProfileRecord {
        id: row.get(0)?,
        lat: row.get(1)?,
        lon: row.get(2)?,
        time: row.get(3)?,
        temperature: json_column(row, 4)?,
        pressure: json_column(row, 5)?,
        salinity: json_column(row, 6)?,
        metadata: json_column(row, 7)?,
        extra: json_column(row, 8)?,
        created_at: millis_to_datetime(row.get(9)?),
        updated_at: millis_to_datetime(row.get(10)?),
    })
}

fn insert_one(conn: &Connection, profile: NewProfile, now: DateTime<Utc>) -> Result<ProfileRecord> {
    let record = ProfileRecord {
        id: Uuid::new_v4().to_string(),
        lat: profile.lat,
        lon: profile.lon,
        time: profile.time,
        temperature: profile.temperature,
        pressure: profile.pressure,
        salinity: profile.salinity,
        metadata: profile.metadata,
        created_at: now,
        updated_at: now,
        extra: profile.extra,
    };
    conn.execute(
        "INSERT INTO profiles (id, lat, lon, time, temperature, pressure, salinity, metadata, extra, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.id,
            record.lat,
            record.lon,
            record.time,
            serde_json::to_string(&record.temperature)?,
            serde_json::to_string(&record.pressure)?,
            serde_json::to_string(&record.salinity)?,
            serde_json::to_string(&record.metadata)?,
            serde_json::to_string(&record.extra)?,
            now.timestamp_millis(),
            now.timestamp_millis(),
        ],
    )?;
    Ok(record)
}

#[async_trait]
impl ProfileStore for SqliteProfileRepository {
    async fn insert_many_unordered(&self, docs: Vec<Value>) -> Result<InsertOutcome> {
        let now = millis_to_datetime(self.clock.now_millis());
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut outcome = InsertOutcome::default();

            for (index, doc) in docs.iter().enumerate() {
                let profile = match NewProfile::from_document(doc) {
                    Ok(p) => p,
                    Err(reason) => {
                        debug!("Rejected profile #{}: {}", index, reason);
                        outcome.failures.push(InsertFailure { index, reason });
                        continue;
                    }
                };
                if !profile.has_parallel_series() {
                    warn!(
                        "Profile #{} has {} temperature and {} pressure levels",
                        index,
                        profile.temperature.len(),
                        profile.pressure.len()
                    );
                }
                match insert_one(&tx, profile, now) {
                    Ok(record) => outcome.inserted.push(record),
                    Err(e) => outcome.failures.push(InsertFailure {
                        index,
                        reason: e.to_string(),
                    }),
                }
            }

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }

    async fn find(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<ProfileRecord>> {
        let query = compile_find(filter, limit);
        debug!("Profile query: {} ({} params)", query.sql, query.params.len());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&query.sql)?;
            let rows = stmt.query_map(params_from_iter(query.params.iter()), row_to_record)?;
            let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM profiles", [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::filter::FilterNormalizer;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    fn repo() -> SqliteProfileRepository {
        SqliteProfileRepository::in_memory(Arc::new(FixedClock::from_millis(NOW))).unwrap()
    }

    fn doc(lat: f64, lon: f64, time: i64, temperature: Value) -> Value {
        json!({
            "lat": lat,
            "lon": lon,
            "time": time,
            "temperature": temperature,
            "pressure": [5.0, 10.0, 20.0],
            "metadata": {"platform": format!("P{}", time)}
        })
    }

    async fn find(repo: &SqliteProfileRepository, raw: Value) -> Vec<ProfileRecord> {
        let filter = FilterNormalizer::new(0.4).normalize_value(&raw).unwrap();
        repo.find(&filter, None).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_reports_partial_success() {
        let repo = repo();
        let outcome = repo
            .insert_many_unordered(vec![
                doc(1.0, 2.0, 100, json!([10.0, 9.0, 8.0])),
                json!({"lat": "north", "lon": 2, "time": 1, "temperature": [], "pressure": []}),
                json!("not an object"),
                doc(3.0, 4.0, 200, json!([12.0])),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.inserted.len(), 2);
        assert_eq!(
            outcome.failures.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(outcome.inserted[0].created_at.timestamp_millis(), NOW);
        assert_eq!(repo.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_fields() {
        let repo = repo();
        let mut input = doc(-33.5, 151.25, 1_609_459_200_000, json!([18.5, 17.0, 15.25]));
        input["cycle_number"] = json!(42);
        let outcome = repo.insert_many_unordered(vec![input]).await.unwrap();

        let stored = repo.find(&Filter::new(), None).await.unwrap();
        assert_eq!(stored, outcome.inserted);
        assert_eq!(stored[0].extra.get("cycle_number"), Some(&json!(42)));

        let rendered = serde_json::to_value(&stored[0]).unwrap();
        assert_eq!(rendered["cycle_number"], json!(42));
        assert_eq!(rendered["_id"], json!(stored[0].id));
        assert!(rendered["createdAt"].is_string());
    }

    #[tokio::test]
    async fn test_find_by_filters() {
        let repo = repo();
        repo.insert_many_unordered(vec![
            doc(10.0, 20.0, 100, json!([25.0, 15.0, 5.0])),
            doc(10.3, 20.1, 200, json!([22.0, 12.0, 4.0])),
            doc(-40.0, 60.0, 300, json!([8.0, 6.0, 2.0])),
        ])
        .await
        .unwrap();

        assert_eq!(find(&repo, json!({"lat": {"$near": 10}})).await.len(), 2);
        assert_eq!(find(&repo, json!({"timeRange": [150, 300]})).await.len(), 2);
        assert_eq!(find(&repo, json!({"temperature": {"$gte": 24}})).await.len(), 1);
        assert_eq!(find(&repo, json!({"temperature": {"$gt": "20"}})).await.len(), 2);
        assert_eq!(find(&repo, json!({"pressure": "20"})).await.len(), 3);
        assert!(FilterNormalizer::new(0.4)
            .normalize_value(&json!({"pressure": "hot"}))
            .is_err());
        assert_eq!(find(&repo, json!({"metadata": {"platform": "P300"}})).await.len(), 1);
        assert_eq!(find(&repo, json!({"lon": {"$in": [20, 60]}})).await.len(), 2);
        assert!(find(&repo, json!({"float_serial": "X"})).await.is_empty());
    }

    #[tokio::test]
    async fn test_find_honours_limit_and_order() {
        let repo = repo();
        let docs = (0..10).map(|i| doc(0.0, 0.0, i, json!([1.0]))).collect();
        repo.insert_many_unordered(docs).await.unwrap();

        let limited = repo.find(&Filter::new(), Some(3)).await.unwrap();
        assert_eq!(limited.iter().map(|r| r.time).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
