//! Logging setup and the in-memory chat query history

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber; `RUST_LOG` overrides the default level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOutcome {
    Completed,
    /// Completed, but with the fallback summary
    Degraded,
    Failed,
}

/// One chat query as it went through the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct QueryLogEntry {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    #[serde(rename = "appliedFilter")]
    pub applied_filter: Option<Value>,
    pub count: usize,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub outcome: QueryOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded history of recent chat queries, newest at the front
pub struct QueryLog {
    entries: Mutex<VecDeque<QueryLogEntry>>,
    max_entries: usize,
}

impl QueryLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_entries.min(1024))),
            max_entries,
        }
    }

    pub fn record(&self, entry: QueryLogEntry) {
        if self.max_entries == 0 {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.max_entries {
                entries.pop_back();
            }
            entries.push_front(entry);
        }
    }

    pub fn recent(&self) -> Vec<QueryLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str) -> QueryLogEntry {
        QueryLogEntry {
            timestamp: Utc::now(),
            query: query.to_string(),
            applied_filter: None,
            count: 0,
            duration_ms: 1,
            outcome: QueryOutcome::Completed,
            error: None,
        }
    }

    #[test]
    fn test_query_log_is_bounded_newest_first() {
        let log = QueryLog::new(2);
        log.record(entry("a"));
        log.record(entry("b"));
        log.record(entry("c"));
        let queries: Vec<String> = log.recent().into_iter().map(|e| e.query).collect();
        assert_eq!(queries, vec!["c", "b"]);
    }

    #[test]
    fn test_entry_serializes_for_gui() {
        let value = serde_json::to_value(entry("warm water")).unwrap();
        assert_eq!(value["outcome"], "completed");
        assert!(value.get("error").is_none());
        assert!(value.get("durationMs").is_some());
    }
}
