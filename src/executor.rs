//! Query Executor
//!
//! Runs a normalized filter against the store with a hard cap on the number
//! of records, which bounds both the response payload and the summarization
//! prompt.

use crate::db::ProfileStore;
use crate::error::{ArgoError, Result};
use crate::filter::Filter;
use crate::profile::ProfileRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct QueryExecutor {
    store: Arc<dyn ProfileStore>,
    limit: usize,
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn ProfileStore>, limit: usize, timeout: Duration) -> Self {
        Self { store, limit, timeout }
    }

    pub async fn execute(&self, filter: &Filter) -> Result<Vec<ProfileRecord>> {
        let mut records = tokio::time::timeout(self.timeout, self.store.find(filter, Some(self.limit)))
            .await
            .map_err(|_| ArgoError::Store(format!("query timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| {
                error!("Profile query failed: {}", e);
                e
            })?;

        // The store is an external collaborator; the cap holds regardless
        records.truncate(self.limit);
        info!("Found {} profiles", records.len());
        Ok(records)
    }
}
