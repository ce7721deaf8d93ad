//! Profile storage
//!
//! `ProfileStore` is the seam between the pipeline and the storage engine.
//! The SQLite repository is the shipped implementation.

pub mod connection;
pub mod profile_repo;
pub mod sql_filter;

pub use connection::{open_connection, open_in_memory};
pub use profile_repo::SqliteProfileRepository;

use crate::error::Result;
use crate::filter::Filter;
use crate::profile::ProfileRecord;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A document the store refused, by position in the submitted batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsertFailure {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    pub inserted: Vec<ProfileRecord>,
    pub failures: Vec<InsertFailure>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert every acceptable document; one bad document never aborts the rest.
    async fn insert_many_unordered(&self, docs: Vec<Value>) -> Result<InsertOutcome>;

    /// Records matching `filter` in insertion order, at most `limit` of them.
    async fn find(&self, filter: &Filter, limit: Option<usize>) -> Result<Vec<ProfileRecord>>;

    async fn count(&self) -> Result<usize>;
}
