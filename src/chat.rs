//! Chat query pipeline
//!
//! `Received → Translating → Normalizing → Querying → Summarizing → Completed`.
//! Each step runs only after the previous one finished. Translation,
//! normalization and query failures end the request; a summarization failure
//! only swaps in a fallback summary.

use crate::error::{ArgoError, Result};
use crate::executor::QueryExecutor;
use crate::filter::FilterNormalizer;
use crate::observability::{QueryLog, QueryLogEntry, QueryOutcome};
use crate::profile::ProfileRecord;
use crate::summarizer::ResultSummarizer;
use crate::translator::FilterTranslator;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatStage {
    Received,
    Translating,
    Normalizing,
    Querying,
    Summarizing,
    Completed,
}

impl fmt::Display for ChatStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChatStage::Received => "received",
            ChatStage::Translating => "translating",
            ChatStage::Normalizing => "normalizing",
            ChatStage::Querying => "querying",
            ChatStage::Summarizing => "summarizing",
            ChatStage::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Body of a successful `POST /chat/query`
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub query: String,
    #[serde(rename = "appliedFilter")]
    pub applied_filter: Value,
    pub count: usize,
    pub results: Vec<ProfileRecord>,
    pub summary: String,
}

pub struct ChatService {
    translator: FilterTranslator,
    normalizer: FilterNormalizer,
    executor: QueryExecutor,
    summarizer: ResultSummarizer,
    history: Arc<QueryLog>,
}

impl ChatService {
    pub fn new(
        translator: FilterTranslator,
        normalizer: FilterNormalizer,
        executor: QueryExecutor,
        summarizer: ResultSummarizer,
        history: Arc<QueryLog>,
    ) -> Self {
        Self {
            translator,
            normalizer,
            executor,
            summarizer,
            history,
        }
    }

    pub fn history(&self) -> &Arc<QueryLog> {
        &self.history
    }

    pub async fn answer(&self, question: &str) -> Result<ChatResponse> {
        let started = Instant::now();
        let mut applied: Option<Value> = None;
        let result = self.run(question, &mut applied).await;

        let (count, outcome, error) = match &result {
            Ok((response, degraded)) => {
                let outcome = if *degraded {
                    QueryOutcome::Degraded
                } else {
                    QueryOutcome::Completed
                };
                (response.count, outcome, None)
            }
            Err(e) => {
                warn!("Chat query failed: {}", e);
                (0, QueryOutcome::Failed, Some(e.to_string()))
            }
        };
        self.history.record(QueryLogEntry {
            timestamp: Utc::now(),
            query: question.to_string(),
            applied_filter: applied,
            count,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            outcome,
            error,
        });

        result.map(|(response, _)| response)
    }

    /// `raw_query` is echoed back as sent; the pipeline sees it trimmed.
    async fn run(&self, raw_query: &str, applied: &mut Option<Value>) -> Result<(ChatResponse, bool)> {
        let question = raw_query.trim();
        transition(ChatStage::Received);
        if question.is_empty() {
            return Err(ArgoError::Validation("Expected a non-empty 'query' string".to_string()));
        }

        transition(ChatStage::Translating);
        let raw_filter = self.translator.translate(question).await?;

        transition(ChatStage::Normalizing);
        let filter = self.normalizer.normalize(&raw_filter)?;
        let applied_filter = filter.to_json();
        debug!("Normalized filter: {}", applied_filter);
        *applied = Some(applied_filter.clone());

        transition(ChatStage::Querying);
        let results = self.executor.execute(&filter).await?;

        transition(ChatStage::Summarizing);
        let summary = self.summarizer.summarize_outcome(&results, question).await;

        transition(ChatStage::Completed);
        info!("Answered chat query with {} profiles", results.len());
        Ok((
            ChatResponse {
                query: raw_query.to_string(),
                applied_filter,
                count: results.len(),
                results,
                summary: summary.text,
            },
            summary.degraded,
        ))
    }
}

fn transition(stage: ChatStage) {
    debug!(stage = %stage, "chat query stage");
}
