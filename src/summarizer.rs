//! Result Summarizer
//!
//! Turns matched records into a readable answer. This step is best-effort:
//! whatever goes wrong, the caller gets a summary string back.

use crate::error::{ArgoError, Result};
use crate::llm::{strip_code_fences, TextGenerator};
use crate::profile::ProfileRecord;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const NO_PROFILES_SUMMARY: &str = "No profiles found.";

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    /// The fallback text stands in for a failed service call
    pub degraded: bool,
}

pub struct ResultSummarizer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl ResultSummarizer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn fallback_summary(count: usize) -> String {
        format!(
            "Found {} profiles matching your query, but a summary could not be generated.",
            count
        )
    }

    pub fn build_prompt(records: &[ProfileRecord], question: &str) -> Result<String> {
        let data = serde_json::to_string(records)?;
        Ok(format!(
            r#"I have these ARGO profiles data:
{}
and the user asks: "{}".
Answer the question from this data in a professional way.
Summarize them in a clear, human-readable way. Highlight key info such as average temperature, salinity, pressure, locations, times, and notable patterns.
Return a JSON object: {{ "summary": "..." }} only."#,
            data, question
        ))
    }

    /// Summary for `records`; never fails.
    pub async fn summarize(&self, records: &[ProfileRecord], question: &str) -> String {
        self.summarize_outcome(records, question).await.text
    }

    pub async fn summarize_outcome(&self, records: &[ProfileRecord], question: &str) -> Summary {
        if records.is_empty() {
            return Summary {
                text: NO_PROFILES_SUMMARY.to_string(),
                degraded: false,
            };
        }
        match self.try_summarize(records, question).await {
            Ok(text) => Summary { text, degraded: false },
            Err(e) => {
                error!("LLM summarization failed: {}", e);
                Summary {
                    text: Self::fallback_summary(records.len()),
                    degraded: true,
                }
            }
        }
    }

    async fn try_summarize(&self, records: &[ProfileRecord], question: &str) -> Result<String> {
        let prompt = Self::build_prompt(records, question)?;
        let generation = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| ArgoError::Summarization(format!("timed out after {}s", self.timeout.as_secs())))?
            .map_err(|e| ArgoError::Summarization(e.to_string()))?;

        let text = generation
            .first_text()
            .map_err(|reason| ArgoError::Summarization(reason.to_string()))?;
        let cleaned = strip_code_fences(text);
        if cleaned.is_empty() {
            return Err(ArgoError::Summarization("empty summary".to_string()));
        }
        Ok(extract_summary(cleaned))
    }
}

/// `summary` field of a JSON reply, or the reply itself when it is not one.
fn extract_summary(cleaned: String) -> String {
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(obj)) => match obj.get("summary") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => cleaned,
            Some(other) => other.to_string(),
        },
        Ok(_) => cleaned,
        Err(_) => {
            debug!("Summary is not JSON, using raw text");
            cleaned
        }
    }
}
