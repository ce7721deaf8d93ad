use crate::error::{ArgoError, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"```(?:json|JSON)?").expect("valid code fence pattern");
}

/// Reply of a `generateContent` call: ordered candidates, each with ordered parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

impl Generation {
    /// A single candidate with a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part {
                        text: Some(text.into()),
                    }],
                }),
            }],
        }
    }

    /// Text of the first part of the first candidate.
    pub fn first_text(&self) -> std::result::Result<&str, &'static str> {
        let candidate = self.candidates.first().ok_or("no candidates returned")?;
        let part = candidate
            .content
            .as_ref()
            .and_then(|c| c.parts.first())
            .ok_or("no content parts in first candidate")?;
        part.text.as_deref().ok_or("no text in first content part")
    }
}

/// Removes ```` ```json ```` / ```` ``` ```` markup and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Natural-language generation capability used for translation and summaries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Generation>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Client for the Gemini `generateContent` endpoint
pub struct LlmClient {
    api_key: Option<String>,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArgoError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
            config.llm_timeout,
        )
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ArgoError::Service("GEMINI_API_KEY is not configured".to_string()))?;

        let body = serde_json::json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ArgoError::Service(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, text);
            return Err(ArgoError::Service(format!("LLM API returned {}", status)));
        }

        let generation: Generation = response
            .json()
            .await
            .map_err(|e| ArgoError::Service(format!("Failed to parse LLM response: {}", e)))?;
        debug!("LLM returned {} candidate(s)", generation.candidates.len());

        Ok(generation)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Deterministic stand-in for the generation service.
///
/// Replies are handed out in order; every prompt is recorded. Running out of
/// replies is a service error.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<Generation>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_text(self, text: impl Into<String>) -> Self {
        self.reply(Ok(Generation::text(text)))
    }

    pub fn reply_failure(self, message: impl Into<String>) -> Self {
        self.reply(Err(ArgoError::Service(message.into())))
    }

    pub fn reply(self, reply: Result<Generation>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<Generation> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies
            .lock()
            .map_err(|_| ArgoError::Service("scripted generator poisoned".to_string()))?
            .pop_front()
            .unwrap_or_else(|| Err(ArgoError::Service("no scripted reply left".to_string())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Generation service that accepts the prompt and never answers.
#[derive(Default)]
pub struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Generation> {
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"lat\": 1}\n```"), "{\"lat\": 1}");
        assert_eq!(strip_code_fences("  ```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_first_text() {
        assert_eq!(Generation::text("hi").first_text(), Ok("hi"));
        assert!(Generation::default().first_text().is_err());

        let no_parts = Generation {
            candidates: vec![Candidate {
                content: Some(Content { parts: vec![] }),
            }],
        };
        assert_eq!(no_parts.first_text(), Err("no content parts in first candidate"));

        let no_text = Generation {
            candidates: vec![Candidate {
                content: Some(Content {
                    parts: vec![Part { text: None }],
                }),
            }],
        };
        assert_eq!(no_text.first_text(), Err("no text in first content part"));
    }

    #[test]
    fn test_generation_deserializes_gemini_shape() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "{\"lat\": 5}"}], "role": "model"}, "finishReason": "STOP"}
            ],
            "usageMetadata": {"promptTokenCount": 10}
        }"#;
        let generation: Generation = serde_json::from_str(raw).unwrap();
        assert_eq!(generation.first_text(), Ok("{\"lat\": 5}"));
    }

    #[tokio::test]
    async fn test_scripted_generator_replays_in_order() {
        let generator = ScriptedGenerator::new()
            .reply_text("first")
            .reply_failure("boom");

        let first = generator.generate("p1").await.unwrap();
        assert_eq!(first.first_text(), Ok("first"));
        assert!(matches!(generator.generate("p2").await, Err(ArgoError::Service(_))));
        assert!(generator.generate("p3").await.is_err());
        assert_eq!(generator.prompts(), vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_client_without_key_is_service_error() {
        let client = LlmClient::new(
            None,
            "gemini-2.0-flash".to_string(),
            "http://localhost:1".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!client.has_api_key());
        assert!(matches!(client.generate("hello").await, Err(ArgoError::Service(_))));
    }
}
