//! Filter Translator
//!
//! Asks the generation service to turn a question into a MongoDB-style filter
//! over the profile collection. The reply is untrusted: it is only checked to
//! be a JSON object here, and the normalizer decides what it means.

use crate::error::{ArgoError, Result};
use crate::llm::{strip_code_fences, TextGenerator};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Shape of a stored profile, as described to the model.
pub const SCHEMA_DESCRIPTION: &str = r#"Each profile has: {
  lat: Number (degrees, -90..90),
  lon: Number (degrees, -180..180),
  time: Number (epoch milliseconds, UTC),
  temperature: [Number] (degrees Celsius, one value per depth level),
  pressure: [Number] (decibar, one value per depth level),
  salinity: [Number] (PSU, one value per depth level, may be empty),
  metadata: Object (free-form, e.g. platform number, project name)
}"#;

const OPERATOR_GUIDE: &str = r#"Supported operators: $gte, $gt, $lte, $lt, $eq, $in.
Use {"$near": <number>} on lat or lon to ask for profiles close to a coordinate.
Use "timeRange": [<start epoch ms>, <end epoch ms>] for a time window.
Match metadata keys with dotted names such as "metadata.platform".
Do not use $or, $and, $regex or geo operators."#;

pub struct FilterTranslator {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl FilterTranslator {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    pub fn build_prompt(question: &str) -> String {
        format!(
            r#"You are helping query a collection of ARGO ocean profiles.
{}
{}
Convert this natural query into a valid MongoDB filter JSON object only:
"{}"
Return JSON only."#,
            SCHEMA_DESCRIPTION, OPERATOR_GUIDE, question
        )
    }

    /// Translate a question into an un-normalized filter object.
    pub async fn translate(&self, question: &str) -> Result<Map<String, Value>> {
        let prompt = Self::build_prompt(question);
        info!("Translating query with {}: {}", self.generator.name(), question);

        let generation = tokio::time::timeout(self.timeout, self.generator.generate(&prompt))
            .await
            .map_err(|_| {
                ArgoError::Service(format!(
                    "filter translation timed out after {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let text = generation
            .first_text()
            .map_err(|reason| ArgoError::Translation(reason.to_string()))?;
        let cleaned = strip_code_fences(text);
        if cleaned.is_empty() {
            return Err(ArgoError::Translation("generation service returned an empty filter".to_string()));
        }
        debug!("Raw filter text: {}", cleaned);

        parse_filter_text(&cleaned)
    }
}

/// Parse cleaned model output as a JSON object.
pub fn parse_filter_text(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(other) => Err(ArgoError::filter_parse(
            format!("expected a JSON object, got {}", crate::profile::json_kind(&other)),
            text,
        )),
        Err(e) => Err(ArgoError::filter_parse(
            format!("Invalid JSON returned by LLM: {}", e),
            text,
        )),
    }
}
