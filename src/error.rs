use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArgoError {
    /// Malformed request shape, e.g. a non-array ingestion body
    #[error("Validation error: {0}")]
    Validation(String),

    /// The generation service answered, but with nothing usable
    #[error("Translation error: {0}")]
    Translation(String),

    /// Filter text that is not JSON, or a filter shape we refuse to run
    #[error("Filter parse error: {message}")]
    FilterParse { message: String, raw: String },

    #[error("Store error: {0}")]
    Store(String),

    /// Network/transport fault talking to the generation service
    #[error("Generation service error: {0}")]
    Service(String),

    /// Never surfaced to clients; the summarizer degrades instead
    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArgoError {
    pub fn filter_parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        ArgoError::FilterParse {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// HTTP status the error maps to at the transport boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            ArgoError::Validation(_)
            | ArgoError::Translation(_)
            | ArgoError::FilterParse { .. }
            | ArgoError::Json(_) => 400,
            ArgoError::Service(_)
            | ArgoError::Store(_)
            | ArgoError::Summarization(_)
            | ArgoError::Config(_)
            | ArgoError::Io(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for ArgoError {
    fn from(err: rusqlite::Error) -> Self {
        ArgoError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ArgoError>;
