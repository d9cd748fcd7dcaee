use thiserror::Error;
use tourguide_speech::SpeechError;

/// Errors raised while answering a turn.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote model or service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {body}")]
    HttpStatus {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document file {path}: {reason}")]
    DocumentFormat { path: String, reason: String },

    /// A response arrived but did not have the expected shape.
    #[error("Unexpected response: {0}")]
    ResponseFormat(String),

    #[error("Search index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),
}

pub type AgentResult<T> = Result<T, AgentError>;
