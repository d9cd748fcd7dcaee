use thiserror::Error;
use tourguide_agent::AgentError;
use tourguide_speech::SpeechError;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Agent error: {0}")]
    AgentError(#[from] AgentError),

    #[error("Speech error: {0}")]
    SpeechError(#[from] SpeechError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Missing secret: environment variable {0} is not set")]
    MissingSecret(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

pub type Result<T> = std::result::Result<T, ServeError>;
