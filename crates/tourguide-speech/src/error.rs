use thiserror::Error;

/// Errors raised by the speech segmentation pipeline.
#[derive(Error, Debug)]
pub enum SpeechError {
    /// The synthesis backend failed for a single segment.
    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    /// The synthesis backend answered with a non-success status.
    #[error("Speech endpoint returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Transport error talking to a remote synthesis endpoint.
    #[cfg(feature = "http-client")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Accumulator configuration rejected by `validate()`.
    #[error("Invalid accumulator configuration: {0}")]
    InvalidConfiguration(String),

    /// A user supplied sentence pattern did not compile.
    #[error("Invalid sentence pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// `add_chunk` was called after `flush`.
    #[error("Accumulator is closed: no chunks are accepted after flush")]
    AccumulatorClosed,

    /// The synthesis worker is gone and can no longer receive segments.
    #[error("Segment channel closed: {0}")]
    ChannelClosed(String),

    /// A blocking synthesis task panicked or was cancelled.
    #[error("Synthesis task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

/// Result type for speech operations
pub type SpeechResult<T> = Result<T, SpeechError>;
