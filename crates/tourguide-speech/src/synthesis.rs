//! The boundary between sanitized text and synthesized audio.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SpeechResult;

/// Synthesized audio for one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioPayload {
    /// Raw encoded audio bytes (mp3, wav, ...).
    Binary(Vec<u8>),
    /// Audio already encoded as base64 text.
    Base64(String),
}

impl AudioPayload {
    /// Base64 form used on text transports.
    pub fn to_base64(&self) -> String {
        match self {
            AudioPayload::Binary(bytes) => STANDARD.encode(bytes),
            AudioPayload::Base64(encoded) => encoded.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            AudioPayload::Binary(bytes) => bytes.is_empty(),
            AudioPayload::Base64(encoded) => encoded.is_empty(),
        }
    }
}

impl Serialize for AudioPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AudioPayload::Binary(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            AudioPayload::Base64(encoded) => serializer.serialize_str(encoded),
        }
    }
}

impl<'de> Deserialize<'de> for AudioPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(AudioPayload::Base64)
    }
}

/// Converts one sanitized segment into audio.
///
/// `Ok(None)` means the backend produced nothing for this text. Errors are
/// reported per segment; the accumulator logs and skips them.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>>;
}

#[async_trait]
impl<T: Synthesizer + ?Sized> Synthesizer for Arc<T> {
    async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>> {
        (**self).synthesize(text).await
    }
}

/// Runs a blocking synthesis function on Tokio's blocking thread pool so the
/// task feeding text into the accumulator is never stalled by it.
pub struct BlockingSynthesizer<F> {
    function: Arc<F>,
}

impl<F> BlockingSynthesizer<F>
where
    F: Fn(&str) -> SpeechResult<Option<AudioPayload>> + Send + Sync + 'static,
{
    pub fn new(function: F) -> Self {
        Self {
            function: Arc::new(function),
        }
    }
}

#[async_trait]
impl<F> Synthesizer for BlockingSynthesizer<F>
where
    F: Fn(&str) -> SpeechResult<Option<AudioPayload>> + Send + Sync + 'static,
{
    async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>> {
        let function = Arc::clone(&self.function);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || function(&text)).await?
    }
}

#[cfg(feature = "http-client")]
pub use client::{SpeechClient, SpeechClientConfig};

#[cfg(feature = "http-client")]
mod client {
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Serialize};

    use super::{AudioPayload, Synthesizer};
    use crate::error::{SpeechError, SpeechResult};

    /// Settings for an OpenAI compatible `audio/speech` endpoint.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(default)]
    pub struct SpeechClientConfig {
        /// Full URL of the speech endpoint, including any query string.
        pub endpoint: String,
        #[serde(skip_serializing)]
        pub api_key: String,
        pub voice: String,
        pub model: String,
        pub timeout_secs: u64,
    }

    impl Default for SpeechClientConfig {
        fn default() -> Self {
            Self {
                endpoint: String::new(),
                api_key: String::new(),
                voice: "alloy".to_string(),
                model: "tts".to_string(),
                timeout_secs: 60,
            }
        }
    }

    impl SpeechClientConfig {
        pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
            Self {
                endpoint: endpoint.into(),
                api_key: api_key.into(),
                ..Self::default()
            }
        }

        pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
            self.voice = voice.into();
            self
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        pub fn with_timeout_secs(mut self, secs: u64) -> Self {
            self.timeout_secs = secs;
            self
        }
    }

    #[derive(Serialize)]
    struct SpeechBody<'a> {
        input: &'a str,
        voice: &'a str,
        model: &'a str,
    }

    /// HTTP synthesizer returning the response body as base64 audio.
    pub struct SpeechClient {
        client: reqwest::Client,
        config: SpeechClientConfig,
    }

    impl SpeechClient {
        pub fn new(config: SpeechClientConfig) -> SpeechResult<Self> {
            if config.endpoint.is_empty() {
                return Err(SpeechError::InvalidConfiguration(
                    "speech endpoint must not be empty".to_string(),
                ));
            }
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?;
            Ok(Self { client, config })
        }

        pub fn config(&self) -> &SpeechClientConfig {
            &self.config
        }
    }

    #[async_trait]
    impl Synthesizer for SpeechClient {
        async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>> {
            let body = SpeechBody {
                input: text,
                voice: &self.config.voice,
                model: &self.config.model,
            };

            let response = self
                .client
                .post(&self.config.endpoint)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to read error body".to_string());
                return Err(SpeechError::HttpStatus { status, body });
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Ok(None);
            }
            Ok(Some(AudioPayload::Base64(STANDARD.encode(&bytes))))
        }
    }
}
