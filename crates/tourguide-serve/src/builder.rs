use std::path::Path;
use std::sync::Arc;

use log::info;
use tourguide_agent::{
    HttpReranker, LazyRetriever, LlmConfig, LlmRouter, OpenAiChatModel, RerankConfig, TourGuide,
    TurnRequest, WorkflowConfig,
};
use tourguide_speech::{
    AccumulatorConfig, AudioPayload, DeliveryStream, SpeechClient, SpeechClientConfig, Synthesizer,
    sanitize,
};

use crate::config::{TourGuideConfig, parse_yaml_file, validate_config};
use crate::error::{Result, ServeError};

type SecretLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// The assembled agent plus its speech settings, shared by every request.
pub struct TourGuideService {
    guide: TourGuide,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    accumulator: AccumulatorConfig,
}

impl TourGuideService {
    pub fn new(
        guide: TourGuide,
        synthesizer: Option<Arc<dyn Synthesizer>>,
        accumulator: AccumulatorConfig,
    ) -> Self {
        Self {
            guide,
            synthesizer,
            accumulator,
        }
    }

    pub fn guide(&self) -> &TourGuide {
        &self.guide
    }

    pub fn speech_enabled(&self) -> bool {
        self.synthesizer.is_some()
    }

    /// Streams one turn. Audio is produced only if requested and configured.
    pub async fn chat(&self, request: &TurnRequest, audio: bool) -> Result<DeliveryStream> {
        let stream = match (&self.synthesizer, audio) {
            (Some(synthesizer), true) => {
                self.guide
                    .speak(request, Arc::clone(synthesizer), self.accumulator.clone())
                    .await?
            }
            _ => self.guide.narrate(request).await?,
        };
        Ok(stream)
    }

    /// Synthesizes `text` in one call, after stripping unspeakable markup.
    pub async fn synthesize(&self, text: &str) -> Result<Option<AudioPayload>> {
        let Some(synthesizer) = &self.synthesizer else {
            return Err(ServeError::ConfigError("speech is disabled".to_string()));
        };
        let cleaned = sanitize(text);
        if cleaned.trim().is_empty() {
            return Ok(None);
        }
        Ok(synthesizer.synthesize(&cleaned).await?)
    }
}

/// Builds a [`TourGuideService`] from configuration.
pub struct ServiceBuilder {
    pub config: TourGuideConfig,
    secrets: SecretLookup,
}

impl ServiceBuilder {
    pub fn new(config: TourGuideConfig) -> Self {
        Self {
            config,
            secrets: Box::new(|name| std::env::var(name).ok()),
        }
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let config = parse_yaml_file(path)?;
        validate_config(&config)?;
        Ok(Self::new(config))
    }

    /// Replaces the environment as the source of API keys.
    pub fn with_secrets<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.secrets = Box::new(lookup);
        self
    }

    fn secret(&self, variable: &str) -> Result<String> {
        (self.secrets)(variable)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ServeError::MissingSecret(variable.to_string()))
    }

    pub fn build(self) -> Result<TourGuideService> {
        validate_config(&self.config)?;
        let config = &self.config;

        let llm = LlmConfig {
            endpoint: config.llm.endpoint.clone(),
            api_key: self.secret(&config.llm.api_key_env)?,
            auth: config.llm.auth,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            timeout_secs: config.llm.timeout_secs,
        };
        let router_llm = LlmConfig {
            temperature: Some(config.llm.router_temperature),
            ..llm.clone()
        };
        let generator = Arc::new(OpenAiChatModel::new(llm)?);
        let router = Arc::new(LlmRouter::new(Arc::new(OpenAiChatModel::new(router_llm)?)));

        info!("Knowledge base: {}", config.retrieval.docs_dir);
        let retriever = Arc::new(LazyRetriever::from_dir(&config.retrieval.docs_dir));

        let mut guide = TourGuide::new(generator, retriever)
            .with_router(router)
            .with_config(WorkflowConfig {
                top_k: config.retrieval.top_k,
                final_docs: config.retrieval.final_docs,
            });

        if config.rerank.enabled {
            let reranker = HttpReranker::new(RerankConfig {
                endpoint: config.rerank.endpoint.clone(),
                api_key: self.secret(&config.rerank.api_key_env)?,
                model: config.rerank.model.clone(),
                timeout_secs: config.rerank.timeout_secs,
            })?;
            guide = guide.with_reranker(Arc::new(reranker));
            info!("Rerank enabled with model {}", config.rerank.model);
        }

        let synthesizer: Option<Arc<dyn Synthesizer>> = if config.speech.enabled {
            let client = SpeechClient::new(
                SpeechClientConfig::new(
                    config.speech.endpoint.clone(),
                    self.secret(&config.speech.api_key_env)?,
                )
                .with_voice(config.speech.voice.clone())
                .with_model(config.speech.model.clone())
                .with_timeout_secs(config.speech.timeout_secs),
            )?;
            info!("Speech enabled with voice {}", config.speech.voice);
            Some(Arc::new(client))
        } else {
            info!("Speech disabled");
            None
        };

        Ok(TourGuideService::new(
            guide,
            synthesizer,
            config.accumulator.clone(),
        ))
    }
}
