use serde::{Deserialize, Serialize};
use tourguide_agent::{AuthScheme, DEFAULT_TOP_K, FINAL_DOCS_COUNT};
use tourguide_speech::AccumulatorConfig;

/// Top-level `tourguide.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TourGuideConfig {
    pub server: ServerSection,
    pub llm: LlmSection,
    pub speech: SpeechSection,
    pub accumulator: AccumulatorConfig,
    pub retrieval: RetrievalSection,
    pub rerank: RerankSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub endpoint: String,
    pub model: String,
    pub auth: AuthScheme,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f32>,
    /// Temperature for the routing call; routing should be deterministic.
    pub router_temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            auth: AuthScheme::Bearer,
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: None,
            router_temperature: 0.0,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key_env: String,
    pub voice: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            api_key_env: "TTS_API_KEY".to_string(),
            voice: "alloy".to_string(),
            model: "tts".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSection {
    /// Directory of `*.json` knowledge-base files.
    pub docs_dir: String,
    pub top_k: usize,
    pub final_docs: usize,
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            docs_dir: "data/docs".to_string(),
            top_k: DEFAULT_TOP_K,
            final_docs: FINAL_DOCS_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankSection {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for RerankSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            model: "BAAI/bge-reranker-v2-m3".to_string(),
            api_key_env: "RERANK_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}
