use super::schema::TourGuideConfig;
use crate::error::{Result, ServeError};

/// Checks a parsed configuration, reporting every problem at once.
pub fn validate_config(config: &TourGuideConfig) -> Result<()> {
    let mut issues = Vec::new();

    if config.server.port == 0 {
        issues.push("server.port must be non-zero".to_string());
    }

    if !is_http_url(&config.llm.endpoint) {
        issues.push("llm.endpoint must be an http(s) url".to_string());
    }
    if config.llm.model.trim().is_empty() {
        issues.push("llm.model is required".to_string());
    }
    if config.llm.api_key_env.trim().is_empty() {
        issues.push("llm.api_key_env is required".to_string());
    }

    if config.speech.enabled {
        if !is_http_url(&config.speech.endpoint) {
            issues.push("speech.endpoint must be an http(s) url when speech is enabled".to_string());
        }
        if config.speech.voice.trim().is_empty() {
            issues.push("speech.voice is required".to_string());
        }
    }

    if let Err(err) = config.accumulator.validate() {
        issues.push(format!("accumulator: {err}"));
    }

    let retrieval = &config.retrieval;
    if retrieval.docs_dir.trim().is_empty() {
        issues.push("retrieval.docs_dir is required".to_string());
    }
    if retrieval.top_k == 0 {
        issues.push("retrieval.top_k must be at least 1".to_string());
    }
    if retrieval.final_docs == 0 {
        issues.push("retrieval.final_docs must be at least 1".to_string());
    }
    if retrieval.final_docs > retrieval.top_k {
        issues.push("retrieval.final_docs cannot exceed retrieval.top_k".to_string());
    }

    if config.rerank.enabled && !is_http_url(&config.rerank.endpoint) {
        issues.push("rerank.endpoint must be an http(s) url when rerank is enabled".to_string());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(ServeError::ValidationError(issues.join("; ")))
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}
