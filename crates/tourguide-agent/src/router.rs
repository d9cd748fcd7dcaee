//! Decides whether a query needs the knowledge base.

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, AgentResult};
use crate::llm::ChatModel;
use crate::prompts::router_messages;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub need_rag: bool,
    #[serde(default)]
    pub reason: String,
}

impl RouteDecision {
    pub fn rag(reason: impl Into<String>) -> Self {
        Self {
            need_rag: true,
            reason: reason.into(),
        }
    }

    pub fn direct(reason: impl Into<String>) -> Self {
        Self {
            need_rag: false,
            reason: reason.into(),
        }
    }
}

#[async_trait]
pub trait QueryRouter: Send + Sync {
    async fn route(&self, query: &str) -> AgentResult<RouteDecision>;
}

/// Routes with a chat model that answers in JSON.
pub struct LlmRouter {
    model: Arc<dyn ChatModel>,
}

impl LlmRouter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryRouter for LlmRouter {
    async fn route(&self, query: &str) -> AgentResult<RouteDecision> {
        let reply = self.model.complete(&router_messages(query)).await?;
        let decision = parse_decision(&reply)?;
        info!(
            "Routing decision: need_rag={} ({})",
            decision.need_rag, decision.reason
        );
        Ok(decision)
    }
}

/// Parses the router reply, tolerating code fences and surrounding prose.
pub fn parse_decision(reply: &str) -> AgentResult<RouteDecision> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            warn!("Router reply has no JSON object: {reply}");
            return Err(AgentError::ResponseFormat(format!(
                "router reply is not JSON: {reply}"
            )));
        }
    };
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, TextStream};

    struct CannedModel(&'static str);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> AgentResult<String> {
            Ok(self.0.to_string())
        }

        async fn stream(&self, _messages: &[ChatMessage]) -> AgentResult<TextStream> {
            Err(AgentError::Configuration("not used".to_string()))
        }
    }

    #[test]
    fn parses_fenced_json() {
        let reply = "```json\n{\"need_rag\": false, \"reason\": \"greeting\"}\n```";
        assert_eq!(parse_decision(reply).unwrap(), RouteDecision::direct("greeting"));
    }

    #[test]
    fn reason_is_optional() {
        assert_eq!(
            parse_decision(r#"{"need_rag": true}"#).unwrap(),
            RouteDecision::rag("")
        );
    }

    #[test]
    fn prose_reply_is_an_error() {
        assert!(matches!(
            parse_decision("I think retrieval is needed"),
            Err(AgentError::ResponseFormat(_))
        ));
    }

    #[tokio::test]
    async fn llm_router_uses_model_reply() {
        let router = LlmRouter::new(Arc::new(CannedModel(
            r#"{"need_rag": true, "reason": "asks about an exhibit"}"#,
        )));
        let decision = router.route("What is the oldest vase here?").await.unwrap();
        assert!(decision.need_rag);
    }
}
