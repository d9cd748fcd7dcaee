//! Chat model abstraction and an OpenAI compatible HTTP client.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AgentError, AgentResult};

/// Incremental answer text.
pub type TextStream = Pin<Box<dyn Stream<Item = AgentResult<String>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the whole reply at once.
    async fn complete(&self, messages: &[ChatMessage]) -> AgentResult<String>;

    /// Streams the reply as text deltas.
    async fn stream(&self, messages: &[ChatMessage]) -> AgentResult<TextStream>;
}

/// How the API key is presented to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `api-key: <key>`, as used by Azure deployments.
    ApiKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Full URL of the chat completions endpoint.
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub auth: AuthScheme,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            auth: AuthScheme::Bearer,
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
            timeout_secs: 120,
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Splits a server-sent event byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    done: bool,
}

/// One decoded `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseData {
    Json(String),
    Done,
}

impl SseDecoder {
    /// Feeds raw bytes and returns every complete payload they finish.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseData> {
        self.pending.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                self.done = true;
                out.push(SseData::Done);
            } else if !data.is_empty() {
                out.push(SseData::Json(data.to_string()));
            }
        }
        out
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

fn delta_text(payload: &str) -> AgentResult<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|content| !content.is_empty()))
}

pub struct OpenAiChatModel {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiChatModel {
    pub fn new(config: LlmConfig) -> AgentResult<Self> {
        if config.endpoint.is_empty() {
            return Err(AgentError::Configuration(
                "llm endpoint must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> AgentResult<reqwest::Response> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream,
        };
        let request = self.client.post(&self.config.endpoint).json(&body);
        let request = match self.config.auth {
            AuthScheme::Bearer => request.bearer_auth(&self.config.api_key),
            AuthScheme::ApiKey => request.header("api-key", &self.config.api_key),
        };

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(AgentError::HttpStatus {
                service: "llm",
                status,
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[ChatMessage]) -> AgentResult<String> {
        let response: CompletionResponse = self.send(messages, false).await?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AgentError::ResponseFormat("completion has no content".to_string()))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> AgentResult<TextStream> {
        let response = self.send(messages, true).await?;
        let mut bytes = response.bytes_stream();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        error!("LLM stream interrupted: {err}");
                        let _ = tx.send(Err(AgentError::Http(err)));
                        return;
                    }
                };
                for data in decoder.push(&chunk) {
                    let SseData::Json(payload) = data else {
                        debug!("LLM stream finished");
                        return;
                    };
                    match delta_text(&payload) {
                        Ok(Some(text)) => {
                            if tx.send(Ok(text)).is_err() {
                                debug!("LLM stream consumer dropped");
                                return;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => debug!("Skipping malformed stream chunk: {err}"),
                    }
                }
            }
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn decoder_handles_split_lines_and_done() {
        let mut decoder = SseDecoder::default();
        let first = decoder.push(b"data: {\"a\":1}\n\nda");
        assert_eq!(first, vec![SseData::Json("{\"a\":1}".to_string())]);
        let second = decoder.push(b"ta: {\"b\":2}\n: keep-alive\ndata: [DONE]\n");
        assert_eq!(
            second,
            vec![SseData::Json("{\"b\":2}".to_string()), SseData::Done]
        );
        assert!(decoder.is_done());
    }

    #[test]
    fn decoder_keeps_multibyte_chars_split_across_reads() {
        let mut decoder = SseDecoder::default();
        let line = "data: 博物馆\n".as_bytes();
        assert!(decoder.push(&line[..8]).is_empty());
        assert_eq!(
            decoder.push(&line[8..]),
            vec![SseData::Json("博物馆".to_string())]
        );
    }

    #[test]
    fn delta_text_ignores_role_only_chunks() {
        assert_eq!(
            delta_text(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap(),
            None
        );
        assert_eq!(
            delta_text(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).unwrap(),
            Some("Hi".to_string())
        );
    }

    fn model(server: &MockServer, auth: AuthScheme) -> OpenAiChatModel {
        OpenAiChatModel::new(LlmConfig {
            endpoint: server.url("/chat/completions"),
            api_key: "sk-test".to_string(),
            auth,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("api-key", "sk-test");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "{\"need_rag\": true}"}}]
                }));
            })
            .await;

        let reply = model(&server, AuthScheme::ApiKey)
            .complete(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(reply, "{\"need_rag\": true}");
    }

    #[tokio::test]
    async fn stream_yields_deltas_until_done() {
        let server = MockServer::start_async().await;
        let body = [
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"The vase "}}]}"#,
            r#"data: {"choices":[{"delta":{"content":"is blue. "}}]}"#,
            "data: [DONE]",
            "",
        ]
        .join("\n\n");
        server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test");
                then.status(200)
                    .header("content-type", "text/event-stream")
                    .body(body);
            })
            .await;

        let stream = model(&server, AuthScheme::Bearer)
            .stream(&[ChatMessage::user("vase?")])
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;
        assert_eq!(chunks, vec!["The vase ", "is blue. "]);
    }

    #[tokio::test]
    async fn http_errors_are_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500).body("overloaded");
            })
            .await;

        let result = model(&server, AuthScheme::Bearer)
            .complete(&[ChatMessage::user("hi")])
            .await;
        assert!(matches!(
            result,
            Err(AgentError::HttpStatus { status: 500, .. })
        ));
    }
}
