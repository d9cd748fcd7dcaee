use super::state::AppState;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tourguide_agent::TurnRequest;
use tourguide_speech::{AudioPayload, DeliveryEvent};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default = "default_audio")]
    pub audio: bool,
}

fn default_audio() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SpeechResponse {
    pub audio: Option<AudioPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub speech: bool,
}

pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    log::info!("Creating API router with endpoints:");
    log::info!("  GET  /health");
    log::info!("  POST /api/v1/chat");
    log::info!("  POST /api/v1/speech");

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/speech", post(speech))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    log::debug!("Health check endpoint called");
    Json(HealthResponse {
        status: "ok".to_string(),
        speech: state.service.speech_enabled(),
    })
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, AppError> {
    if payload.query.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }

    let request_id = Uuid::new_v4();
    let start = Instant::now();
    log::info!(
        "[{}] Chat request: '{}' (doc_id: {:?}, audio: {})",
        request_id,
        payload.query,
        payload.doc_id,
        payload.audio
    );

    let turn = TurnRequest {
        query: payload.query,
        doc_id: payload.doc_id,
    };
    let stream = state
        .service
        .chat(&turn, payload.audio)
        .await
        .map_err(|e| {
            log::error!("[{}] Failed to start answer: {}", request_id, e);
            AppError::Upstream(e.to_string())
        })?;
    log::debug!(
        "[{}] Streaming started in {:.2}s",
        request_id,
        start.elapsed().as_secs_f64()
    );

    let events = stream
        .map(|event| Ok::<SseEvent, Infallible>(sse_event(&event)))
        .chain(futures::stream::once(async move {
            log::info!(
                "[{}] Turn finished in {:.2}s",
                request_id,
                start.elapsed().as_secs_f64()
            );
            Ok::<SseEvent, Infallible>(SseEvent::default().event("end").data("{}"))
        }));

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

async fn speech(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SpeechRequest>,
) -> Result<Json<SpeechResponse>, AppError> {
    if !state.service.speech_enabled() {
        return Err(AppError::Unavailable("speech is disabled".to_string()));
    }
    let audio = state.service.synthesize(&payload.text).await.map_err(|e| {
        log::error!("One-shot synthesis failed: {}", e);
        AppError::Upstream(e.to_string())
    })?;
    Ok(Json(SpeechResponse { audio }))
}

fn sse_event(event: &DeliveryEvent) -> SseEvent {
    let payload = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(event.kind()).data(payload)
}

// Error handling
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unavailable(String),
    Upstream(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TourGuideService;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tourguide_agent::{
        AgentResult, Bm25Retriever, ChatMessage, ChatModel, QueryRouter, RouteDecision,
        TextStream, TourGuide,
    };
    use tourguide_speech::{AccumulatorConfig, SpeechResult, Synthesizer};
    use tower::ServiceExt;

    struct FixedModel;

    #[async_trait]
    impl ChatModel for FixedModel {
        async fn complete(&self, _messages: &[ChatMessage]) -> AgentResult<String> {
            Ok(r#"{"need_rag": false, "reason": "test"}"#.to_string())
        }

        async fn stream(&self, _messages: &[ChatMessage]) -> AgentResult<TextStream> {
            let chunks: Vec<AgentResult<String>> = vec![
                Ok("Welcome to the gallery. ".to_string()),
                Ok("Enjoy!".to_string()),
            ];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    struct DirectRouter;

    #[async_trait]
    impl QueryRouter for DirectRouter {
        async fn route(&self, _query: &str) -> AgentResult<RouteDecision> {
            Ok(RouteDecision::direct("test"))
        }
    }

    struct EchoSynth;

    #[async_trait]
    impl Synthesizer for EchoSynth {
        async fn synthesize(&self, text: &str) -> SpeechResult<Option<AudioPayload>> {
            Ok(Some(AudioPayload::Base64(format!("audio:{text}"))))
        }
    }

    fn app(speech: bool) -> Router {
        let retriever = Bm25Retriever::new(Vec::new()).unwrap();
        let guide = TourGuide::new(Arc::new(FixedModel), Arc::new(retriever))
            .with_router(Arc::new(DirectRouter));
        let synthesizer: Option<Arc<dyn Synthesizer>> = if speech {
            Some(Arc::new(EchoSynth))
        } else {
            None
        };
        let service =
            TourGuideService::new(guide, synthesizer, AccumulatorConfig::sentence_pattern(1));
        create_router(Arc::new(AppState::new(service)))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_speech() {
        let response = app(true)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health.status, "ok");
        assert!(health.speech);
    }

    #[tokio::test]
    async fn test_chat_streams_text_audio_and_end() {
        let response = app(true)
            .oneshot(post_json(
                "/api/v1/chat",
                serde_json::json!({"query": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_text(response).await;
        assert!(body.contains("event: text"));
        assert!(body.contains(r#"{"type":"text","chunk":"Welcome to the gallery. "}"#));
        assert!(body.contains(r#"{"type":"audio","chunk":"audio:Welcome to the gallery. "}"#));
        assert!(body.contains(r#"{"type":"audio","chunk":"audio:Enjoy!"}"#));
        assert!(body.trim_end().ends_with("data: {}"));
        assert!(body.contains("event: end"));
    }

    #[tokio::test]
    async fn test_chat_without_audio() {
        let response = app(true)
            .oneshot(post_json(
                "/api/v1/chat",
                serde_json::json!({"query": "hello", "audio": false}),
            ))
            .await
            .unwrap();
        let body = body_text(response).await;
        assert!(body.contains("event: text"));
        assert!(!body.contains("event: audio"));
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_query() {
        let response = app(true)
            .oneshot(post_json("/api/v1/chat", serde_json::json!({"query": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_speech_endpoint() {
        let response = app(true)
            .oneshot(post_json(
                "/api/v1/speech",
                serde_json::json!({"text": "Hi ![x](http://y/z.png)"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: SpeechResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed.audio, Some(AudioPayload::Base64("audio:Hi ".to_string())));

        let response = app(false)
            .oneshot(post_json("/api/v1/speech", serde_json::json!({"text": "Hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
