//! One conversational turn: route, retrieve, rerank, generate, speak.

use std::sync::Arc;

use futures::StreamExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use tourguide_speech::{
    AccumulatorConfig, DeliverySequencer, DeliveryStream, SegmentAccumulator, Synthesizer,
};

use crate::document::Document;
use crate::error::AgentResult;
use crate::llm::{ChatModel, TextStream};
use crate::prompts::{direct_messages, rag_messages};
use crate::reranker::{FINAL_DOCS_COUNT, Reranker, select_top};
use crate::retriever::{DEFAULT_TOP_K, Retriever};
use crate::router::{LlmRouter, QueryRouter, RouteDecision};

/// A visitor's question, optionally pinned to an exhibit document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    /// Document id scanned from an exhibit code.
    #[serde(default)]
    pub doc_id: Option<String>,
}

impl TurnRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            doc_id: None,
        }
    }

    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// The exhibit id, ignoring blank values and the literal `"null"` some clients send.
    pub fn exhibit_id(&self) -> Option<&str> {
        self.doc_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != "null")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Candidates fetched from the retriever.
    pub top_k: usize,
    /// Documents kept for the generation prompt.
    pub final_docs: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            final_docs: FINAL_DOCS_COUNT,
        }
    }
}

/// The tour-guide agent. All collaborators are injected.
pub struct TourGuide {
    model: Arc<dyn ChatModel>,
    router: Arc<dyn QueryRouter>,
    retriever: Arc<dyn Retriever>,
    reranker: Option<Arc<dyn Reranker>>,
    config: WorkflowConfig,
}

impl TourGuide {
    /// Uses `model` both for generation and, through [`LlmRouter`], for routing.
    pub fn new(model: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>) -> Self {
        let router = Arc::new(LlmRouter::new(Arc::clone(&model)));
        Self {
            model,
            router,
            retriever,
            reranker: None,
            config: WorkflowConfig::default(),
        }
    }

    pub fn with_router(mut self, router: Arc<dyn QueryRouter>) -> Self {
        self.router = router;
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Exhibit requests always use retrieval. Router failures fall back to retrieval.
    pub async fn route(&self, request: &TurnRequest) -> RouteDecision {
        if let Some(id) = request.exhibit_id() {
            info!("Doc ID provided: {id}, routing to RAG");
            return RouteDecision::rag("exhibit document requested");
        }
        match self.router.route(&request.query).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!("Query routing failed, using retrieval: {err}");
                RouteDecision::rag("router unavailable")
            }
        }
    }

    /// Fetches the documents that ground the answer.
    pub async fn gather_documents(&self, request: &TurnRequest) -> AgentResult<Vec<Document>> {
        let docs = match request.exhibit_id() {
            Some(id) => match self.retriever.get_by_id(id).await? {
                Some(doc) => vec![doc],
                None => {
                    info!("Document with ID {id} not found.");
                    Vec::new()
                }
            },
            None => {
                let docs = self
                    .retriever
                    .retrieve(&request.query, self.config.top_k)
                    .await?;
                let names: Vec<String> = docs
                    .iter()
                    .enumerate()
                    .map(|(idx, doc)| format!("\t\t{}. {}", idx + 1, doc.name()))
                    .collect();
                info!(
                    "Retrieved {} documents for query: {}: \n{}",
                    docs.len(),
                    request.query,
                    names.join("\n")
                );
                docs
            }
        };

        if docs.is_empty() {
            return Ok(docs);
        }
        if request.exhibit_id().is_some() && docs.len() == 1 {
            info!("Single document retrieved by ID, skipping rerank.");
            return Ok(docs);
        }

        let docs = match &self.reranker {
            Some(reranker) => match reranker.rerank(&request.query, docs.clone()).await {
                Ok(ranked) => ranked,
                Err(err) => {
                    warn!("Rerank failed, keeping retrieval order: {err}");
                    docs
                }
            },
            None => docs,
        };
        Ok(select_top(&request.query, docs, self.config.final_docs))
    }

    /// Streams the answer text for one turn.
    pub async fn answer_stream(&self, request: &TurnRequest) -> AgentResult<TextStream> {
        let decision = self.route(request).await;
        let docs = if decision.need_rag {
            self.gather_documents(request).await?
        } else {
            Vec::new()
        };

        let messages = if docs.is_empty() {
            direct_messages(&request.query)
        } else {
            rag_messages(&request.query, &docs)
        };
        self.model.stream(&messages).await
    }

    /// Collects the full answer text.
    pub async fn answer(&self, request: &TurnRequest) -> AgentResult<String> {
        let mut stream = self.answer_stream(request).await?;
        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            answer.push_str(&chunk?);
        }
        Ok(answer)
    }

    /// Streams the answer as text and synthesized audio events.
    pub async fn speak(
        &self,
        request: &TurnRequest,
        synthesizer: Arc<dyn Synthesizer>,
        config: AccumulatorConfig,
    ) -> AgentResult<DeliveryStream> {
        let (accumulator, audio) = SegmentAccumulator::new(config, synthesizer)?;
        let text = self.answer_stream(request).await?;
        Ok(DeliverySequencer::run(text, accumulator, audio))
    }

    /// Streams the answer as text events only.
    pub async fn narrate(&self, request: &TurnRequest) -> AgentResult<DeliveryStream> {
        let text = self.answer_stream(request).await?;
        Ok(DeliverySequencer::text_only(text))
    }
}
