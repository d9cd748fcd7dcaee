//! # Tourguide Agent
//!
//! Answers visitor questions for a museum tour guide. A turn is routed
//! (knowledge base or direct answer), grounded with retrieved and re-ranked
//! documents when needed, and streamed back from a chat model. The answer
//! stream can be handed to [`tourguide_speech`] to produce audio alongside
//! the text.
//!
//! Every external service sits behind a trait so it can be swapped or mocked:
//! [`ChatModel`], [`QueryRouter`], [`Retriever`] and [`Reranker`].

pub mod document;
pub mod error;
mod handle;
pub mod llm;
pub mod prompts;
mod reranker;
mod retriever;
mod router;
mod workflow;

pub use document::{Document, format_docs, load_documents_dir};
pub use error::{AgentError, AgentResult};
pub use handle::{LazyHandle, LazyRetriever};
pub use llm::{AuthScheme, ChatMessage, ChatModel, ChatRole, LlmConfig, OpenAiChatModel, TextStream};
pub use reranker::{FINAL_DOCS_COUNT, HttpReranker, RerankConfig, Reranker};
pub use retriever::{Bm25Retriever, DEFAULT_TOP_K, ExhibitTokenStream, ExhibitTokenizer, Retriever, tokenize};
pub use router::{LlmRouter, QueryRouter, RouteDecision};
pub use workflow::{TourGuide, TurnRequest, WorkflowConfig};
