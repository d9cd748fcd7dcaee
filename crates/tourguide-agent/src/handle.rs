//! Lazily constructed service handles.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::OnceCell;

use crate::document::{Document, load_documents_dir};
use crate::error::{AgentError, AgentResult};
use crate::retriever::{Bm25Retriever, Retriever};

type Init<T> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = AgentResult<T>> + Send>> + Send + Sync>;

/// A handle whose value is built on first use.
///
/// Concurrent callers wait on the same initialization. A failed attempt
/// leaves the handle empty so the next caller retries.
pub struct LazyHandle<T> {
    name: &'static str,
    cell: OnceCell<Arc<T>>,
    init: Init<T>,
}

impl<T: Send + Sync + 'static> LazyHandle<T> {
    pub fn new<F, Fut>(name: &'static str, init: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<T>> + Send + 'static,
    {
        Self {
            name,
            cell: OnceCell::new(),
            init: Box::new(move || Box::pin(init())),
        }
    }

    /// Returns the value, building it if this is the first call.
    pub async fn get(&self) -> AgentResult<Arc<T>> {
        let value = self
            .cell
            .get_or_try_init(|| async {
                info!("Initializing {}", self.name);
                (self.init)().await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(value))
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

/// BM25 retriever over a documents directory, indexed on first query.
pub struct LazyRetriever {
    handle: LazyHandle<Bm25Retriever>,
}

impl LazyRetriever {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let handle = LazyHandle::new("knowledge base index", move || {
            let dir = dir.clone();
            async move {
                tokio::task::spawn_blocking(move || Bm25Retriever::new(load_documents_dir(&dir)?))
                    .await
                    .map_err(|err| AgentError::Configuration(err.to_string()))?
            }
        });
        Self { handle }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_initialized()
    }
}

#[async_trait]
impl Retriever for LazyRetriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> AgentResult<Vec<Document>> {
        self.handle.get().await?.retrieve(query, top_k).await
    }

    async fn get_by_id(&self, id: &str) -> AgentResult<Option<Document>> {
        self.handle.get().await?.get_by_id(id).await
    }
}
