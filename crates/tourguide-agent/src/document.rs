//! Knowledge-base documents and their on-disk format.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgentError, AgentResult};

/// Metadata keys that are too large or not useful for grounding answers.
const DROPPED_METADATA_KEYS: [&str; 2] = ["description", "images"];

/// Metadata key holding the score assigned by a [`Reranker`](crate::Reranker).
pub const RERANK_SCORE_KEY: &str = "rerank_score";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, page_content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn rerank_score(&self) -> Option<f64> {
        self.metadata.get(RERANK_SCORE_KEY).and_then(Value::as_f64)
    }

    /// Display name used in logs.
    pub fn name(&self) -> &str {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

/// Renders documents for the generation prompt as `DOC1: ...` blocks.
pub fn format_docs(docs: &[Document]) -> String {
    docs.iter()
        .enumerate()
        .map(|(idx, doc)| format!("DOC{}: {}\n\n", idx + 1, doc.page_content))
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct DocumentFile {
    documents: OneOrMany<String>,
    ids: OneOrMany<String>,
    #[serde(default, alias = "metadatas")]
    metadata: Option<OneOrMany<Map<String, Value>>>,
}

/// Parses one knowledge-base file: `{documents, ids, metadata}` where each
/// field is either a single value or a list of equal length.
pub fn parse_document_file(path: &str, contents: &str) -> AgentResult<Vec<Document>> {
    let file: DocumentFile =
        serde_json::from_str(contents).map_err(|err| AgentError::DocumentFormat {
            path: path.to_string(),
            reason: err.to_string(),
        })?;

    let texts = file.documents.into_vec();
    let ids = file.ids.into_vec();
    if texts.len() != ids.len() {
        return Err(AgentError::DocumentFormat {
            path: path.to_string(),
            reason: format!("{} documents but {} ids", texts.len(), ids.len()),
        });
    }
    let mut metadata = file.metadata.map(OneOrMany::into_vec).unwrap_or_default();
    metadata.resize_with(texts.len(), Map::new);

    Ok(ids
        .into_iter()
        .zip(texts)
        .zip(metadata)
        .map(|((id, page_content), mut metadata)| {
            for key in DROPPED_METADATA_KEYS {
                metadata.remove(key);
            }
            Document {
                id,
                page_content,
                metadata,
            }
        })
        .collect())
}

/// Loads every `*.json` file in `dir`. Files that fail to parse are skipped.
pub fn load_documents_dir(dir: impl AsRef<Path>) -> AgentResult<Vec<Document>> {
    let dir = dir.as_ref();
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        let display = path.display().to_string();
        let contents = fs::read_to_string(&path)?;
        match parse_document_file(&display, &contents) {
            Ok(mut parsed) => documents.append(&mut parsed),
            Err(err) => warn!("Skipping {display}: {err}"),
        }
    }
    info!("Loaded {} documents from {}", documents.len(), dir.display());
    Ok(documents)
}
