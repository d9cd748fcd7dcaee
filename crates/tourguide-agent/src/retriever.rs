//! Document retrieval.

use async_trait::async_trait;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use tantivy::{
    Index, IndexReader, IndexWriter, TantivyDocument, Term,
    collector::TopDocs,
    query::{BooleanQuery, Occur, Query, TermQuery},
    schema::{Field, IndexRecordOption, OwnedValue, STORED, Schema, TextFieldIndexing, TextOptions},
    tokenizer::{
        Language, LowerCaser, RemoveLongFilter, StopWordFilter, TextAnalyzer, Token, TokenStream,
        Tokenizer,
    },
};
use tourguide_speech::sanitize;

use crate::document::Document;
use crate::error::AgentResult;

/// Number of candidates fetched before re-ranking.
pub const DEFAULT_TOP_K: usize = 10;

const TOKENIZER_NAME: &str = "exhibit";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `top_k` documents, best first.
    async fn retrieve(&self, query: &str, top_k: usize) -> AgentResult<Vec<Document>>;

    /// Looks up a single document by id, e.g. from a scanned exhibit code.
    async fn get_by_id(&self, id: &str) -> AgentResult<Option<Document>>;
}

static TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\p{Han}+|[\p{Alphabetic}\p{Nd}&&[^\p{Han}]]+").expect("term pattern must compile")
});

static HAN_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\p{Han}").expect("Han pattern must compile"));

/// Splits Latin text into words and Han text into bigrams.
///
/// Han runs of one or two characters are kept whole; longer runs become
/// overlapping bigrams, since Chinese is written without spaces.
#[derive(Clone, Default)]
pub struct ExhibitTokenizer;

pub struct ExhibitTokenStream {
    tokens: std::vec::IntoIter<Token>,
    token: Token,
}

impl Tokenizer for ExhibitTokenizer {
    type TokenStream<'a> = ExhibitTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> ExhibitTokenStream {
        let mut tokens = Vec::new();
        for found in TERM.find_iter(text) {
            let run = found.as_str();
            let is_han = HAN_RUN.is_match(run);
            let chars: Vec<(usize, char)> = run.char_indices().collect();
            if !is_han || chars.len() <= 2 {
                tokens.push(Token {
                    offset_from: found.start(),
                    offset_to: found.end(),
                    position: tokens.len(),
                    text: run.to_string(),
                    ..Token::default()
                });
                continue;
            }
            for pair in chars.windows(2) {
                let (start, first) = pair[0];
                let (second_at, second) = pair[1];
                tokens.push(Token {
                    offset_from: found.start() + start,
                    offset_to: found.start() + second_at + second.len_utf8(),
                    position: tokens.len(),
                    text: [first, second].iter().collect(),
                    ..Token::default()
                });
            }
        }
        ExhibitTokenStream {
            tokens: tokens.into_iter(),
            token: Token::default(),
        }
    }
}

impl TokenStream for ExhibitTokenStream {
    fn advance(&mut self) -> bool {
        match self.tokens.next() {
            Some(token) => {
                self.token = token;
                true
            }
            None => false,
        }
    }

    fn token(&self) -> &Token {
        &self.token
    }

    fn token_mut(&mut self) -> &mut Token {
        &mut self.token
    }
}

/// Analyzer used both for indexing and for queries.
fn build_analyzer() -> TextAnalyzer {
    let stop_words = StopWordFilter::new(Language::English)
        .unwrap_or_else(|| StopWordFilter::remove(Vec::<String>::new()));
    TextAnalyzer::builder(ExhibitTokenizer)
        .filter(RemoveLongFilter::limit(100))
        .filter(LowerCaser)
        .filter(stop_words)
        .build()
}

/// Splits text into index terms.
///
/// Image markup is removed, words are lowercased and English stop words are
/// dropped. See [`ExhibitTokenizer`] for the Han rule.
pub fn tokenize(text: &str) -> Vec<String> {
    let text = sanitize(text);
    let mut analyzer = build_analyzer();
    let mut stream = analyzer.token_stream(&text);
    let mut terms = Vec::new();
    while stream.advance() {
        terms.push(stream.token().text.clone());
    }
    terms
}

/// In-memory BM25 index over the knowledge base.
///
/// Scoring is tantivy's BM25. Documents are kept alongside the index so that
/// hits come back with their metadata intact.
pub struct Bm25Retriever {
    documents: Vec<Document>,
    reader: IndexReader,
    text_field: Field,
    ordinal_field: Field,
}

impl Bm25Retriever {
    pub fn new(documents: Vec<Document>) -> AgentResult<Self> {
        let mut schema_builder = Schema::builder();
        let text_options = TextOptions::default().set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(TOKENIZER_NAME)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        );
        let text_field = schema_builder.add_text_field("text", text_options);
        let ordinal_field = schema_builder.add_u64_field("ordinal", STORED);
        let index = Index::create_in_ram(schema_builder.build());
        index.tokenizers().register(TOKENIZER_NAME, build_analyzer());

        let mut writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BYTES)?;
        for (ordinal, doc) in documents.iter().enumerate() {
            let mut indexed = TantivyDocument::default();
            indexed.add_text(text_field, sanitize(&doc.page_content));
            indexed.add_u64(ordinal_field, ordinal as u64);
            writer.add_document(indexed)?;
        }
        writer.commit()?;
        let reader = index.reader()?;
        info!("Indexed {} documents for BM25", documents.len());

        Ok(Self {
            documents,
            reader,
            text_field,
            ordinal_field,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Scores matching documents, returning `(position, score)` best first.
    pub fn rank(&self, query: &str, limit: usize) -> AgentResult<Vec<(usize, f32)>> {
        let mut terms = tokenize(query);
        terms.sort();
        terms.dedup();
        if terms.is_empty() || limit == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }

        let clauses: Vec<(Occur, Box<dyn Query>)> = terms
            .iter()
            .map(|term| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.text_field, term),
                    IndexRecordOption::WithFreqs,
                ));
                (Occur::Should, query)
            })
            .collect();
        let query = BooleanQuery::new(clauses);

        let searcher = self.reader.searcher();
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit))?;

        let mut ranked = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            if let Some(OwnedValue::U64(ordinal)) = doc.get_first(self.ordinal_field) {
                ranked.push((*ordinal as usize, score));
            }
        }
        Ok(ranked)
    }
}

#[async_trait]
impl Retriever for Bm25Retriever {
    async fn retrieve(&self, query: &str, top_k: usize) -> AgentResult<Vec<Document>> {
        let ranked = self.rank(query, top_k)?;
        debug!("BM25 matched {} documents", ranked.len());
        Ok(ranked
            .into_iter()
            .filter_map(|(position, _)| self.documents.get(position).cloned())
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> AgentResult<Option<Document>> {
        Ok(self.documents.iter().find(|doc| doc.id == id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Bm25Retriever {
        Bm25Retriever::new(vec![
            Document::new("vase", "A blue and white porcelain vase from the Ming dynasty."),
            Document::new("bell", "A bronze bell cast during the Zhou dynasty."),
            Document::new("scroll", "这幅山水画卷描绘了江南的风景。"),
            Document::new("map", "A trade map showing porcelain routes to Europe."),
        ])
        .unwrap()
    }

    #[test]
    fn tokenizer_drops_stop_words_and_images() {
        let tokens = tokenize("Is the ![pic](http://x/y.png) Ming vase on display?");
        assert_eq!(tokens, vec!["ming", "vase", "display"]);
    }

    #[test]
    fn tokenizer_splits_han_into_bigrams() {
        assert_eq!(tokenize("山水画"), vec!["山水", "水画"]);
        assert_eq!(tokenize("瓷器"), vec!["瓷器"]);
        assert_eq!(tokenize("Song 青花瓷 vase"), vec!["song", "青花", "花瓷", "vase"]);
    }

    #[test]
    fn token_offsets_cover_bigrams() {
        let mut tokenizer = ExhibitTokenizer;
        let mut stream = tokenizer.token_stream("a 山水画");
        let mut spans = Vec::new();
        while stream.advance() {
            let token = stream.token();
            spans.push((token.text.clone(), token.offset_from, token.offset_to, token.position));
        }
        assert_eq!(
            spans,
            vec![
                ("a".to_string(), 0, 1, 0),
                ("山水".to_string(), 2, 8, 1),
                ("水画".to_string(), 5, 11, 2),
            ]
        );
    }

    #[tokio::test]
    async fn hits_keep_metadata() {
        let retriever = Bm25Retriever::new(vec![
            Document::new("bell", "A bronze bell.").with_metadata("name", "Zhou bell"),
        ])
        .unwrap();
        let docs = retriever.retrieve("bronze", 5).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].name(), "Zhou bell");
    }

    #[tokio::test]
    async fn stop_word_only_query_matches_nothing() {
        assert!(corpus().retrieve("the and of", 5).await.unwrap().is_empty());
        assert!(corpus().retrieve("vase", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ranks_best_match_first() {
        let retriever = corpus();
        let docs = retriever.retrieve("Ming porcelain vase", 10).await.unwrap();
        assert_eq!(docs[0].id, "vase");
        assert!(docs.iter().any(|d| d.id == "map"));
        assert!(docs.iter().all(|d| d.id != "bell"));
    }

    #[tokio::test]
    async fn matches_chinese_queries() {
        let docs = corpus().retrieve("山水画", 3).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "scroll");
    }

    #[tokio::test]
    async fn respects_top_k() {
        let docs = corpus().retrieve("dynasty", 1).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn fetches_by_id() {
        let retriever = corpus();
        assert_eq!(
            retriever.get_by_id("bell").await.unwrap().map(|d| d.id),
            Some("bell".to_string())
        );
        assert!(retriever.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let retriever = Bm25Retriever::new(Vec::new()).unwrap();
        assert!(retriever.is_empty());
        assert!(retriever.retrieve("vase", 5).await.unwrap().is_empty());
    }
}
