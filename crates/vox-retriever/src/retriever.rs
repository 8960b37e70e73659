use std::sync::RwLock;

use async_trait::async_trait;

use crate::chunk::{chunk_text, DEFAULT_CHUNK_TOKENS, DEFAULT_OVERLAP_TOKENS};
use crate::embed::{cosine_similarity, embed};
use crate::error::Result;
use crate::types::{KnowledgeChunk, RetrievedChunk};

/// Vector-indexed knowledge base. The embedding model and index internals
/// are an external collaborator by design (see the system's scope notes) —
/// this trait is the seam an implementer swaps a real vector database in at.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Cheap liveness signal for readiness probes; does not exercise search.
    fn is_available(&self) -> bool {
        true
    }
}

/// A real, self-contained implementation: embeds with the hashing-trick
/// embedder and searches a single in-memory collection by brute-force
/// cosine similarity. Fine up to the tens of thousands of chunks this
/// backend is expected to hold; a production deployment swaps this struct
/// out behind the [`Retriever`] trait without touching the orchestrator.
pub struct InMemoryRetriever {
    chunks: RwLock<Vec<KnowledgeChunk>>,
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self { chunks: RwLock::new(Vec::new()) }
    }

    /// Ingest one source document: splits it into an ordered, gap-free
    /// partition of chunks and embeds each one.
    pub fn ingest(&self, source_document: &str, text: &str) {
        self.ingest_with(source_document, text, DEFAULT_CHUNK_TOKENS, DEFAULT_OVERLAP_TOKENS);
    }

    pub fn ingest_with(&self, source_document: &str, text: &str, target_tokens: usize, overlap_tokens: usize) {
        let pieces = chunk_text(text, target_tokens, overlap_tokens);
        let mut store = self.chunks.write().expect("retriever lock poisoned");
        for (ordinal, piece) in pieces.into_iter().enumerate() {
            let vector = embed(&piece);
            store.push(KnowledgeChunk {
                chunk_id: vox_core::types::new_id(),
                source_document: source_document.to_string(),
                ordinal,
                text: piece,
                metadata: serde_json::json!({ "source_document": source_document }),
                vector,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.read().expect("retriever lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn search(
        &self,
        query: &str,
        k: usize,
        score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_vec = embed(query);
        let store = self.chunks.read().expect("retriever lock poisoned");

        let mut scored: Vec<RetrievedChunk> = store
            .iter()
            .map(|chunk| RetrievedChunk {
                text: chunk.text.clone(),
                score: cosine_similarity(&query_vec, &chunk.vector),
                metadata: chunk.metadata.clone(),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(threshold) = score_threshold {
            scored.retain(|c| c.score >= threshold);
        }

        scored.truncate(k);
        Ok(scored)
    }
}

/// Always-failing retriever, useful for exercising the orchestrator's
/// `RetrieverUnavailable` degradation path in tests.
pub struct UnavailableRetriever;

#[async_trait]
impl Retriever for UnavailableRetriever {
    async fn search(
        &self,
        _query: &str,
        _k: usize,
        _score_threshold: Option<f32>,
    ) -> Result<Vec<RetrievedChunk>> {
        Err(crate::error::RetrieverError::Unavailable("index unreachable".to_string()))
    }

    fn is_available(&self) -> bool {
        false
    }
}
