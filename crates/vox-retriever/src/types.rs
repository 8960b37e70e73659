use serde::{Deserialize, Serialize};

/// One ingested unit of source text paired with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub chunk_id: String,
    pub source_document: String,
    pub ordinal: usize,
    pub text: String,
    pub metadata: serde_json::Value,
    pub vector: Vec<f32>,
}

/// One search result: the contract is only "larger score = more similar".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}
