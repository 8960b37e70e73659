use serde::{Deserialize, Serialize};

use crate::prompt::Persona;

#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub persona: Option<Persona>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Timing {
    pub total_ms: u64,
    pub llm_ms: u64,
    pub rag_ms: Option<u64>,
    pub cache_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TurnMetadata {
    pub cache_hit: bool,
    pub rag_enabled: bool,
    pub rag_results_count: u32,
    pub guard_flagged: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensUsed {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub response: String,
    pub conversation_id: String,
    pub timing: Timing,
    pub metadata: TurnMetadata,
    pub tokens: TokensUsed,
}

/// What lives behind a cache-fingerprint hit: everything needed to reproduce
/// the same transcript and the same metadata a fresh generation would have
/// produced, modulo fresh timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedTurn {
    pub response: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub rag_enabled: bool,
    pub rag_results_count: u32,
}
