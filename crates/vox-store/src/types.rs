use serde::{Deserialize, Serialize};
use vox_core::types::{Role, Severity};

/// One durable conversation turn row. Primary key is
/// `(conversation_id, message_index)`; indices are dense and monotonically
/// increasing per conversation and rows are never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub conversation_id: String,
    pub message_index: i64,
    pub role: Role,
    pub content: String,
    pub created_at: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub user_id: Option<String>,
}

/// An API key record as stored. `hashed_secret` is the only form of the
/// secret that ever reaches disk; the plaintext is shown to the caller once,
/// at issuance, and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: String,
    pub hashed_secret: String,
    pub owner: String,
    pub created_at: String,
    pub expires_at: Option<String>,
    pub revoked: bool,
    pub limit_per_minute: u32,
    pub limit_per_day: u32,
    pub counters_json: String,
}

impl ApiKeyRecord {
    pub fn is_usable(&self, now: &str) -> bool {
        if self.revoked {
            return false;
        }
        match &self.expires_at {
            Some(exp) => exp.as_str() > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: String,
    pub actor: String,
    pub event_kind: String,
    pub severity: Severity,
    pub payload_digest: String,
    pub latency_ms: Option<u64>,
}
