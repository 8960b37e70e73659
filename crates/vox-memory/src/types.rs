use serde::{Deserialize, Serialize};
use vox_core::types::Role;

/// One message as held in a conversation's in-memory window. Deliberately
/// slimmer than the durable row — no message_index, since the window is a
/// sliding tail, not an archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: Role,
    pub content: String,
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub user_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub active_conversations: usize,
    pub total_buffered_messages: usize,
}
