use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{instrument, warn};
use vox_core::types::Role;
use vox_store::types::ConversationMessage;
use vox_store::Store;

use crate::types::{MemoryMessage, MemoryStats};

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

/// One conversation's sliding window. `last_access_ms` lives outside the
/// window mutex so the outer map's eviction scan never has to contend with
/// an in-flight append on some other conversation.
struct ConversationEntry {
    window: Mutex<VecDeque<MemoryMessage>>,
    last_access_ms: AtomicU64,
}

/// Sliding per-conversation history on top of [`Store`]. Reads prefer the
/// in-memory window; writes go to both. The outer map is protected by a
/// short-lived lock used only to create or evict whole conversation entries;
/// all ring mutations happen under the per-conversation entry's own lock.
pub struct ConversationMemory {
    store: Arc<Store>,
    window_size: usize,
    max_conversations: usize,
    conversations: Mutex<HashMap<String, Arc<ConversationEntry>>>,
}

impl ConversationMemory {
    pub fn new(store: Arc<Store>, window_size: usize, max_conversations: usize) -> Self {
        Self { store, window_size, max_conversations, conversations: Mutex::new(HashMap::new()) }
    }

    fn get_or_create(&self, conversation_id: &str) -> Arc<ConversationEntry> {
        let mut outer = self.conversations.lock().expect("memory outer mutex poisoned");
        if let Some(entry) = outer.get(conversation_id) {
            return entry.clone();
        }
        if outer.len() >= self.max_conversations {
            if let Some(victim) = outer
                .iter()
                .min_by_key(|(_, e)| e.last_access_ms.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone())
            {
                outer.remove(&victim);
            }
        }
        let entry = Arc::new(ConversationEntry {
            window: Mutex::new(VecDeque::with_capacity(self.window_size)),
            last_access_ms: AtomicU64::new(now_ms()),
        });
        outer.insert(conversation_id.to_string(), entry.clone());
        entry
    }

    /// Append to the in-memory ring immediately, then fire off a durable
    /// write to Store. A failed Store write is logged and otherwise
    /// swallowed — the in-memory copy is authoritative for the rest of the
    /// process's lifetime even if durability lagged behind for this turn.
    #[instrument(skip(self, content), fields(conversation_id))]
    pub async fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        tokens_input: u32,
        tokens_output: u32,
        user_id: Option<&str>,
    ) {
        let entry = self.get_or_create(conversation_id);
        entry.last_access_ms.store(now_ms(), Ordering::Relaxed);

        let msg = MemoryMessage {
            role,
            content: content.to_string(),
            tokens_input,
            tokens_output,
            user_id: user_id.map(str::to_string),
            created_at: vox_core::types::now_iso8601(),
        };
        {
            let mut window = entry.window.lock().expect("conversation window mutex poisoned");
            window.push_back(msg);
            while window.len() > self.window_size {
                window.pop_front();
            }
        }

        let store = self.store.clone();
        let conversation_id = conversation_id.to_string();
        let content = content.to_string();
        let user_id = user_id.map(str::to_string);
        tokio::spawn(async move {
            if let Err(e) = store
                .append_message(&conversation_id, role, &content, tokens_input, tokens_output, user_id.as_deref())
                .await
            {
                warn!(conversation_id, error = %e, "store append failed, in-memory copy retained");
            }
        });
    }

    /// Return the in-memory window if present; otherwise repopulate it from
    /// Store with up to `window_size` most recent messages.
    #[instrument(skip(self))]
    pub fn history(&self, conversation_id: &str, limit: Option<usize>) -> Vec<MemoryMessage> {
        let effective_limit = limit.unwrap_or(self.window_size);
        let entry = {
            let outer = self.conversations.lock().expect("memory outer mutex poisoned");
            outer.get(conversation_id).cloned()
        };

        if let Some(entry) = entry {
            entry.last_access_ms.store(now_ms(), Ordering::Relaxed);
            let window = entry.window.lock().expect("conversation window mutex poisoned");
            return window.iter().rev().take(effective_limit).rev().cloned().collect();
        }

        // Not resident: repopulate from Store (degrade to empty on failure).
        let loaded = self.store.load_conversation(conversation_id, self.window_size).unwrap_or_default();
        let messages: Vec<MemoryMessage> = loaded.iter().map(stored_to_memory).collect();

        let entry = self.get_or_create(conversation_id);
        {
            let mut window = entry.window.lock().expect("conversation window mutex poisoned");
            window.extend(messages.iter().cloned());
        }

        messages.into_iter().rev().take(effective_limit).rev().collect()
    }

    /// Role-tagged transcript suitable for prompt injection, oldest first.
    pub fn format_context(&self, conversation_id: &str) -> String {
        let history = self.history(conversation_id, None);
        let mut out = String::new();
        for msg in &history {
            let label = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            out.push_str(label);
            out.push_str(": ");
            out.push_str(&msg.content);
            out.push('\n');
        }
        out
    }

    pub fn stats(&self) -> MemoryStats {
        let outer = self.conversations.lock().expect("memory outer mutex poisoned");
        let total: usize = outer
            .values()
            .map(|e| e.window.lock().expect("conversation window mutex poisoned").len())
            .sum();
        MemoryStats { active_conversations: outer.len(), total_buffered_messages: total }
    }
}

fn stored_to_memory(m: &ConversationMessage) -> MemoryMessage {
    MemoryMessage {
        role: m.role,
        content: m.content.clone(),
        tokens_input: m.tokens_input,
        tokens_output: m.tokens_output,
        user_id: m.user_id.clone(),
        created_at: m.created_at.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory(window: usize, max_conv: usize) -> ConversationMemory {
        let store = Arc::new(Store::open_in_memory().unwrap());
        ConversationMemory::new(store, window, max_conv)
    }

    #[tokio::test]
    async fn window_never_exceeds_n_messages() {
        let mem = memory(3, 10);
        for i in 0..10 {
            mem.append("c1", Role::User, &format!("msg{i}"), 0, 0, None).await;
        }
        let history = mem.history("c1", None);
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().content, "msg9");
    }

    #[tokio::test]
    async fn conversations_capped_at_m_evicts_lru() {
        let mem = memory(10, 2);
        mem.append("a", Role::User, "hi", 0, 0, None).await;
        mem.append("b", Role::User, "hi", 0, 0, None).await;
        mem.append("c", Role::User, "hi", 0, 0, None).await;
        let outer = mem.conversations.lock().unwrap();
        assert_eq!(outer.len(), 2);
        assert!(!outer.contains_key("a"));
    }

    #[tokio::test]
    async fn format_context_is_role_tagged_oldest_first() {
        let mem = memory(10, 10);
        mem.append("c1", Role::User, "hi", 0, 0, None).await;
        mem.append("c1", Role::Assistant, "hello", 0, 0, None).await;
        let ctx = mem.format_context("c1");
        assert_eq!(ctx, "User: hi\nAssistant: hello\n");
    }

    #[tokio::test]
    async fn n_equals_one_keeps_only_latest() {
        let mem = memory(1, 10);
        mem.append("c1", Role::User, "first", 0, 0, None).await;
        mem.append("c1", Role::User, "second", 0, 0, None).await;
        let history = mem.history("c1", None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "second");
    }
}
