use sha2::{Digest, Sha256};

/// Lowercase, collapse whitespace, trim — the normalization the orchestrator
/// applies before hashing so trivially-different phrasing of the same
/// question still hits the cache.
pub fn normalize(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

pub fn short_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Combines the normalized message with a short hash of the conversation's
/// current context so the same question asked fresh and the same question
/// asked mid-conversation land in different cache slots.
pub fn compute(user_message: &str, context: &str) -> String {
    let normalized = normalize(user_message);
    let ctx_hash = short_hash(context);
    short_hash(&format!("{normalized}|{ctx_hash}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_whitespace() {
        assert_eq!(normalize("  Hello   World  "), "hello world");
    }

    #[test]
    fn same_message_and_context_yield_same_fingerprint() {
        assert_eq!(compute("Hello there", "ctx"), compute("hello   there", "ctx"));
    }

    #[test]
    fn different_context_yields_different_fingerprint() {
        assert_ne!(compute("hi", "ctx-a"), compute("hi", "ctx-b"));
    }
}
