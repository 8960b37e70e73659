use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;

/// Rough token estimator: one token per four characters. Good enough for
/// budgeting decisions; swap for a real BPE tokenizer if billing accuracy
/// ever matters more than turnaround time.
pub fn count(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}

#[derive(Default)]
struct Counters {
    input: AtomicU64,
    output: AtomicU64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TokenSnapshot {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Per-conversation and global running token totals. Counters live in
/// atomics inside a concurrent map, the same lock-free-counter idiom used
/// for provider health tracking, rather than behind a single mutex.
pub struct TokenLedger {
    per_conversation: DashMap<String, Counters>,
    global: Counters,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self { per_conversation: DashMap::new(), global: Counters::default() }
    }

    pub fn record(&self, conversation_id: &str, input_tokens: u32, output_tokens: u32) {
        let entry = self.per_conversation.entry(conversation_id.to_string()).or_default();
        entry.input.fetch_add(input_tokens as u64, Ordering::Relaxed);
        entry.output.fetch_add(output_tokens as u64, Ordering::Relaxed);
        self.global.input.fetch_add(input_tokens as u64, Ordering::Relaxed);
        self.global.output.fetch_add(output_tokens as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, conversation_id: &str) -> TokenSnapshot {
        match self.per_conversation.get(conversation_id) {
            Some(c) => to_snapshot(&c),
            None => TokenSnapshot::default(),
        }
    }

    pub fn global_snapshot(&self) -> TokenSnapshot {
        to_snapshot(&self.global)
    }

    /// Fold a conversation's counters into the returned snapshot and drop
    /// them from the live map. Callers pair this with a Store write so a
    /// periodic (or shutdown) flush bounds the map's growth.
    pub fn take(&self, conversation_id: &str) -> TokenSnapshot {
        match self.per_conversation.remove(conversation_id) {
            Some((_, c)) => to_snapshot(&c),
            None => TokenSnapshot::default(),
        }
    }

    /// Drain every conversation's counters at once. Used by the periodic
    /// flush task: each entry removed here is about to be written to
    /// `Store`, so nothing is lost, and the map doesn't grow without bound
    /// across the life of the process.
    pub fn drain_all(&self) -> Vec<(String, TokenSnapshot)> {
        let keys: Vec<String> = self.per_conversation.iter().map(|e| e.key().clone()).collect();
        keys.into_iter().map(|k| { let snap = self.take(&k); (k, snap) }).collect()
    }
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn to_snapshot(c: &Counters) -> TokenSnapshot {
    let input_tokens = c.input.load(Ordering::Relaxed);
    let output_tokens = c.output.load(Ordering::Relaxed);
    TokenSnapshot { input_tokens, output_tokens, total_tokens: input_tokens + output_tokens }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_approximates_one_token_per_four_chars() {
        assert_eq!(count("abcd"), 1);
        assert_eq!(count("abcdefgh"), 2);
        assert_eq!(count(""), 0);
    }

    #[test]
    fn record_accumulates_per_conversation_and_globally() {
        let ledger = TokenLedger::new();
        ledger.record("c1", 10, 5);
        ledger.record("c1", 3, 2);
        ledger.record("c2", 1, 1);

        let c1 = ledger.snapshot("c1");
        assert_eq!(c1.input_tokens, 13);
        assert_eq!(c1.output_tokens, 7);
        assert_eq!(c1.total_tokens, 20);

        let global = ledger.global_snapshot();
        assert_eq!(global.total_tokens, 22);
    }

    #[test]
    fn take_removes_the_conversation_entry() {
        let ledger = TokenLedger::new();
        ledger.record("c1", 10, 10);
        let snap = ledger.take("c1");
        assert_eq!(snap.total_tokens, 20);
        assert_eq!(ledger.snapshot("c1").total_tokens, 0);
    }

    #[test]
    fn unknown_conversation_snapshots_to_zero() {
        let ledger = TokenLedger::new();
        assert_eq!(ledger.snapshot("nope").total_tokens, 0);
    }

    #[test]
    fn drain_all_empties_every_conversation_and_returns_their_totals() {
        let ledger = TokenLedger::new();
        ledger.record("c1", 10, 5);
        ledger.record("c2", 1, 1);

        let mut drained = ledger.drain_all();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, "c1");
        assert_eq!(drained[0].1.total_tokens, 15);
        assert_eq!(drained[1].0, "c2");
        assert_eq!(drained[1].1.total_tokens, 2);

        assert_eq!(ledger.snapshot("c1").total_tokens, 0);
        assert!(ledger.drain_all().is_empty());
    }
}
