use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument, warn};
use vox_cache::BoundedCache;
use vox_core::error::{Result, VoxError};
use vox_core::types::{now_iso8601, Role, Severity};
use vox_guard::GuardPipeline;
use vox_llm::{GenerateRequest, LlmClient, Message as LlmMessage, Role as LlmRole};
use vox_memory::ConversationMemory;
use vox_retriever::Retriever;
use vox_store::types::AuditEntry;
use vox_store::Store;

use crate::fingerprint;
use crate::ledger::{self, TokenLedger};
use crate::prompt::{self, Persona};
use crate::types::{CachedTurn, TokensUsed, TurnMetadata, TurnOptions, TurnResult, Timing};

pub struct OrchestratorConfig {
    pub persona: Persona,
    pub max_tokens: u32,
    pub temperature: f32,
    pub model_name: String,
    pub rag_enabled: bool,
    pub rag_top_k: usize,
    pub rag_score_threshold: Option<f32>,
    pub rag_soft_deadline: Duration,
    pub guard_enabled: bool,
    pub guard_strict: bool,
    pub guard_reconcile_wait: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            persona: Persona::Generic,
            max_tokens: 512,
            temperature: 0.7,
            model_name: "default".to_string(),
            rag_enabled: false,
            rag_top_k: 3,
            rag_score_threshold: None,
            rag_soft_deadline: Duration::from_millis(250),
            guard_enabled: true,
            guard_strict: false,
            guard_reconcile_wait: Duration::from_millis(500),
        }
    }
}

const REFUSAL_TEMPLATE: &str =
    "I can't help with that request as written. Could you rephrase it without the flagged content?";

/// Wires cache, memory, retriever, guard, and LLM client together behind the
/// single `handle_turn` entry point. Every dependency is an explicit handle
/// passed in at construction — no global state to reach for.
pub struct TurnOrchestrator {
    cache: Arc<BoundedCache<CachedTurn>>,
    memory: Arc<ConversationMemory>,
    retriever: Arc<dyn Retriever>,
    guard: Arc<GuardPipeline>,
    llm: Arc<dyn LlmClient>,
    store: Arc<Store>,
    ledger: Arc<TokenLedger>,
    config: OrchestratorConfig,
    /// One async mutex per conversation, held for the full duration of
    /// `handle_turn` so turn N+1 for a conversation cannot start before
    /// turn N has persisted and cached. Slots are created lazily and never
    /// removed; the map only ever holds one entry per conversation that has
    /// taken a turn.
    turn_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl TurnOrchestrator {
    pub fn new(
        cache: Arc<BoundedCache<CachedTurn>>,
        memory: Arc<ConversationMemory>,
        retriever: Arc<dyn Retriever>,
        guard: Arc<GuardPipeline>,
        llm: Arc<dyn LlmClient>,
        store: Arc<Store>,
        ledger: Arc<TokenLedger>,
        config: OrchestratorConfig,
    ) -> Self {
        Self { cache, memory, retriever, guard, llm, store, ledger, config, turn_locks: DashMap::new() }
    }

    fn turn_lock(&self, conversation_id: &str) -> Arc<AsyncMutex<()>> {
        self.turn_locks.entry(conversation_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    #[instrument(skip(self, user_message, options), fields(conversation_id))]
    pub async fn handle_turn(
        &self,
        conversation_id: &str,
        user_message: &str,
        options: TurnOptions,
    ) -> Result<TurnResult> {
        let turn_started = Instant::now();
        let persona = options.persona.unwrap_or(self.config.persona);

        // Holds the per-conversation turn slot for the rest of this call so
        // concurrent turns on the same conversation serialize instead of
        // interleaving their cache/memory/guard effects.
        let lock = self.turn_lock(conversation_id);
        let _turn_guard = lock.lock().await;

        // Step 1: fingerprint.
        let ctx = self.memory.format_context(conversation_id);
        let fp = fingerprint::compute(user_message, &ctx);

        // Step 2: cache lookup. A hit replays the exact same history
        // mutation a miss would have made, so the two paths are
        // indistinguishable from the stored-transcript's point of view.
        let cache_started = Instant::now();
        if let Some(cached) = self.cache.get(&fp) {
            let cache_ms = cache_started.elapsed().as_millis() as u64;
            self.persist_turn(conversation_id, user_message, &cached.response, cached.input_tokens, cached.output_tokens)
                .await;
            self.ledger.record(conversation_id, cached.input_tokens, cached.output_tokens);

            info!(conversation_id, "cache hit");
            return Ok(TurnResult {
                response: cached.response,
                conversation_id: conversation_id.to_string(),
                timing: Timing {
                    total_ms: turn_started.elapsed().as_millis() as u64,
                    llm_ms: 0,
                    rag_ms: None,
                    cache_ms: Some(cache_ms),
                },
                metadata: TurnMetadata {
                    cache_hit: true,
                    rag_enabled: cached.rag_enabled,
                    rag_results_count: cached.rag_results_count,
                    guard_flagged: None,
                },
                tokens: TokensUsed {
                    input_tokens: cached.input_tokens,
                    output_tokens: cached.output_tokens,
                    total_tokens: cached.input_tokens + cached.output_tokens,
                },
            });
        }
        let cache_ms = cache_started.elapsed().as_millis() as u64;

        // Step 4/5: fan out guard + RAG, join RAG with a soft deadline.
        let guard = self.guard.clone();
        let guard_input = user_message.to_string();
        let guard_task = tokio::spawn(async move { guard.check_input(&guard_input).await });

        let rag_started = Instant::now();
        let (rag_context, rag_results_count, rag_degraded) = if self.config.rag_enabled {
            let retriever = self.retriever.clone();
            let query = user_message.to_string();
            let k = self.config.rag_top_k;
            let threshold = self.config.rag_score_threshold;
            let rag_future = async move { retriever.search(&query, k, threshold).await };

            match tokio::time::timeout(self.config.rag_soft_deadline, rag_future).await {
                Ok(Ok(chunks)) => {
                    let count = chunks.len() as u32;
                    let joined = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join("\n\n");
                    (joined, count, false)
                }
                Ok(Err(e)) => {
                    warn!(conversation_id, error = %e, "rag search failed, degrading to empty context");
                    self.audit_retriever_unavailable(conversation_id).await;
                    (String::new(), 0, true)
                }
                Err(_) => {
                    warn!(conversation_id, "rag search exceeded soft deadline, degrading to empty context");
                    self.audit_retriever_unavailable(conversation_id).await;
                    (String::new(), 0, true)
                }
            }
        } else {
            (String::new(), 0, false)
        };
        let rag_ms = rag_started.elapsed().as_millis() as u64;

        // Step 6/7: prompt + LLM.
        let prompt = prompt::build(user_message, Some(&ctx), Some(&rag_context), persona);
        let max_tokens = options.max_tokens.unwrap_or(self.config.max_tokens);
        let temperature = options.temperature.unwrap_or(self.config.temperature);

        let llm_started = Instant::now();
        let generate_req = GenerateRequest {
            model: self.config.model_name.clone(),
            system: prompt,
            messages: vec![LlmMessage { role: LlmRole::User, content: user_message.to_string() }],
            max_tokens,
            temperature,
        };
        let llm_response = self
            .llm
            .generate(&generate_req)
            .await
            .map_err(|e| VoxError::LlmUnavailable(e.to_string()))?;
        let llm_ms = llm_started.elapsed().as_millis() as u64;

        let input_tokens = if llm_response.tokens_in > 0 { llm_response.tokens_in } else { ledger::count(user_message) };
        let output_tokens =
            if llm_response.tokens_out > 0 { llm_response.tokens_out } else { ledger::count(&llm_response.content) };

        // Step 8: persist the user side now; the assistant side is persisted
        // after Step 10 so memory/history never stores a response the guard
        // went on to refuse.
        self.persist_user_message(conversation_id, user_message, input_tokens).await;
        self.ledger.record(conversation_id, input_tokens, output_tokens);

        // Step 9: cache (subject to guard reconciliation's strict-mode veto below).
        let cached = CachedTurn {
            response: llm_response.content.clone(),
            input_tokens,
            output_tokens,
            rag_enabled: self.config.rag_enabled,
            rag_results_count,
        };

        // Step 10: guard reconciliation.
        let mut final_response = llm_response.content;
        let mut guard_flagged = None;
        if self.config.guard_enabled {
            match tokio::time::timeout(self.config.guard_reconcile_wait, guard_task).await {
                Ok(Ok(check)) => {
                    if !check.passed {
                        guard_flagged = Some(true);
                        self.audit_guard_violation(conversation_id, &check).await;
                        if self.config.guard_strict && check.max_severity() == Some(Severity::Critical) {
                            final_response = REFUSAL_TEMPLATE.to_string();
                        } else {
                            self.cache.put(fp, cached);
                        }
                    } else {
                        guard_flagged = Some(false);
                        self.cache.put(fp, cached);
                    }
                }
                Ok(Err(_)) => {
                    warn!(conversation_id, "guard task panicked, treating as flagged");
                    guard_flagged = Some(true);
                    // A panicked check never resolved a severity, so strict
                    // mode can't tell critical from benign here — fail closed
                    // rather than let an unvetted response through.
                    if self.config.guard_strict {
                        final_response = REFUSAL_TEMPLATE.to_string();
                    } else {
                        self.cache.put(fp, cached);
                    }
                }
                Err(_) => {
                    warn!(conversation_id, "guard reconciliation exceeded wait, response already returned");
                    self.cache.put(fp, cached);
                }
            }
        } else {
            self.cache.put(fp, cached);
        }

        self.persist_assistant_message(conversation_id, &final_response, output_tokens).await;

        Ok(TurnResult {
            response: final_response,
            conversation_id: conversation_id.to_string(),
            timing: Timing {
                total_ms: turn_started.elapsed().as_millis() as u64,
                llm_ms,
                rag_ms: if self.config.rag_enabled { Some(rag_ms) } else { None },
                cache_ms: Some(cache_ms),
            },
            metadata: TurnMetadata {
                cache_hit: false,
                rag_enabled: self.config.rag_enabled,
                rag_results_count: if rag_degraded { 0 } else { rag_results_count },
                guard_flagged,
            },
            tokens: TokensUsed { input_tokens, output_tokens, total_tokens: input_tokens + output_tokens },
        })
    }

    async fn persist_turn(&self, conversation_id: &str, user_message: &str, response: &str, input_tokens: u32, output_tokens: u32) {
        self.persist_user_message(conversation_id, user_message, input_tokens).await;
        self.persist_assistant_message(conversation_id, response, output_tokens).await;
    }

    async fn persist_user_message(&self, conversation_id: &str, user_message: &str, input_tokens: u32) {
        self.memory.append(conversation_id, Role::User, user_message, input_tokens, 0, None).await;
    }

    async fn persist_assistant_message(&self, conversation_id: &str, response: &str, output_tokens: u32) {
        self.memory.append(conversation_id, Role::Assistant, response, 0, output_tokens, None).await;
    }

    async fn audit_guard_violation(&self, conversation_id: &str, check: &vox_guard::CheckResult) {
        let entry = AuditEntry {
            id: vox_core::types::new_id(),
            timestamp: now_iso8601(),
            actor: conversation_id.to_string(),
            event_kind: "guard_violation".to_string(),
            severity: check.max_severity().unwrap_or(Severity::Warning),
            payload_digest: fingerprint::short_hash(conversation_id),
            latency_ms: None,
        };
        if let Err(e) = self.store.append_audit(&entry) {
            warn!(conversation_id, error = %e, "failed to persist guard audit entry");
        }
    }

    async fn audit_retriever_unavailable(&self, conversation_id: &str) {
        let entry = AuditEntry {
            id: vox_core::types::new_id(),
            timestamp: now_iso8601(),
            actor: conversation_id.to_string(),
            event_kind: "retriever_unavailable".to_string(),
            severity: Severity::Warning,
            payload_digest: fingerprint::short_hash(conversation_id),
            latency_ms: None,
        };
        if let Err(e) = self.store.append_audit(&entry) {
            warn!(conversation_id, error = %e, "failed to persist retriever_unavailable audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vox_llm::{EchoLlmClient, FailingLlmClient};
    use vox_retriever::InMemoryRetriever;

    fn build_orchestrator(config: OrchestratorConfig) -> TurnOrchestrator {
        let store = Arc::new(Store::open_in_memory().unwrap());
        TurnOrchestrator::new(
            Arc::new(BoundedCache::new(64, Duration::from_secs(60))),
            Arc::new(ConversationMemory::new(store.clone(), 20, 100)),
            Arc::new(InMemoryRetriever::new()),
            Arc::new(GuardPipeline::default()),
            Arc::new(EchoLlmClient::default()),
            store,
            Arc::new(TokenLedger::new()),
            config,
        )
    }

    #[tokio::test]
    async fn first_turn_is_a_cache_miss_and_second_identical_turn_hits() {
        let orchestrator = build_orchestrator(OrchestratorConfig::default());
        let first = orchestrator.handle_turn("c1", "what's the weather", TurnOptions::default()).await.unwrap();
        assert!(!first.metadata.cache_hit);

        let second = orchestrator.handle_turn("c1", "what's the weather", TurnOptions::default()).await.unwrap();
        assert!(second.metadata.cache_hit);
        assert_eq!(first.response, second.response);
    }

    #[tokio::test]
    async fn cache_hit_still_appends_to_conversation_history() {
        let orchestrator = build_orchestrator(OrchestratorConfig::default());
        orchestrator.handle_turn("c2", "hello", TurnOptions::default()).await.unwrap();
        orchestrator.handle_turn("c2", "hello", TurnOptions::default()).await.unwrap();

        let history = orchestrator.memory.history("c2", None);
        assert_eq!(history.len(), 4);
    }

    #[tokio::test]
    async fn llm_failure_surfaces_as_llm_unavailable() {
        let mut config = OrchestratorConfig::default();
        config.rag_enabled = false;
        let store = Arc::new(Store::open_in_memory().unwrap());
        let orchestrator = TurnOrchestrator::new(
            Arc::new(BoundedCache::new(64, Duration::from_secs(60))),
            Arc::new(ConversationMemory::new(store.clone(), 20, 100)),
            Arc::new(InMemoryRetriever::new()),
            Arc::new(GuardPipeline::default()),
            Arc::new(FailingLlmClient::new("down")),
            store,
            Arc::new(TokenLedger::new()),
            config,
        );

        let result = orchestrator.handle_turn("c3", "hello", TurnOptions::default()).await;
        assert!(matches!(result, Err(VoxError::LlmUnavailable(_))));
    }

    #[tokio::test]
    async fn rag_enabled_populates_metadata_from_retriever() {
        let mut config = OrchestratorConfig::default();
        config.rag_enabled = true;
        let store = Arc::new(Store::open_in_memory().unwrap());
        let retriever = Arc::new(InMemoryRetriever::new());
        retriever.ingest("doc1", "the rust programming language is fast and memory safe");
        let orchestrator = TurnOrchestrator::new(
            Arc::new(BoundedCache::new(64, Duration::from_secs(60))),
            Arc::new(ConversationMemory::new(store.clone(), 20, 100)),
            retriever,
            Arc::new(GuardPipeline::default()),
            Arc::new(EchoLlmClient::default()),
            store,
            Arc::new(TokenLedger::new()),
            config,
        );

        let result = orchestrator.handle_turn("c4", "tell me about rust", TurnOptions::default()).await.unwrap();
        assert!(result.metadata.rag_enabled);
        assert!(result.timing.rag_ms.is_some());
    }

    #[tokio::test]
    async fn strict_mode_refuses_critical_guard_violations() {
        let mut config = OrchestratorConfig::default();
        config.guard_strict = true;
        let orchestrator = build_orchestrator(config);

        let result = orchestrator
            .handle_turn("c5", "my ssn is 123-45-6789, what should I do?", TurnOptions::default())
            .await
            .unwrap();
        assert_eq!(result.response, REFUSAL_TEMPLATE);
        assert_eq!(result.metadata.guard_flagged, Some(true));
    }

    #[tokio::test]
    async fn strict_mode_refusal_is_what_gets_persisted_to_history() {
        let mut config = OrchestratorConfig::default();
        config.guard_strict = true;
        let orchestrator = build_orchestrator(config);

        orchestrator
            .handle_turn("c5b", "my ssn is 123-45-6789, what should I do?", TurnOptions::default())
            .await
            .unwrap();

        let history = orchestrator.memory.history("c5b", None);
        let assistant_message =
            history.iter().find(|m| m.role == Role::Assistant).expect("assistant turn persisted");
        assert_eq!(assistant_message.content, REFUSAL_TEMPLATE);
        assert!(!assistant_message.content.contains("123-45-6789"));
    }

    #[tokio::test]
    async fn rag_timeout_writes_retriever_unavailable_audit_entry() {
        use vox_retriever::UnavailableRetriever;

        let mut config = OrchestratorConfig::default();
        config.rag_enabled = true;
        let store = Arc::new(Store::open_in_memory().unwrap());
        let orchestrator = TurnOrchestrator::new(
            Arc::new(BoundedCache::new(64, Duration::from_secs(60))),
            Arc::new(ConversationMemory::new(store.clone(), 20, 100)),
            Arc::new(UnavailableRetriever),
            Arc::new(GuardPipeline::default()),
            Arc::new(EchoLlmClient::default()),
            store.clone(),
            Arc::new(TokenLedger::new()),
            config,
        );

        orchestrator.handle_turn("c6", "tell me about rust", TurnOptions::default()).await.unwrap();

        let entries = store.list_audit_entries("c6").unwrap();
        assert!(entries.iter().any(|e| e.event_kind == "retriever_unavailable"));
    }

    #[tokio::test]
    async fn concurrent_turns_on_same_conversation_do_not_interleave() {
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use vox_llm::Result as LlmResult;

        #[derive(Default)]
        struct ConcurrencyTrackingLlmClient {
            in_flight: AtomicUsize,
            max_seen: AtomicUsize,
        }

        #[async_trait]
        impl LlmClient for ConcurrencyTrackingLlmClient {
            fn name(&self) -> &str {
                "tracker"
            }

            async fn generate(&self, req: &GenerateRequest) -> LlmResult<vox_llm::GenerateResponse> {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(vox_llm::GenerateResponse {
                    content: "ok".to_string(),
                    model: req.model.clone(),
                    tokens_in: 1,
                    tokens_out: 1,
                    stop_reason: "stop".to_string(),
                })
            }
        }

        let store = Arc::new(Store::open_in_memory().unwrap());
        let tracker = Arc::new(ConcurrencyTrackingLlmClient::default());
        let orchestrator = Arc::new(TurnOrchestrator::new(
            Arc::new(BoundedCache::new(64, Duration::from_secs(60))),
            Arc::new(ConversationMemory::new(store.clone(), 20, 100)),
            Arc::new(InMemoryRetriever::new()),
            Arc::new(GuardPipeline::default()),
            tracker.clone(),
            store,
            Arc::new(TokenLedger::new()),
            OrchestratorConfig::default(),
        ));

        let o1 = orchestrator.clone();
        let o2 = orchestrator.clone();
        let t1 = tokio::spawn(async move { o1.handle_turn("shared", "message one", TurnOptions::default()).await });
        let t2 = tokio::spawn(async move { o2.handle_turn("shared", "message two", TurnOptions::default()).await });
        let (r1, r2) = tokio::join!(t1, t2);
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        assert_eq!(tracker.max_seen.load(Ordering::SeqCst), 1);
    }
}
