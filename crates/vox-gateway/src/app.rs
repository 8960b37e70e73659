use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use vox_admission::RateLimiter;
use vox_cache::BoundedCache;
use vox_core::config::VoxConfig;
use vox_guard::GuardPipeline;
use vox_llm::{HttpLlmClient, LlmClient, ProviderRouter, ProviderSlot};
use vox_memory::ConversationMemory;
use vox_orchestrator::{CachedTurn, OrchestratorConfig, Persona, TokenLedger, TurnOrchestrator};
use vox_retriever::{InMemoryRetriever, Retriever};
use vox_store::Store;
use vox_voice::{EchoSttEngine, SessionManager, ToneTtsEngine};

/// Central shared state — passed as `Arc<AppState>` to every Axum handler.
/// Every component is constructed once here rather than reached through a
/// global; this is the one place in the process that knows how the pieces
/// wire together.
pub struct AppState {
    pub config: VoxConfig,
    pub store: Arc<Store>,
    pub retriever: Arc<dyn Retriever>,
    pub guard: Arc<GuardPipeline>,
    pub llm: Arc<dyn LlmClient>,
    pub health: Arc<vox_llm::HealthTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<SessionManager>,
    pub ledger: Arc<TokenLedger>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: VoxConfig) -> anyhow::Result<Self> {
        let store = Arc::new(Store::open(&config.database_path)?);

        let cache = Arc::new(BoundedCache::<CachedTurn>::new(
            config.cache.capacity,
            Duration::from_secs(config.cache.ttl_s),
        ));
        let memory = Arc::new(ConversationMemory::new(
            store.clone(),
            config.memory.window_messages,
            config.memory.max_conversations,
        ));
        let retriever: Arc<dyn Retriever> = Arc::new(InMemoryRetriever::new());
        let guard = Arc::new(GuardPipeline::new(
            config.guardrails.toxicity_threshold,
            config.guardrails.pii_score_threshold,
        ));

        let health = vox_llm::HealthTracker::new();
        let primary = HttpLlmClient::named(
            "primary",
            config.llm.endpoint_url.clone(),
            Duration::from_secs(config.llm.request_timeout_s),
        );
        let router = ProviderRouter::new(
            vec![ProviderSlot::new(Box::new(primary), config.llm.max_retries)],
            health.clone(),
        );
        let llm: Arc<dyn LlmClient> = Arc::new(router);

        let rate_limiter = Arc::new(RateLimiter::new());
        let ledger = Arc::new(TokenLedger::new());

        let orchestrator_config = OrchestratorConfig {
            persona: Persona::Generic,
            max_tokens: config.llm.max_tokens,
            temperature: config.llm.temperature,
            model_name: config.llm.model_name.clone(),
            rag_enabled: config.rag.enabled,
            rag_top_k: config.rag.top_k,
            rag_score_threshold: Some(config.rag.score_threshold),
            rag_soft_deadline: Duration::from_millis(config.rag.soft_deadline_ms),
            guard_enabled: config.guardrails.enabled,
            guard_strict: config.guardrails.mode == vox_core::config::GuardMode::Strict,
            guard_reconcile_wait: Duration::from_millis(vox_core::config::GUARD_RECONCILE_WAIT_MS),
        };

        let orchestrator = Arc::new(TurnOrchestrator::new(
            cache,
            memory,
            retriever.clone(),
            guard.clone(),
            llm.clone(),
            store.clone(),
            ledger.clone(),
            orchestrator_config,
        ));

        let sessions = Arc::new(SessionManager::new(
            config.voice.max_sessions,
            orchestrator.clone(),
            Arc::new(EchoSttEngine),
            Arc::new(ToneTtsEngine::default()),
            config.voice.session_timeout_s * 1000,
            config.voice.vad_threshold,
            config.voice.silence_timeout_ms,
            config.voice.max_audio_duration_ms,
            config.voice.audio_sample_rate_hz,
        ));

        Ok(Self {
            config,
            store,
            retriever,
            guard,
            llm,
            health,
            rate_limiter,
            orchestrator,
            sessions,
            ledger,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/conversation", post(crate::http::conversation::conversation_handler))
        .route("/health/live", get(crate::http::health::liveness_handler))
        .route("/health/ready", get(crate::http::health::readiness_handler))
        .route("/admin/keys", post(crate::http::admin::issue_key_handler))
        .route("/admin/keys", get(crate::http::admin::list_keys_handler))
        .route("/admin/keys/{id}", delete(crate::http::admin::revoke_key_handler))
        .route("/rtc/stream", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
