use thiserror::Error;

/// Top-level error kind shared across crate boundaries. Each component's own
/// error enum converts into this one at the point it crosses into the gateway
/// layer, so the HTTP/WS surface matches on a stable kind set rather than on
/// formatted message strings.
#[derive(Debug, Error)]
pub enum VoxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("retriever unavailable: {0}")]
    RetrieverUnavailable(String),

    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    #[error("guard critical: {0}")]
    GuardCritical(String),

    #[error("session capacity exceeded")]
    SessionCapacityExceeded,

    #[error("state violation: {0}")]
    StateViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VoxError {
    /// Stable machine-readable code for wire responses and audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            VoxError::Config(_) => "CONFIG_ERROR",
            VoxError::InvalidInput(_) => "INVALID_INPUT",
            VoxError::Unauthorized => "UNAUTHORIZED",
            VoxError::RateLimited { .. } => "RATE_LIMITED",
            VoxError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            VoxError::RetrieverUnavailable(_) => "RETRIEVER_UNAVAILABLE",
            VoxError::LlmUnavailable(_) => "LLM_UNAVAILABLE",
            VoxError::GuardCritical(_) => "GUARD_CRITICAL",
            VoxError::SessionCapacityExceeded => "SESSION_CAPACITY_EXCEEDED",
            VoxError::StateViolation(_) => "STATE_VIOLATION",
            VoxError::Internal(_) => "INTERNAL",
        }
    }
}

pub type Result<T> = std::result::Result<T, VoxError>;
