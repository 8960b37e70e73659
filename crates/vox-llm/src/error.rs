#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("request timed out")]
    Timeout,

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    pub fn code(&self) -> &'static str {
        match self {
            LlmError::Http(_) => "llm_http_error",
            LlmError::Api { .. } => "llm_api_error",
            LlmError::Parse(_) => "llm_parse_error",
            LlmError::RateLimited { .. } => "llm_rate_limited",
            LlmError::Timeout => "llm_timeout",
            LlmError::Unavailable(_) => "llm_unavailable",
        }
    }

    /// Whether a caller (the router) should retry the same provider.
    pub fn is_retriable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => false,
            LlmError::Api { status, .. } => *status >= 500,
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, LlmError>;
