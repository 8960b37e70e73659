#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after_s}s")]
    RateLimited { retry_after_s: u64 },
}

impl AdmissionError {
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::InvalidInput(_) => "invalid_input",
            AdmissionError::Unauthorized => "unauthorized",
            AdmissionError::RateLimited { .. } => "rate_limited",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdmissionError>;
