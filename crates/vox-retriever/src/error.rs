use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("retriever unavailable: {0}")]
    Unavailable(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
}

impl RetrieverError {
    pub fn code(&self) -> &'static str {
        match self {
            RetrieverError::Unavailable(_) => "RETRIEVER_UNAVAILABLE",
            RetrieverError::EmbeddingFailed(_) => "EMBEDDING_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrieverError>;
