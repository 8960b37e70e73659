use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("api key not found")]
    KeyNotFound,

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "STORE_UNAVAILABLE",
            StoreError::KeyNotFound => "KEY_NOT_FOUND",
            StoreError::ConversationNotFound(_) => "CONVERSATION_NOT_FOUND",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
