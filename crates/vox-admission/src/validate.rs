use vox_core::config::MAX_MESSAGE_CHARS;

use crate::error::{AdmissionError, Result};

/// Shape/length checks on a turn request, applied before anything touches
/// the store, the guard pipeline, or the LLM.
pub fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(AdmissionError::InvalidInput("message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AdmissionError::InvalidInput(format!(
            "message exceeds {MAX_MESSAGE_CHARS} characters"
        )));
    }
    if message.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
        return Err(AdmissionError::InvalidInput("message contains control characters".to_string()));
    }
    Ok(())
}

pub fn validate_conversation_id(id: &str) -> Result<()> {
    if !vox_core::types::is_valid_conversation_id(id) {
        return Err(AdmissionError::InvalidInput(
            "conversation_id must be 1-64 chars of [A-Za-z0-9_-]".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_context_bytes(context: &serde_json::Value) -> Result<()> {
    let serialized = serde_json::to_vec(context).unwrap_or_default();
    if serialized.len() > vox_core::config::MAX_CONTEXT_BYTES {
        return Err(AdmissionError::InvalidInput("context exceeds 10 KB".to_string()));
    }
    Ok(())
}
