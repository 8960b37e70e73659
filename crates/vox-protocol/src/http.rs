use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /conversation` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRequest {
    pub message: String,
    pub conversation_id: Option<String>,
    pub context: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TimingPayload {
    pub total_ms: u64,
    pub llm_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MetadataPayload {
    pub cache_hit: bool,
    pub rag_enabled: bool,
    pub rag_results_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard_flagged: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct TokensPayload {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub response: String,
    pub conversation_id: String,
    pub timing: TimingPayload,
    pub metadata: MetadataPayload,
    pub tokens: TokensPayload,
}

/// Uniform error body for every non-2xx HTTP response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), retry_after_seconds: None }
    }

    pub fn rate_limited(retry_after_seconds: u64) -> Self {
        Self { error: "rate_limit_exceeded".to_string(), retry_after_seconds: Some(retry_after_seconds) }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub components: Vec<ComponentStatus>,
}

/// Admin key issuance/listing/revocation shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueKeyRequest {
    pub owner: String,
    #[serde(default)]
    pub limit_per_minute: Option<u32>,
    #[serde(default)]
    pub limit_per_day: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedKeyResponse {
    pub id: String,
    pub secret: String,
    pub owner: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeySummary {
    pub id: String,
    pub owner: String,
    pub created_at: String,
    pub revoked: bool,
    pub limit_per_minute: u32,
    pub limit_per_day: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_request_parses_minimal_body() {
        let req: ConversationRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(req.message, "hi");
        assert!(req.conversation_id.is_none());
    }

    #[test]
    fn rate_limited_error_carries_retry_after() {
        let body = ErrorBody::rate_limited(7);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["retry_after_seconds"], 7);
        assert_eq!(json["error"], "rate_limit_exceeded");
    }
}
