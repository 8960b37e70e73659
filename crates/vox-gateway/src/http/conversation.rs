use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::warn;

use vox_admission::{authenticate, validate_context_bytes, validate_conversation_id, validate_message};
use vox_core::error::VoxError;
use vox_core::types::new_id;
use vox_orchestrator::TurnOptions;
use vox_protocol::http::{
    ConversationRequest, ConversationResponse, ErrorBody, MetadataPayload, TimingPayload, TokensPayload,
};

use crate::app::AppState;

pub async fn conversation_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<ConversationRequest>,
) -> Result<Json<ConversationResponse>, (StatusCode, Json<ErrorBody>)> {
    let key_id = authorize(&state, &headers, &addr)?;

    if let Err(e) = validate_message(&req.message) {
        return Err(bad_request(e.to_string()));
    }
    let conversation_id = match &req.conversation_id {
        Some(id) => {
            validate_conversation_id(id).map_err(|e| bad_request(e.to_string()))?;
            id.clone()
        }
        None => new_id(),
    };
    if let Some(ctx) = &req.context {
        validate_context_bytes(ctx).map_err(|e| bad_request(e.to_string()))?;
    }

    state
        .rate_limiter
        .check(&key_id, state.config.rate_limit.per_minute, state.config.rate_limit.per_day)
        .map_err(|e| match e {
            vox_admission::AdmissionError::RateLimited { retry_after_s } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::rate_limited(retry_after_s)),
            ),
            other => bad_request(other.to_string()),
        })?;

    let turn = state
        .orchestrator
        .handle_turn(&conversation_id, &req.message, TurnOptions::default())
        .await
        .map_err(|e| match e {
            VoxError::LlmUnavailable(msg) => {
                warn!(error = %msg, "llm unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorBody::new("llm_unavailable")))
            }
            VoxError::StoreUnavailable(msg) => {
                warn!(error = %msg, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, Json(ErrorBody::new("store_unavailable")))
            }
            other => (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(other.code()))),
        })?;

    Ok(Json(ConversationResponse {
        response: turn.response,
        conversation_id: turn.conversation_id,
        timing: TimingPayload {
            total_ms: turn.timing.total_ms,
            llm_ms: turn.timing.llm_ms,
            rag_ms: turn.timing.rag_ms,
            cache_ms: turn.timing.cache_ms,
        },
        metadata: MetadataPayload {
            cache_hit: turn.metadata.cache_hit,
            rag_enabled: turn.metadata.rag_enabled,
            rag_results_count: turn.metadata.rag_results_count,
            guard_flagged: turn.metadata.guard_flagged,
        },
        tokens: TokensPayload {
            input_tokens: turn.tokens.input_tokens,
            output_tokens: turn.tokens.output_tokens,
            total_tokens: turn.tokens.total_tokens,
        },
    }))
}

/// Resolve the caller's rate-limit key-id: the hashed API key when one was
/// presented and accepted, or a per-IP anonymous bucket when auth isn't
/// required — so one anonymous caller spamming requests can't exhaust the
/// shared budget for every other anonymous caller. Returns 401 when a key is
/// required but missing or invalid.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    addr: &SocketAddr,
) -> Result<String, (StatusCode, Json<ErrorBody>)> {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());

    match presented {
        Some(secret) => {
            let record = authenticate(&state.store, secret)
                .map_err(|_| (StatusCode::UNAUTHORIZED, Json(ErrorBody::new("unauthorized"))))?;
            Ok(record.id)
        }
        None if state.config.gateway.api_key_required => {
            Err((StatusCode::UNAUTHORIZED, Json(ErrorBody::new("unauthorized"))))
        }
        None => Ok(format!("anonymous:{}", addr.ip())),
    }
}

fn bad_request(message: String) -> (StatusCode, Json<ErrorBody>) {
    (StatusCode::BAD_REQUEST, Json(ErrorBody::new(message)))
}
