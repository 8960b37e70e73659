use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use vox_admission::{constant_time_eq, hash_secret};
use vox_core::types::{new_id, now_iso8601};
use vox_protocol::http::{ErrorBody, IssueKeyRequest, IssuedKeyResponse, KeySummary};
use vox_store::types::ApiKeyRecord;

use crate::app::AppState;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<ErrorBody>)> {
    let admin_key = state.config.gateway.admin_key.as_deref();
    match admin_key {
        None => Err((StatusCode::UNAUTHORIZED, Json(ErrorBody::new("admin access not configured")))),
        Some(expected) => {
            let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
            if presented.is_some_and(|p| constant_time_eq(p, expected)) {
                Ok(())
            } else {
                Err((StatusCode::UNAUTHORIZED, Json(ErrorBody::new("unauthorized"))))
            }
        }
    }
}

/// 32 bytes of entropy from two v4 UUIDs, the same "no dedicated RNG crate"
/// posture the rest of this codebase takes for id generation.
fn generate_secret() -> String {
    let a = uuid::Uuid::new_v4().as_bytes().to_vec();
    let b = uuid::Uuid::new_v4().as_bytes().to_vec();
    format!("vxk_{}{}", hex::encode(a), hex::encode(b))
}

pub async fn issue_key_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<IssueKeyRequest>,
) -> Result<Json<IssuedKeyResponse>, (StatusCode, Json<ErrorBody>)> {
    require_admin(&state, &headers)?;

    let secret = generate_secret();
    let record = ApiKeyRecord {
        id: new_id(),
        hashed_secret: hash_secret(&secret),
        owner: req.owner.clone(),
        created_at: now_iso8601(),
        expires_at: req.expires_at,
        revoked: false,
        limit_per_minute: req.limit_per_minute.unwrap_or(state.config.rate_limit.per_minute),
        limit_per_day: req.limit_per_day.unwrap_or(state.config.rate_limit.per_day),
        counters_json: "{}".to_string(),
    };

    state
        .store
        .create_api_key(&record)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(e.to_string()))))?;

    Ok(Json(IssuedKeyResponse { id: record.id, secret, owner: record.owner }))
}

pub async fn list_keys_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<KeySummary>>, (StatusCode, Json<ErrorBody>)> {
    require_admin(&state, &headers)?;

    let keys = state
        .store
        .list_api_keys()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(e.to_string()))))?;

    Ok(Json(
        keys.into_iter()
            .map(|k| KeySummary {
                id: k.id,
                owner: k.owner,
                created_at: k.created_at,
                revoked: k.revoked,
                limit_per_minute: k.limit_per_minute,
                limit_per_day: k.limit_per_day,
            })
            .collect(),
    ))
}

pub async fn revoke_key_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    require_admin(&state, &headers)?;

    state
        .store
        .revoke_api_key(&id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody::new(e.to_string()))))?;

    Ok(StatusCode::NO_CONTENT)
}
