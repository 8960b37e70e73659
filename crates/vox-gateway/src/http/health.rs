use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use vox_llm::ProviderStatus;
use vox_protocol::http::{ComponentStatus, LivenessResponse, ReadinessResponse};

use crate::app::AppState;

pub async fn liveness_handler(State(state): State<Arc<AppState>>) -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive", uptime_seconds: state.uptime_seconds() })
}

pub async fn readiness_handler(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store_ok = state.store.is_open();
    let retriever_ok = state.retriever.is_available();

    let llm_entries = state.health.all_entries();
    let llm_ok = llm_entries.is_empty()
        || llm_entries.iter().any(|e| matches!(e.status, ProviderStatus::Ok | ProviderStatus::Degraded));

    let components = vec![
        ComponentStatus { name: "store", healthy: store_ok, detail: None },
        ComponentStatus { name: "retriever", healthy: retriever_ok, detail: None },
        ComponentStatus {
            name: "llm",
            healthy: llm_ok,
            detail: llm_entries.first().map(|e| e.status.to_string()),
        },
    ];

    let ready = components.iter().all(|c| c.healthy);
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(ReadinessResponse { ready, components }))
}
