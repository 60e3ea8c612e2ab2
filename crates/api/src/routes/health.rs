//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Stage requests still waiting for a response.
    pub pending_responses: usize,
}

/// GET /health
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pending_responses = state.orchestrator.router().pending_count().await;
    Json(HealthResponse {
        status: "ok",
        pending_responses,
    })
}
