//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscriptions: usize,
}

/// GET /health: liveness plus the number of running stage subscriptions.
pub async fn check<B: Send + Sync + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscriptions: state.subscriptions,
    })
}
