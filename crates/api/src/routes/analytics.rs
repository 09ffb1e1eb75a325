//! Read access to the in-process analytics views.

use std::sync::Arc;

use analytics::AnalyticsSummary;
use axum::Json;
use axum::extract::State;

use super::orders::AppState;

/// GET /api/analytics/summary
pub async fn summary<B: Send + Sync + 'static>(
    State(state): State<Arc<AppState<B>>>,
) -> Json<AnalyticsSummary> {
    Json(state.analytics.summary().await)
}
