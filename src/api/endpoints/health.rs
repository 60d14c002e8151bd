//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::{ApiContext, ApiResponse};
use crate::labeling::{ActiveRun, StrategyConfig};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub classifier_available: bool,
    pub active_runs: Vec<ActiveRun>,
    pub strategy: StrategyConfig,
}

/// `GET /api/health`: liveness plus runs in flight.
pub async fn check(State(ctx): State<ApiContext>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        classifier_available: ctx.service.classifier_available(),
        active_runs: ctx.service.active_runs(),
        strategy: *ctx.service.strategy(),
    }))
}
