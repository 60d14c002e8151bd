//! Progress and statistics endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::labeling::statistics::{DatasetStatistics, QueueSummary};
use crate::labeling::ProgressReport;

/// `GET /api/datasets/:id/progress`
pub async fn progress(
    State(ctx): State<ApiContext>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ApiResponse<ProgressReport>>, ApiError> {
    let report = ctx.service.get_progress(&dataset_id)?;
    Ok(Json(ApiResponse::ok(report)))
}

/// `GET /api/datasets/:id/statistics`
pub async fn statistics(
    State(ctx): State<ApiContext>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ApiResponse<DatasetStatistics>>, ApiError> {
    let statistics = ctx.service.get_statistics(&dataset_id)?;
    Ok(Json(ApiResponse::ok(statistics)))
}

/// `GET /api/datasets/:id/queue-summary`
pub async fn queue_summary(
    State(ctx): State<ApiContext>,
    Path(dataset_id): Path<String>,
) -> Result<Json<ApiResponse<QueueSummary>>, ApiError> {
    let summary = ctx.service.get_queue_summary(&dataset_id)?;
    Ok(Json(ApiResponse::ok(summary)))
}
