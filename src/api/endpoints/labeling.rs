//! Labeling endpoints.
//!
//! - `POST /api/datasets/:id/label`: start a background run
//! - `GET /api/datasets/:id/review-queue`: items waiting for a human

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::labeling::review::ReviewQueuePage;
use crate::labeling::{ReviewQuery, ReviewSort, RunTicket};

/// `POST /api/datasets/:id/label`: returns 202 as soon as the run is spawned.
pub async fn start(
    State(ctx): State<ApiContext>,
    Path(dataset_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<RunTicket>>), ApiError> {
    // Dropping the join handle detaches the run; progress is polled separately.
    let ticket = ctx.service.start_run(&dataset_id)?.ticket;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::with_message("Labeling started successfully", ticket)),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewQueueParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

/// `GET /api/datasets/:id/review-queue?page&limit&sort`
pub async fn review_queue(
    State(ctx): State<ApiContext>,
    Path(dataset_id): Path<String>,
    Query(params): Query<ReviewQueueParams>,
) -> Result<Json<ApiResponse<ReviewQueuePage>>, ApiError> {
    let sort = match params.sort.as_deref() {
        None => ReviewSort::default(),
        Some(raw) => raw.parse::<ReviewSort>().unwrap_or_else(|_| {
            tracing::debug!(sort = raw, "Unknown review sort, using confidence");
            ReviewSort::default()
        }),
    };
    let query = ReviewQuery::new(params.page, params.limit, sort);

    let page = ctx.service.get_review_queue(&dataset_id, query)?;
    Ok(Json(ApiResponse::ok(page)))
}
