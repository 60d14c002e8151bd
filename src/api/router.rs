//! HTTP router for the labeling service.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::labeling::LabelingService;

/// Build the API router around a shared labeling service.
pub fn api_router(service: Arc<LabelingService>) -> Router {
    build_router(ApiContext::new(service))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/datasets/:id/label", post(endpoints::labeling::start))
        .route("/datasets/:id/progress", get(endpoints::stats::progress))
        .route(
            "/datasets/:id/review-queue",
            get(endpoints::labeling::review_queue),
        )
        .route("/datasets/:id/statistics", get(endpoints::stats::statistics))
        .route(
            "/datasets/:id/queue-summary",
            get(endpoints::stats::queue_summary),
        )
        .with_state(ctx);

    Router::new()
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
