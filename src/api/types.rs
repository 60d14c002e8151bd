//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::Serialize;

use crate::labeling::LabelingService;

/// Shared state for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub service: Arc<LabelingService>,
}

impl ApiContext {
    pub fn new(service: Arc<LabelingService>) -> Self {
        Self { service }
    }
}

/// Success envelope: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data,
        }
    }

    pub fn with_message(message: &'static str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message),
            data,
        }
    }
}
