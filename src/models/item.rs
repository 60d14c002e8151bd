use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::ReviewStatus;

/// One record of a dataset and its labeling outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub dataset_id: String,
    pub ordinal: u64,
    pub payload: serde_json::Value,
    pub label: Option<String>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub review_status: ReviewStatus,
    pub labeled_at: Option<DateTime<Utc>>,
    pub human_label: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}
