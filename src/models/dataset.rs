use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::DatasetStatus;

/// Aggregate root: a named collection of items plus its labeling instructions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub instructions: Option<String>,
    pub item_count: u64,
    pub status: DatasetStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stats: DatasetStats,
}

impl Dataset {
    /// Instructions trimmed, or `None` when unset or blank.
    pub fn effective_instructions(&self) -> Option<&str> {
        self.instructions
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Denormalized counters refreshed from item rows after each batch or group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total: u64,
    pub labeled: u64,
    pub auto_accepted: u64,
    pub needs_review: u64,
    pub low_confidence: u64,
    pub reviewed: u64,
    pub updated_at: Option<DateTime<Utc>>,
}
