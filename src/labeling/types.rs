//! Core types for the labeling pipeline.
//!
//! Dataset → Batches → Classifier call → LabelResults → persisted Items → Progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DatasetStats, DatasetStatus, Item, ReviewStatus};

// ═══════════════════════════════════════════
// Execution mode
// ═══════════════════════════════════════════

/// How a run drives its batches through the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One call with every item.
    Single,
    /// One batch at a time, in order.
    Sequential { batch_size: usize },
    /// Groups of `concurrency` batches in flight at once.
    Parallel { batch_size: usize, concurrency: usize },
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Sequential { .. } => "sequential",
            Self::Parallel { .. } => "parallel",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════
// Batch + results
// ═══════════════════════════════════════════

/// Contiguous slice of unlabeled items framing one classifier call.
/// `number` is 0-based within the run. Never persisted.
#[derive(Debug, Clone)]
pub struct Batch {
    pub number: usize,
    pub items: Vec<Item>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One validated classification for the item at 1-based `ordinal` in its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelResult {
    pub ordinal: usize,
    pub label: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

/// Write-back row produced by the persister for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelUpdate {
    pub item_id: String,
    pub label: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub review_status: ReviewStatus,
    pub labeled_at: DateTime<Utc>,
}

/// Outcome of a whole labeling run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub dataset_id: String,
    pub mode: ExecutionMode,
    pub items_labeled: usize,
    pub batches_succeeded: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
    /// Set when the run stopped early on a fatal condition.
    pub aborted: Option<String>,
}

// ═══════════════════════════════════════════
// Counts + progress
// ═══════════════════════════════════════════

/// Per-status item counts for one dataset, computed from item rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelCounts {
    pub total: u64,
    pub labeled: u64,
    pub pending: u64,
    pub auto_accepted: u64,
    pub needs_review: u64,
    pub low_confidence: u64,
    pub reviewed: u64,
}

/// Point-in-time completion, throughput and ETA.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub total: u64,
    pub labeled: u64,
    pub remaining: u64,
    /// 0..=100
    pub percentage: u32,
    /// Items per minute since the first label of the dataset.
    pub speed: u64,
    /// Seconds, only while work remains and speed is known.
    #[serde(rename = "eta")]
    pub eta_seconds: Option<u64>,
}

/// Stats + status write produced by a progress refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stats: DatasetStats,
    pub status: DatasetStatus,
    /// Stamped only when the dataset has no completion time yet.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Result of refreshing a dataset's progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub dataset_id: String,
    pub status: DatasetStatus,
    pub progress: Progress,
    pub stats: DatasetStats,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Acknowledgement returned when a run is started in the background.
#[derive(Debug, Clone, Serialize)]
pub struct RunTicket {
    pub dataset_id: String,
    pub status: DatasetStatus,
    pub item_count: u64,
    pub unlabeled: usize,
    pub mode: ExecutionMode,
}
