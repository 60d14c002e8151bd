//! Trait definitions for the labeling pipeline.
//!
//! Two traits define the module boundaries:
//! - Classifier: the external text-classification call
//! - LabelStore: persistence of datasets, items and their labels

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::review::ReviewQuery;
use super::types::{LabelCounts, LabelUpdate, ProgressUpdate};
use crate::classifier::ClassifierError;
use crate::db::DatabaseError;
use crate::models::{Dataset, Item};

/// Sends one prompt to the external classifier and returns its raw reply.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifierError>;
}

/// Persistence boundary used by the orchestrator.
///
/// Implementations own their connection; no method is async, so callers must
/// not hold anything returned across an `.await` that borrows the store.
pub trait LabelStore: Send + Sync {
    /// Fetch a dataset, `None` when it does not exist.
    fn get_dataset(&self, dataset_id: &str) -> Result<Option<Dataset>, DatabaseError>;

    /// Move a dataset into `labeling` and clear any previous error.
    fn mark_labeling(&self, dataset_id: &str) -> Result<(), DatabaseError>;

    /// Move a dataset into `error` with a message.
    fn mark_error(&self, dataset_id: &str, message: &str) -> Result<(), DatabaseError>;

    /// All items without a label, in insertion order.
    fn load_unlabeled(&self, dataset_id: &str) -> Result<Vec<Item>, DatabaseError>;

    /// Write labels for one batch atomically. Returns rows updated.
    fn apply_labels(&self, updates: &[LabelUpdate]) -> Result<usize, DatabaseError>;

    /// Item counts per labeling/review state.
    fn label_counts(&self, dataset_id: &str) -> Result<LabelCounts, DatabaseError>;

    /// Time the first item of the dataset was labeled.
    fn earliest_labeled_at(
        &self,
        dataset_id: &str,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    /// Persist a stats snapshot and status transition, returning the stored
    /// dataset. An `error` status is only replaced by `completed`.
    fn write_progress(
        &self,
        dataset_id: &str,
        update: &ProgressUpdate,
    ) -> Result<Dataset, DatabaseError>;

    /// One page of the human review queue plus the total queue size.
    fn review_queue(
        &self,
        dataset_id: &str,
        query: &ReviewQuery,
    ) -> Result<(Vec<Item>, u64), DatabaseError>;

    /// `(label, count)` for every distinct label, most frequent first.
    fn label_distribution(&self, dataset_id: &str) -> Result<Vec<(String, u64)>, DatabaseError>;

    /// Confidence of every labeled item.
    fn confidence_values(&self, dataset_id: &str) -> Result<Vec<f64>, DatabaseError>;
}
