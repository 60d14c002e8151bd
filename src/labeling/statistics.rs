//! Dataset statistics and review queue summary.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::LabelingError;
use super::progress::refresh;
use super::traits::LabelStore;
use super::types::Progress;
use crate::models::{DatasetStats, DatasetStatus};

/// Histogram boundaries; the last bucket is closed on both ends.
pub const CONFIDENCE_BOUNDARIES: [f64; 6] = [0.0, 0.5, 0.7, 0.8, 0.9, 1.0];

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub status: DatasetStatus,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelShare {
    pub label: String,
    pub count: u64,
    /// Share of labeled items, rounded to a whole percent.
    pub percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBucket {
    pub range: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetStatistics {
    pub dataset: DatasetSummary,
    pub progress: Progress,
    pub stats: DatasetStats,
    pub label_distribution: Vec<LabelShare>,
    pub confidence_distribution: Vec<ConfidenceBucket>,
    pub average_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueSummary {
    pub dataset_id: String,
    pub dataset_name: String,
    pub total: u64,
    pub pending: u64,
    pub auto_accepted: u64,
    pub needs_review: u64,
    pub low_confidence: u64,
    pub reviewed: u64,
    /// Items waiting for a human: `needs_review + low_confidence`.
    pub pending_review: u64,
}

/// Label distribution, confidence histogram and average for a dataset.
pub fn get_statistics(
    store: &dyn LabelStore,
    dataset_id: &str,
    now: DateTime<Utc>,
) -> Result<DatasetStatistics, LabelingError> {
    let report = refresh(store, dataset_id, now)?;
    let dataset = store
        .get_dataset(dataset_id)?
        .ok_or_else(|| LabelingError::NotFound(dataset_id.to_string()))?;

    let distribution = store.label_distribution(dataset_id)?;
    let confidences = store.confidence_values(dataset_id)?;

    Ok(DatasetStatistics {
        dataset: DatasetSummary {
            id: dataset.id,
            name: dataset.name,
            status: dataset.status,
            item_count: dataset.item_count,
            created_at: dataset.created_at,
            completed_at: dataset.completed_at,
        },
        label_distribution: label_shares(&distribution, report.progress.labeled),
        confidence_distribution: confidence_histogram(&confidences),
        average_confidence: average_confidence(&confidences),
        progress: report.progress,
        stats: report.stats,
    })
}

/// Per-status counts for the review queue.
pub fn get_queue_summary(
    store: &dyn LabelStore,
    dataset_id: &str,
) -> Result<QueueSummary, LabelingError> {
    let dataset = store
        .get_dataset(dataset_id)?
        .ok_or_else(|| LabelingError::NotFound(dataset_id.to_string()))?;
    let counts = store.label_counts(dataset_id)?;

    Ok(QueueSummary {
        dataset_id: dataset.id,
        dataset_name: dataset.name,
        total: counts.total,
        pending: counts.pending,
        auto_accepted: counts.auto_accepted,
        needs_review: counts.needs_review,
        low_confidence: counts.low_confidence,
        reviewed: counts.reviewed,
        pending_review: counts.needs_review + counts.low_confidence,
    })
}

pub fn label_shares(distribution: &[(String, u64)], labeled: u64) -> Vec<LabelShare> {
    distribution
        .iter()
        .map(|(label, count)| LabelShare {
            label: label.clone(),
            count: *count,
            percentage: if labeled > 0 {
                (100.0 * *count as f64 / labeled as f64).round() as u32
            } else {
                0
            },
        })
        .collect()
}

/// Count confidences per bucket. Every bucket is present, even when empty.
pub fn confidence_histogram(confidences: &[f64]) -> Vec<ConfidenceBucket> {
    let bucket_count = CONFIDENCE_BOUNDARIES.len() - 1;
    let mut counts = vec![0u64; bucket_count];

    for &confidence in confidences {
        let idx = CONFIDENCE_BOUNDARIES[1..bucket_count]
            .iter()
            .position(|&upper| confidence < upper)
            .unwrap_or(bucket_count - 1);
        counts[idx] += 1;
    }

    CONFIDENCE_BOUNDARIES
        .windows(2)
        .zip(counts)
        .map(|(bounds, count)| ConfidenceBucket {
            range: format!("{:.1}-{:.1}", bounds[0], bounds[1]),
            count,
        })
        .collect()
}

/// Mean confidence rounded to 2 decimals; 0 when nothing is labeled.
pub fn average_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
    (mean * 100.0).round() / 100.0
}
