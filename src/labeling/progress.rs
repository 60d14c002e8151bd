//! Progress, throughput and ETA.
//!
//! Every refresh recomputes from item rows and overwrites the dataset's
//! stats snapshot; nothing is incremented in place.

use chrono::{DateTime, Utc};

use super::error::LabelingError;
use super::traits::LabelStore;
use super::types::{LabelCounts, Progress, ProgressReport, ProgressUpdate};
use crate::models::{DatasetStats, DatasetStatus};

/// Completion, speed (items/minute) and ETA (seconds) from raw counts.
pub fn compute_progress(
    counts: &LabelCounts,
    earliest_labeled_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Progress {
    let total = counts.total;
    let labeled = counts.labeled.min(total);
    let remaining = total - labeled;

    let percentage = if total == 0 {
        0
    } else {
        let rounded = (100.0 * labeled as f64 / total as f64).round() as u32;
        // Only a fully labeled dataset reports 100.
        if remaining > 0 {
            rounded.min(99)
        } else {
            rounded
        }
    };

    let speed = match earliest_labeled_at {
        Some(first) if labeled > 0 => {
            let elapsed_minutes = (now - first).num_milliseconds() as f64 / 60_000.0;
            if elapsed_minutes > 0.0 {
                (labeled as f64 / elapsed_minutes).round() as u64
            } else {
                0
            }
        }
        _ => 0,
    };

    let eta_seconds = if speed > 0 && remaining > 0 {
        Some((remaining as f64 / speed as f64 * 60.0).round() as u64)
    } else {
        None
    };

    Progress {
        total,
        labeled,
        remaining,
        percentage,
        speed,
        eta_seconds,
    }
}

/// Status after a refresh.
///
/// Fully labeled → `completed`. Partially labeled → `labeling`, except that an
/// `error` status sticks until a new run clears it.
pub fn next_status(current: DatasetStatus, progress: &Progress) -> DatasetStatus {
    if progress.total > 0 && progress.remaining == 0 {
        DatasetStatus::Completed
    } else if progress.labeled > 0 && current != DatasetStatus::Error {
        DatasetStatus::Labeling
    } else {
        current
    }
}

/// Recompute progress for a dataset and persist the stats + status.
pub fn refresh(
    store: &dyn LabelStore,
    dataset_id: &str,
    now: DateTime<Utc>,
) -> Result<ProgressReport, LabelingError> {
    let dataset = store
        .get_dataset(dataset_id)?
        .ok_or_else(|| LabelingError::NotFound(dataset_id.to_string()))?;

    let counts = store.label_counts(dataset_id)?;
    let earliest = store.earliest_labeled_at(dataset_id)?;
    let progress = compute_progress(&counts, earliest, now);
    let status = next_status(dataset.status, &progress);

    let stats = DatasetStats {
        total: counts.total,
        labeled: counts.labeled,
        auto_accepted: counts.auto_accepted,
        needs_review: counts.needs_review,
        low_confidence: counts.low_confidence,
        reviewed: counts.reviewed,
        updated_at: Some(now),
    };

    // The store resolves the final status, so a concurrent `mark_error`
    // between the read above and this write is not overwritten.
    let stored = store.write_progress(
        dataset_id,
        &ProgressUpdate {
            stats: stats.clone(),
            status,
            completed_at: if status == DatasetStatus::Completed {
                Some(now)
            } else {
                None
            },
        },
    )?;

    tracing::debug!(
        dataset_id,
        labeled = progress.labeled,
        total = progress.total,
        percentage = progress.percentage,
        status = stored.status.as_str(),
        "Progress refreshed"
    );

    Ok(ProgressReport {
        dataset_id: stored.id,
        status: stored.status,
        progress,
        stats,
        error_message: stored.error_message,
        created_at: stored.created_at,
        completed_at: stored.completed_at,
    })
}
