//! Execution strategy selection.
//!
//! Small workloads go out in a single call, medium ones as ordered
//! sequential batches, large ones as bounded-concurrency groups.

use serde::Serialize;

use super::error::LabelingError;
use super::types::ExecutionMode;
use crate::models::Dataset;

pub const DEFAULT_SINGLE_THRESHOLD: usize = 100;
pub const DEFAULT_SEQUENTIAL_THRESHOLD: usize = 2000;
pub const DEFAULT_SEQUENTIAL_BATCH_SIZE: usize = 50;
pub const DEFAULT_PARALLEL_BATCH_SIZE: usize = 20;
pub const DEFAULT_PARALLEL_CONCURRENCY: usize = 10;

/// Thresholds and sizes driving mode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyConfig {
    /// Up to this many items: one call.
    pub single_threshold: usize,
    /// Up to this many items: sequential batches.
    pub sequential_threshold: usize,
    pub sequential_batch_size: usize,
    pub parallel_batch_size: usize,
    pub parallel_concurrency: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            single_threshold: DEFAULT_SINGLE_THRESHOLD,
            sequential_threshold: DEFAULT_SEQUENTIAL_THRESHOLD,
            sequential_batch_size: DEFAULT_SEQUENTIAL_BATCH_SIZE,
            parallel_batch_size: DEFAULT_PARALLEL_BATCH_SIZE,
            parallel_concurrency: DEFAULT_PARALLEL_CONCURRENCY,
        }
    }
}

impl StrategyConfig {
    /// Batch sizes and concurrency are at least 1; the sequential threshold
    /// is never below the single threshold.
    pub fn sanitized(self) -> Self {
        Self {
            single_threshold: self.single_threshold,
            sequential_threshold: self.sequential_threshold.max(self.single_threshold),
            sequential_batch_size: self.sequential_batch_size.max(1),
            parallel_batch_size: self.parallel_batch_size.max(1),
            parallel_concurrency: self.parallel_concurrency.max(1),
        }
    }

    /// Pick the execution mode for `n` unlabeled items.
    pub fn mode_for(&self, n: usize) -> ExecutionMode {
        if n <= self.single_threshold {
            ExecutionMode::Single
        } else if n <= self.sequential_threshold {
            ExecutionMode::Sequential {
                batch_size: self.sequential_batch_size,
            }
        } else {
            ExecutionMode::Parallel {
                batch_size: self.parallel_batch_size,
                concurrency: self.parallel_concurrency,
            }
        }
    }
}

/// Validate the dataset can be labeled and choose a mode for `n` items.
///
/// The "run already active" rejection is the run registry's job and surfaces
/// with the same `Configuration` error kind.
pub fn select_strategy(
    dataset: &Dataset,
    n: usize,
    config: &StrategyConfig,
) -> Result<ExecutionMode, LabelingError> {
    if dataset.effective_instructions().is_none() {
        return Err(LabelingError::Configuration(
            "Labeling instructions are not configured".into(),
        ));
    }
    Ok(config.mode_for(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatasetStats, DatasetStatus};
    use chrono::Utc;

    fn dataset(instructions: Option<&str>) -> Dataset {
        Dataset {
            id: "ds-1".into(),
            name: "reviews".into(),
            instructions: instructions.map(String::from),
            item_count: 0,
            status: DatasetStatus::Configured,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            stats: DatasetStats::default(),
        }
    }

    #[test]
    fn boundaries_select_expected_modes() {
        let config = StrategyConfig::default();
        assert_eq!(config.mode_for(0), ExecutionMode::Single);
        assert_eq!(config.mode_for(100), ExecutionMode::Single);
        assert_eq!(
            config.mode_for(101),
            ExecutionMode::Sequential { batch_size: 50 }
        );
        assert_eq!(
            config.mode_for(2000),
            ExecutionMode::Sequential { batch_size: 50 }
        );
        assert_eq!(
            config.mode_for(2001),
            ExecutionMode::Parallel {
                batch_size: 20,
                concurrency: 10
            }
        );
    }

    #[test]
    fn missing_instructions_rejected() {
        let config = StrategyConfig::default();
        for instructions in [None, Some(""), Some("   \n")] {
            let err = select_strategy(&dataset(instructions), 10, &config).unwrap_err();
            assert!(matches!(err, LabelingError::Configuration(_)));
        }
    }

    #[test]
    fn configured_dataset_gets_mode() {
        let mode = select_strategy(
            &dataset(Some("positive, negative, neutral")),
            150,
            &StrategyConfig::default(),
        )
        .unwrap();
        assert_eq!(mode, ExecutionMode::Sequential { batch_size: 50 });
    }

    #[test]
    fn sanitized_enforces_minimums() {
        let config = StrategyConfig {
            single_threshold: 10,
            sequential_threshold: 5,
            sequential_batch_size: 0,
            parallel_batch_size: 0,
            parallel_concurrency: 0,
        }
        .sanitized();
        assert_eq!(config.sequential_threshold, 10);
        assert_eq!(config.sequential_batch_size, 1);
        assert_eq!(config.parallel_batch_size, 1);
        assert_eq!(config.parallel_concurrency, 1);
    }
}
