//! LabelingService: entry points used by the HTTP layer.
//!
//! `start_run` validates synchronously, claims the dataset in the run
//! registry and spawns the executor on the tokio runtime, returning at once.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::error::LabelingError;
use super::executor::BatchExecutor;
use super::progress::refresh;
use super::registry::{ActiveRun, RunRegistry};
use super::review::{Pagination, ReviewQuery, ReviewQueuePage};
use super::statistics::{self, DatasetStatistics, QueueSummary};
use super::strategy::{select_strategy, StrategyConfig};
use super::traits::{Classifier, LabelStore};
use super::types::{ProgressReport, RunSummary, RunTicket};
use crate::models::DatasetStatus;

/// A run accepted and spawned in the background.
pub struct StartedRun {
    pub ticket: RunTicket,
    pub task: JoinHandle<RunSummary>,
}

pub struct LabelingService {
    store: Arc<dyn LabelStore>,
    /// `Err` holds the reason the classifier could not be built.
    classifier: Result<Arc<dyn Classifier>, String>,
    registry: Arc<RunRegistry>,
    strategy: StrategyConfig,
}

impl LabelingService {
    pub fn new(
        store: Arc<dyn LabelStore>,
        classifier: Arc<dyn Classifier>,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            store,
            classifier: Ok(classifier),
            registry: RunRegistry::new(),
            strategy: strategy.sanitized(),
        }
    }

    /// Service whose runs fail because no classifier is available.
    /// Reads (progress, queue, statistics) keep working.
    pub fn without_classifier(
        store: Arc<dyn LabelStore>,
        reason: impl Into<String>,
        strategy: StrategyConfig,
    ) -> Self {
        Self {
            store,
            classifier: Err(reason.into()),
            registry: RunRegistry::new(),
            strategy: strategy.sanitized(),
        }
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    pub fn classifier_available(&self) -> bool {
        self.classifier.is_ok()
    }

    pub fn active_runs(&self) -> Vec<ActiveRun> {
        self.registry.active_runs()
    }

    pub fn is_running(&self, dataset_id: &str) -> bool {
        self.registry.is_active(dataset_id)
    }

    /// Validate and start a labeling run in the background.
    ///
    /// Fails with `NotFound` for an unknown dataset and `Configuration` when
    /// instructions are missing, the dataset is empty, a run is already
    /// active, or no classifier is available.
    pub fn start_run(&self, dataset_id: &str) -> Result<StartedRun, LabelingError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)?
            .ok_or_else(|| LabelingError::NotFound(dataset_id.to_string()))?;

        if dataset.effective_instructions().is_none() {
            return Err(LabelingError::Configuration(
                "Please configure labeling instructions first".into(),
            ));
        }
        if dataset.item_count == 0 {
            return Err(LabelingError::Configuration("Dataset has no items".into()));
        }

        let classifier = match &self.classifier {
            Ok(classifier) => Arc::clone(classifier),
            Err(reason) => {
                let message = format!("Classifier unavailable: {reason}");
                if let Err(e) = self.store.mark_error(dataset_id, &message) {
                    tracing::warn!(dataset_id, error = %e, "Could not record classifier failure");
                }
                return Err(LabelingError::Configuration(message));
            }
        };

        let items = self.store.load_unlabeled(dataset_id)?;
        let unlabeled = items.len();
        let mode = select_strategy(&dataset, unlabeled, &self.strategy)?;
        let guard = self.registry.try_register(dataset_id, mode)?;

        self.store.mark_labeling(dataset_id)?;

        tracing::info!(
            dataset_id,
            name = %dataset.name,
            unlabeled,
            mode = %mode,
            "Labeling run accepted"
        );

        let executor = BatchExecutor::new(Arc::clone(&self.store), classifier);
        let run_id = dataset_id.to_string();
        let task = tokio::spawn(async move {
            let _guard = guard;
            executor.run(&run_id, items, mode).await
        });

        Ok(StartedRun {
            ticket: RunTicket {
                dataset_id: dataset.id,
                status: DatasetStatus::Labeling,
                item_count: dataset.item_count,
                unlabeled,
                mode,
            },
            task,
        })
    }

    /// Current progress; refreshes the stored snapshot.
    pub fn get_progress(&self, dataset_id: &str) -> Result<ProgressReport, LabelingError> {
        refresh(self.store.as_ref(), dataset_id, Utc::now())
    }

    pub fn get_review_queue(
        &self,
        dataset_id: &str,
        query: ReviewQuery,
    ) -> Result<ReviewQueuePage, LabelingError> {
        if self.store.get_dataset(dataset_id)?.is_none() {
            return Err(LabelingError::NotFound(dataset_id.to_string()));
        }
        let (items, total) = self.store.review_queue(dataset_id, &query)?;
        Ok(ReviewQueuePage {
            items,
            pagination: Pagination::new(&query, total),
            sorting: query.sort,
        })
    }

    pub fn get_statistics(&self, dataset_id: &str) -> Result<DatasetStatistics, LabelingError> {
        statistics::get_statistics(self.store.as_ref(), dataset_id, Utc::now())
    }

    pub fn get_queue_summary(&self, dataset_id: &str) -> Result<QueueSummary, LabelingError> {
        statistics::get_queue_summary(self.store.as_ref(), dataset_id)
    }
}
