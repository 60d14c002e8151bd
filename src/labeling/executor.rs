//! BatchExecutor drives a labeling run to completion.
//!
//! Single and sequential runs issue one classifier call at a time and persist
//! batch N before batch N+1 goes out. Parallel runs issue groups of
//! `concurrency` batches on a JoinSet gated by a semaphore and drain each
//! group fully before starting the next. A failed batch is logged and
//! skipped; its items stay `pending` for a later run.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::error::LabelingError;
use super::parser::parse_response;
use super::persister::persist_batch;
use super::progress::refresh;
use super::prompt::build_prompt;
use super::traits::{Classifier, LabelStore};
use super::types::{Batch, ExecutionMode, RunSummary};
use crate::models::Item;

/// Split items into ordered batches for the given mode.
pub fn partition(items: Vec<Item>, mode: ExecutionMode) -> Vec<Batch> {
    if items.is_empty() {
        return Vec::new();
    }

    let batch_size = match mode {
        ExecutionMode::Single => items.len(),
        ExecutionMode::Sequential { batch_size } | ExecutionMode::Parallel { batch_size, .. } => {
            batch_size.max(1)
        }
    };

    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        let chunk: Vec<Item> = remaining.by_ref().take(batch_size).collect();
        batches.push(Batch {
            number: batches.len(),
            items: chunk,
        });
    }
    batches
}

/// Outcome counters accumulated over a run.
#[derive(Default)]
struct Tally {
    labeled: usize,
    succeeded: usize,
    failed: usize,
    last_error: Option<String>,
}

impl Tally {
    fn record(&mut self, dataset_id: &str, batch: usize, outcome: Result<usize, LabelingError>) {
        match outcome {
            Ok(written) => {
                self.labeled += written;
                self.succeeded += 1;
                tracing::debug!(dataset_id, batch = batch + 1, written, "Batch labeled");
            }
            Err(e) => {
                tracing::warn!(
                    dataset_id,
                    batch = batch + 1,
                    error = %e,
                    "Batch failed, skipping"
                );
                self.fail(e.to_string());
            }
        }
    }

    fn fail(&mut self, error: String) {
        self.failed += 1;
        self.last_error = Some(error);
    }

    /// A run that attempted work and labeled nothing.
    fn nothing_succeeded(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

pub struct BatchExecutor {
    store: Arc<dyn LabelStore>,
    classifier: Arc<dyn Classifier>,
}

impl BatchExecutor {
    pub fn new(store: Arc<dyn LabelStore>, classifier: Arc<dyn Classifier>) -> Self {
        Self { store, classifier }
    }

    /// Label `items` (the dataset's unlabeled items, in order) using `mode`.
    ///
    /// Never fails: batch errors are counted, fatal conditions end the run
    /// early with `aborted` set and the dataset marked `error`. A run in
    /// which every batch failed also leaves the dataset in `error`.
    pub async fn run(
        &self,
        dataset_id: &str,
        items: Vec<Item>,
        mode: ExecutionMode,
    ) -> RunSummary {
        let start = Instant::now();
        let batches = partition(items, mode);
        let batch_count = batches.len();

        tracing::info!(dataset_id, mode = %mode, batches = batch_count, "Labeling run started");

        let mut tally = Tally::default();
        let aborted = match mode {
            ExecutionMode::Single | ExecutionMode::Sequential { .. } => {
                self.run_sequential(dataset_id, batches, &mut tally).await
            }
            ExecutionMode::Parallel { concurrency, .. } => {
                self.run_parallel(dataset_id, batches, concurrency.max(1), &mut tally)
                    .await
            }
        };

        if batch_count == 0 {
            self.refresh_progress(dataset_id);
        }

        if aborted.is_none() && tally.nothing_succeeded() {
            let reason = tally.last_error.as_deref().unwrap_or("unknown error");
            let message = format!("All {} batches failed: {reason}", tally.failed);
            tracing::error!(dataset_id, error = %message, "Labeling run labeled nothing");
            if let Err(e) = self.store.mark_error(dataset_id, &message) {
                tracing::warn!(dataset_id, error = %e, "Could not record run failure");
            }
        }

        let summary = RunSummary {
            dataset_id: dataset_id.to_string(),
            mode,
            items_labeled: tally.labeled,
            batches_succeeded: tally.succeeded,
            batches_failed: tally.failed,
            duration_ms: start.elapsed().as_millis() as u64,
            aborted: aborted.map(|e| e.to_string()),
        };

        tracing::info!(
            dataset_id,
            mode = %mode,
            labeled = summary.items_labeled,
            succeeded = summary.batches_succeeded,
            failed = summary.batches_failed,
            duration_ms = summary.duration_ms,
            aborted = summary.aborted.is_some(),
            "Labeling run finished"
        );

        summary
    }

    async fn run_sequential(
        &self,
        dataset_id: &str,
        batches: Vec<Batch>,
        tally: &mut Tally,
    ) -> Option<LabelingError> {
        for batch in batches {
            let instructions = match self.check_dataset(dataset_id) {
                Ok(instructions) => instructions,
                Err(e) if e.is_batch_scoped() => {
                    tracing::warn!(
                        dataset_id,
                        batch = batch.number + 1,
                        error = %e,
                        "Dataset re-check failed, skipping batch"
                    );
                    tally.fail(e.to_string());
                    continue;
                }
                Err(e) => return Some(self.abort(dataset_id, e)),
            };

            let number = batch.number;
            let outcome = label_batch(
                Arc::clone(&self.store),
                Arc::clone(&self.classifier),
                &instructions,
                batch,
            )
            .await;
            tally.record(dataset_id, number, outcome);
            self.refresh_progress(dataset_id);
        }
        None
    }

    async fn run_parallel(
        &self,
        dataset_id: &str,
        batches: Vec<Batch>,
        concurrency: usize,
        tally: &mut Tally,
    ) -> Option<LabelingError> {
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut remaining = batches.into_iter().peekable();
        let mut group_number = 0;

        while remaining.peek().is_some() {
            group_number += 1;
            let instructions: Arc<str> = match self.check_dataset(dataset_id) {
                Ok(instructions) => instructions.into(),
                Err(e) if e.is_batch_scoped() => {
                    let skipped = remaining.by_ref().take(concurrency).count();
                    tracing::warn!(
                        dataset_id,
                        group = group_number,
                        skipped,
                        error = %e,
                        "Dataset re-check failed, skipping group"
                    );
                    for _ in 0..skipped {
                        tally.fail(e.to_string());
                    }
                    continue;
                }
                Err(e) => return Some(self.abort(dataset_id, e)),
            };

            let mut group = JoinSet::new();
            for batch in remaining.by_ref().take(concurrency) {
                let store = Arc::clone(&self.store);
                let classifier = Arc::clone(&self.classifier);
                let semaphore = Arc::clone(&semaphore);
                let instructions = Arc::clone(&instructions);

                group.spawn(async move {
                    let number = batch.number;
                    let outcome = match semaphore.acquire_owned().await {
                        Ok(_permit) => {
                            label_batch(store, classifier, &instructions, batch).await
                        }
                        Err(_) => Err(LabelingError::RunAborted(
                            "concurrency limiter closed".into(),
                        )),
                    };
                    (number, outcome)
                });
            }

            tracing::debug!(
                dataset_id,
                group = group_number,
                size = group.len(),
                "Group dispatched"
            );

            while let Some(joined) = group.join_next().await {
                match joined {
                    Ok((number, outcome)) => tally.record(dataset_id, number, outcome),
                    Err(e) => {
                        tracing::warn!(dataset_id, error = %e, "Batch task panicked, skipping");
                        tally.fail(e.to_string());
                    }
                }
            }

            self.refresh_progress(dataset_id);
        }
        None
    }

    /// Re-read the dataset before scheduling more work.
    ///
    /// A deleted dataset or cleared instructions end the run. A failed read
    /// surfaces as a batch-scoped persistence error.
    fn check_dataset(&self, dataset_id: &str) -> Result<String, LabelingError> {
        let dataset = self
            .store
            .get_dataset(dataset_id)?
            .ok_or_else(|| LabelingError::RunAborted("dataset was deleted".into()))?;
        dataset
            .effective_instructions()
            .map(str::to_string)
            .ok_or_else(|| LabelingError::RunAborted("labeling instructions were cleared".into()))
    }

    fn abort(&self, dataset_id: &str, error: LabelingError) -> LabelingError {
        tracing::error!(dataset_id, error = %error, "Labeling run aborted");
        if let Err(e) = self.store.mark_error(dataset_id, &error.to_string()) {
            tracing::warn!(dataset_id, error = %e, "Could not record run failure");
        }
        error
    }

    fn refresh_progress(&self, dataset_id: &str) {
        if let Err(e) = refresh(self.store.as_ref(), dataset_id, Utc::now()) {
            tracing::warn!(dataset_id, error = %e, "Progress refresh failed");
        }
    }
}

/// Prompt → classify → parse → persist for one batch.
async fn label_batch(
    store: Arc<dyn LabelStore>,
    classifier: Arc<dyn Classifier>,
    instructions: &str,
    batch: Batch,
) -> Result<usize, LabelingError> {
    let prompt = build_prompt(instructions, &batch.items);
    let raw = classifier.classify(&prompt).await?;
    let results = parse_response(&raw, batch.len())?;
    persist_batch(store.as_ref(), &batch.items, &results, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::classifier::mock::{count_prompt_items, labels_for, MockClassifier};
    use crate::db::DatabaseError;
    use crate::labeling::review::ReviewQuery;
    use crate::labeling::store::SqliteLabelStore;
    use crate::labeling::types::{LabelCounts, LabelUpdate, ProgressUpdate};
    use crate::models::{Dataset, DatasetStatus, ReviewStatus};
    use serde_json::json;

    fn seeded(n: usize) -> (Arc<SqliteLabelStore>, String) {
        let store = Arc::new(SqliteLabelStore::open_in_memory().unwrap());
        let dataset = store.create_dataset("ds", Some("classify sentiment")).unwrap();
        let payloads: Vec<_> = (0..n).map(|i| json!({"text": format!("item {i}")})).collect();
        store.insert_items(&dataset.id, &payloads).unwrap();
        (store, dataset.id)
    }

    fn executor(store: &Arc<SqliteLabelStore>, classifier: Arc<dyn Classifier>) -> BatchExecutor {
        let store: Arc<dyn LabelStore> = store.clone();
        BatchExecutor::new(store, classifier)
    }

    #[test]
    fn partition_modes() {
        let (store, id) = seeded(7);
        let items = store.load_unlabeled(&id).unwrap();

        let single = partition(items.clone(), ExecutionMode::Single);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].len(), 7);

        let sequential = partition(items.clone(), ExecutionMode::Sequential { batch_size: 3 });
        let sizes: Vec<_> = sequential.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(sequential[2].number, 2);
        assert_eq!(sequential[1].items[0].ordinal, 3);

        assert!(partition(Vec::new(), ExecutionMode::Single).is_empty());
    }

    #[tokio::test]
    async fn single_mode_labels_everything() {
        let (store, id) = seeded(5);
        let classifier = Arc::new(MockClassifier::labeling_everything("positive", 0.95));
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(&id, items, ExecutionMode::Single)
            .await;

        assert_eq!(classifier.calls(), 1);
        assert_eq!(summary.items_labeled, 5);
        assert_eq!(summary.batches_succeeded, 1);
        assert!(summary.aborted.is_none());

        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Completed);
        assert!(dataset.completed_at.is_some());
    }

    #[tokio::test]
    async fn unparsable_middle_batch_is_skipped() {
        let (store, id) = seeded(6);
        let classifier = Arc::new(MockClassifier::scripted(vec![
            labels_for(2, "positive", 0.95).as_str(),
            "I could not label these, sorry.",
            labels_for(2, "negative", 0.5).as_str(),
        ]));
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(&id, items, ExecutionMode::Sequential { batch_size: 2 })
            .await;

        assert_eq!(classifier.calls(), 3);
        assert_eq!(summary.batches_succeeded, 2);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.items_labeled, 4);

        let all = store.list_items(&id).unwrap();
        let labels: Vec<_> = all.iter().map(|i| i.label.as_deref()).collect();
        assert_eq!(
            labels,
            vec![
                Some("positive"),
                Some("positive"),
                None,
                None,
                Some("negative"),
                Some("negative")
            ]
        );
        assert_eq!(all[2].review_status, ReviewStatus::Pending);

        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Labeling);
        assert!(dataset.completed_at.is_none());
    }

    #[tokio::test]
    async fn transport_failure_leaves_items_pending() {
        let (store, id) = seeded(3);
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, Arc::new(MockClassifier::failing()))
            .run(&id, items, ExecutionMode::Single)
            .await;

        assert_eq!(summary.batches_failed, 1);
        assert!(summary.aborted.is_none());
        assert_eq!(store.label_counts(&id).unwrap().pending, 3);
    }

    #[tokio::test]
    async fn run_with_every_batch_failing_marks_error() {
        let (store, id) = seeded(4);
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, Arc::new(MockClassifier::failing()))
            .run(&id, items, ExecutionMode::Sequential { batch_size: 2 })
            .await;

        assert_eq!(summary.batches_failed, 2);
        assert_eq!(summary.batches_succeeded, 0);
        assert!(summary.aborted.is_none());

        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Error);
        let message = dataset.error_message.unwrap();
        assert!(message.contains("All 2 batches failed"), "{message}");
        assert!(message.contains("http://mock"), "{message}");
        assert_eq!(store.label_counts(&id).unwrap().pending, 4);
    }

    /// Delegating store whose `get_dataset` fails while `failing_reads` > 0.
    struct FlakyReads {
        inner: Arc<SqliteLabelStore>,
        failing_reads: AtomicUsize,
    }

    impl LabelStore for FlakyReads {
        fn get_dataset(&self, id: &str) -> Result<Option<Dataset>, DatabaseError> {
            let failing = self
                .failing_reads
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if failing.is_ok() {
                return Err(DatabaseError::LockPoisoned);
            }
            self.inner.get_dataset(id)
        }
        fn mark_labeling(&self, id: &str) -> Result<(), DatabaseError> {
            self.inner.mark_labeling(id)
        }
        fn mark_error(&self, id: &str, message: &str) -> Result<(), DatabaseError> {
            self.inner.mark_error(id, message)
        }
        fn load_unlabeled(&self, id: &str) -> Result<Vec<Item>, DatabaseError> {
            self.inner.load_unlabeled(id)
        }
        fn apply_labels(&self, updates: &[LabelUpdate]) -> Result<usize, DatabaseError> {
            self.inner.apply_labels(updates)
        }
        fn label_counts(&self, id: &str) -> Result<LabelCounts, DatabaseError> {
            self.inner.label_counts(id)
        }
        fn earliest_labeled_at(
            &self,
            id: &str,
        ) -> Result<Option<chrono::DateTime<Utc>>, DatabaseError> {
            self.inner.earliest_labeled_at(id)
        }
        fn write_progress(
            &self,
            id: &str,
            update: &ProgressUpdate,
        ) -> Result<Dataset, DatabaseError> {
            self.inner.write_progress(id, update)
        }
        fn review_queue(
            &self,
            id: &str,
            query: &ReviewQuery,
        ) -> Result<(Vec<Item>, u64), DatabaseError> {
            self.inner.review_queue(id, query)
        }
        fn label_distribution(&self, id: &str) -> Result<Vec<(String, u64)>, DatabaseError> {
            self.inner.label_distribution(id)
        }
        fn confidence_values(&self, id: &str) -> Result<Vec<f64>, DatabaseError> {
            self.inner.confidence_values(id)
        }
    }

    #[tokio::test]
    async fn failed_dataset_read_skips_batch_without_aborting() {
        let (inner, id) = seeded(6);
        let store = Arc::new(FlakyReads {
            inner: Arc::clone(&inner),
            failing_reads: AtomicUsize::new(0),
        });

        // After the first batch is classified, fail the progress refresh read
        // and the re-check before the second batch.
        let flaky = Arc::clone(&store);
        let classifier = Arc::new(MockClassifier::new(move |call, prompt| {
            if call == 0 {
                flaky.failing_reads.store(2, Ordering::SeqCst);
            }
            Ok(labels_for(count_prompt_items(prompt), "x", 0.95))
        }));
        let items = inner.load_unlabeled(&id).unwrap();

        let dyn_store: Arc<dyn LabelStore> = store;
        let summary = BatchExecutor::new(dyn_store, classifier.clone())
            .run(&id, items, ExecutionMode::Sequential { batch_size: 2 })
            .await;

        assert!(summary.aborted.is_none());
        assert_eq!(classifier.calls(), 2);
        assert_eq!(summary.batches_succeeded, 2);
        assert_eq!(summary.batches_failed, 1);
        assert_eq!(summary.items_labeled, 4);

        let dataset = inner.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Labeling);
        assert!(dataset.error_message.is_none());
        assert_eq!(dataset.stats.labeled, 4);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_completes() {
        let (store, id) = seeded(10);
        let observed = Arc::new(Mutex::new(Vec::new()));

        let reader = Arc::clone(&store);
        let seen = Arc::clone(&observed);
        let dataset_id = id.clone();
        let classifier = Arc::new(MockClassifier::new(move |_, prompt| {
            let counts = reader.label_counts(&dataset_id).unwrap();
            let earliest = reader.earliest_labeled_at(&dataset_id).unwrap();
            let progress =
                crate::labeling::progress::compute_progress(&counts, earliest, Utc::now());
            seen.lock().unwrap().push(progress.percentage);
            Ok(labels_for(count_prompt_items(prompt), "x", 0.8))
        }));

        let items = store.load_unlabeled(&id).unwrap();
        executor(&store, classifier)
            .run(&id, items, ExecutionMode::Sequential { batch_size: 3 })
            .await;

        let mut percentages = observed.lock().unwrap().clone();
        let final_report = refresh(store.as_ref(), &id, Utc::now()).unwrap();
        percentages.push(final_report.progress.percentage);

        assert_eq!(percentages, vec![0, 30, 60, 90, 100]);
        assert!(percentages.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(final_report.status, DatasetStatus::Completed);
    }

    #[tokio::test]
    async fn parallel_respects_concurrency_bound() {
        let (store, id) = seeded(500);
        let classifier = Arc::new(
            MockClassifier::labeling_everything("positive", 0.92)
                .with_delay(Duration::from_millis(20)),
        );
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(
                &id,
                items,
                ExecutionMode::Parallel {
                    batch_size: 20,
                    concurrency: 10,
                },
            )
            .await;

        assert_eq!(classifier.calls(), 25);
        assert!(classifier.max_in_flight() <= 10);
        assert!(classifier.max_in_flight() >= 2);
        assert_eq!(summary.batches_succeeded, 25);
        assert_eq!(summary.items_labeled, 500);

        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Completed);
        assert_eq!(dataset.stats.auto_accepted, 500);
    }

    #[tokio::test]
    async fn parallel_failures_do_not_stop_the_group() {
        let (store, id) = seeded(60);
        let classifier = Arc::new(MockClassifier::new(|call, prompt| {
            if call % 2 == 0 {
                Ok(labels_for(count_prompt_items(prompt), "x", 0.75))
            } else {
                Err(crate::classifier::ClassifierError::Timeout(1))
            }
        }));
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(
                &id,
                items,
                ExecutionMode::Parallel {
                    batch_size: 10,
                    concurrency: 4,
                },
            )
            .await;

        assert_eq!(classifier.calls(), 6);
        assert_eq!(summary.batches_succeeded, 3);
        assert_eq!(summary.batches_failed, 3);
        assert_eq!(store.label_counts(&id).unwrap().labeled, 30);
    }

    #[tokio::test]
    async fn cleared_instructions_abort_the_run() {
        let (store, id) = seeded(6);
        let writer = Arc::clone(&store);
        let dataset_id = id.clone();
        let classifier = Arc::new(MockClassifier::new(move |_, prompt| {
            writer.set_instructions(&dataset_id, None).unwrap();
            Ok(labels_for(count_prompt_items(prompt), "x", 0.95))
        }));
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(&id, items, ExecutionMode::Sequential { batch_size: 2 })
            .await;

        assert_eq!(classifier.calls(), 1);
        assert_eq!(summary.items_labeled, 2);
        assert!(summary.aborted.as_deref().unwrap().contains("instructions"));

        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert_eq!(dataset.status, DatasetStatus::Error);
        assert!(dataset.error_message.unwrap().contains("instructions"));
    }

    #[tokio::test]
    async fn deleted_dataset_aborts_quietly() {
        let (store, id) = seeded(40);
        let writer = Arc::clone(&store);
        let dataset_id = id.clone();
        let classifier = Arc::new(MockClassifier::new(move |_, _| {
            let _ = writer.delete_dataset(&dataset_id);
            Ok("[]".to_string())
        }));
        let items = store.load_unlabeled(&id).unwrap();

        let summary = executor(&store, classifier.clone())
            .run(
                &id,
                items,
                ExecutionMode::Parallel {
                    batch_size: 10,
                    concurrency: 2,
                },
            )
            .await;

        assert_eq!(classifier.calls(), 2);
        assert!(summary.aborted.as_deref().unwrap().contains("deleted"));
        assert!(store.get_dataset(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_run_still_refreshes() {
        let (store, id) = seeded(0);
        let classifier = Arc::new(MockClassifier::failing());
        let summary = executor(&store, classifier.clone())
            .run(&id, Vec::new(), ExecutionMode::Single)
            .await;
        assert_eq!(classifier.calls(), 0);
        assert_eq!(summary.items_labeled, 0);
        let dataset = store.get_dataset(&id).unwrap().unwrap();
        assert!(dataset.stats.updated_at.is_some());
    }
}
