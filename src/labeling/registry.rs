//! One active labeling run per dataset.
//!
//! `try_register` is an atomic check-and-set under a mutex. The returned
//! `RunGuard` owns an `Arc` to the registry, so it can move into the spawned
//! run task; dropping it (success, failure or panic) releases the entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::LabelingError;
use super::types::ExecutionMode;

/// Observability record for a run in flight.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveRun {
    pub dataset_id: String,
    pub started_at: DateTime<Utc>,
    pub mode: ExecutionMode,
}

#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, ActiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the dataset for a new run, or fail if one is already active.
    pub fn try_register(
        self: &Arc<Self>,
        dataset_id: &str,
        mode: ExecutionMode,
    ) -> Result<RunGuard, LabelingError> {
        let mut runs = self
            .runs
            .lock()
            .map_err(|_| LabelingError::RunAborted("run registry lock poisoned".into()))?;

        if runs.contains_key(dataset_id) {
            return Err(LabelingError::Configuration(format!(
                "Labeling already in progress for dataset {dataset_id}"
            )));
        }

        runs.insert(
            dataset_id.to_string(),
            ActiveRun {
                dataset_id: dataset_id.to_string(),
                started_at: Utc::now(),
                mode,
            },
        );

        Ok(RunGuard {
            registry: Arc::clone(self),
            dataset_id: dataset_id.to_string(),
        })
    }

    pub fn is_active(&self, dataset_id: &str) -> bool {
        self.runs
            .lock()
            .map(|runs| runs.contains_key(dataset_id))
            .unwrap_or(false)
    }

    /// Snapshot of every run in flight, oldest first.
    pub fn active_runs(&self) -> Vec<ActiveRun> {
        let mut runs: Vec<ActiveRun> = self
            .runs
            .lock()
            .map(|runs| runs.values().cloned().collect())
            .unwrap_or_default();
        runs.sort_by_key(|run| run.started_at);
        runs
    }

    fn release(&self, dataset_id: &str) {
        // A poisoned lock still holds valid data; recover it so the entry is freed.
        let mut runs = match self.runs.lock() {
            Ok(runs) => runs,
            Err(poisoned) => poisoned.into_inner(),
        };
        runs.remove(dataset_id);
    }
}

// ═══════════════════════════════════════════
// RunGuard: RAII ownership of a dataset's run slot
// ═══════════════════════════════════════════

/// Releases the dataset's registry entry on drop.
pub struct RunGuard {
    registry: Arc<RunRegistry>,
    dataset_id: String,
}

impl RunGuard {
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.release(&self.dataset_id);
        tracing::debug!(dataset_id = %self.dataset_id, "Run released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_release() {
        let registry = RunRegistry::new();
        let guard = registry.try_register("ds-1", ExecutionMode::Single).unwrap();
        assert!(registry.is_active("ds-1"));
        assert_eq!(guard.dataset_id(), "ds-1");

        drop(guard);
        assert!(!registry.is_active("ds-1"));
        assert!(registry.active_runs().is_empty());
    }

    #[test]
    fn second_registration_rejected() {
        let registry = RunRegistry::new();
        let _guard = registry.try_register("ds-1", ExecutionMode::Single).unwrap();
        let err = registry
            .try_register("ds-1", ExecutionMode::Single)
            .err()
            .unwrap();
        assert!(matches!(err, LabelingError::Configuration(_)));
    }

    #[test]
    fn different_datasets_run_independently() {
        let registry = RunRegistry::new();
        let _a = registry.try_register("ds-a", ExecutionMode::Single).unwrap();
        let _b = registry
            .try_register("ds-b", ExecutionMode::Sequential { batch_size: 50 })
            .unwrap();
        let runs = registry.active_runs();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().any(|r| r.dataset_id == "ds-b" && r.mode.as_str() == "sequential"));
    }

    #[test]
    fn guard_released_when_task_panics() {
        let registry = RunRegistry::new();
        let guard = registry.try_register("ds-1", ExecutionMode::Single).unwrap();
        let handle = std::thread::spawn(move || {
            let _guard = guard;
            panic!("run blew up");
        });
        assert!(handle.join().is_err());
        assert!(!registry.is_active("ds-1"));
    }

    #[test]
    fn reregister_after_release() {
        let registry = RunRegistry::new();
        drop(registry.try_register("ds-1", ExecutionMode::Single).unwrap());
        assert!(registry.try_register("ds-1", ExecutionMode::Single).is_ok());
    }
}
