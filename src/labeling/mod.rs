//! Adaptive labeling orchestrator.
//!
//! Pipeline: Strategy → Executor → Prompt → Classifier → Parser → Persister
//! (via Review routing) → Progress. The Run Registry guarantees at most one
//! active run per dataset; the Service is the entry point.

pub mod error;
pub mod executor;
pub mod parser;
pub mod persister;
pub mod progress;
pub mod prompt;
pub mod registry;
pub mod review;
pub mod service;
pub mod statistics;
pub mod store;
pub mod strategy;
pub mod traits;
pub mod types;

pub use error::LabelingError;
pub use executor::BatchExecutor;
pub use registry::{ActiveRun, RunGuard, RunRegistry};
pub use review::{ReviewQuery, ReviewSort};
pub use service::{LabelingService, StartedRun};
pub use store::SqliteLabelStore;
pub use strategy::StrategyConfig;
pub use traits::{Classifier, LabelStore};
pub use types::*;
