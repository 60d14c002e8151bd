//! Labeling-specific error types.
//!
//! Transport, Parse, Validation and Persistence are batch-scoped: the
//! executor logs them and moves on. Configuration, NotFound and RunAborted
//! stop a run (or prevent it from starting).

use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum LabelingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dataset not found: {0}")]
    NotFound(String),

    #[error("Classifier error: {0}")]
    Transport(#[from] ClassifierError),

    #[error("Failed to parse classifier response: {0}")]
    Parse(String),

    #[error("Invalid classifier response: {0}")]
    Validation(String),

    #[error("Persistence error: {0}")]
    Persistence(DatabaseError),

    #[error("Run aborted: {0}")]
    RunAborted(String),
}

impl From<DatabaseError> for LabelingError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { id, .. } => Self::NotFound(id),
            other => Self::Persistence(other),
        }
    }
}

impl LabelingError {
    /// Whether this error only affects the current batch.
    pub fn is_batch_scoped(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Parse(_) | Self::Validation(_) | Self::Persistence(_)
        )
    }
}
