//! External classifier adapters.
//!
//! The labeling pipeline only sees the `Classifier` trait; this module holds
//! the HTTP client that talks to an OpenAI-compatible chat completions API.

pub mod openai;

#[cfg(test)]
pub mod mock;

pub use openai::OpenAiClassifier;

use thiserror::Error;

/// Transport/provider failures from a classification call.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Cannot connect to classifier at {0}")]
    Connection(String),

    #[error("Classifier request timed out after {0}s")]
    Timeout(u64),

    #[error("Classifier returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Failed to parse classifier response: {0}")]
    ResponseParsing(String),

    #[error("Classifier returned no completion")]
    EmptyCompletion,

    #[error("API key not configured (set OPENAI_API_KEY)")]
    MissingApiKey,
}
