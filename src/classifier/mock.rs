//! Scripted classifier for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::ClassifierError;
use crate::labeling::traits::Classifier;

type Responder = Box<dyn Fn(usize, &str) -> Result<String, ClassifierError> + Send + Sync>;

/// Answers each call through a closure of `(call_index, prompt)` and records
/// how many calls were in flight at once.
pub struct MockClassifier {
    responder: Responder,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockClassifier {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(usize, &str) -> Result<String, ClassifierError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replies in call order; calls past the end get an empty array.
    pub fn scripted(responses: Vec<&str>) -> Self {
        let responses: Vec<String> = responses.into_iter().map(String::from).collect();
        Self::new(move |call, _| {
            Ok(responses
                .get(call)
                .cloned()
                .unwrap_or_else(|| "[]".to_string()))
        })
    }

    /// Labels every item of every prompt with the same label and confidence.
    pub fn labeling_everything(label: &'static str, confidence: f64) -> Self {
        Self::new(move |_, prompt| Ok(labels_for(count_prompt_items(prompt), label, confidence)))
    }

    /// Every call fails with a connection error.
    pub fn failing() -> Self {
        Self::new(|_, _| Err(ClassifierError::Connection("http://mock".into())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifierError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let reply = (self.responder)(call, prompt);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

/// Number of numbered item lines (`N. "..."`) in a prompt.
pub fn count_prompt_items(prompt: &str) -> usize {
    prompt
        .lines()
        .filter(|line| {
            line.split_once(". \"")
                .is_some_and(|(number, _)| number.parse::<usize>().is_ok())
        })
        .count()
}

/// A valid reply labeling items `1..=n`.
pub fn labels_for(n: usize, label: &str, confidence: f64) -> String {
    let entries: Vec<serde_json::Value> = (1..=n)
        .map(|index| {
            serde_json::json!({
                "index": index,
                "label": label,
                "confidence": confidence,
                "reasoning": "mock"
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}
