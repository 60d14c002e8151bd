use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ClassifierError;
use crate::config::ClassifierConfig;
use crate::labeling::prompt::SYSTEM_PROMPT;
use crate::labeling::traits::Classifier;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiClassifier {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiClassifier {
    /// Build a classifier from configuration. Fails when no API key is set.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ClassifierError::MissingApiKey)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ClassifierError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Request body for `/chat/completions`
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Response body from `/chat/completions`
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, prompt: &str) -> Result<String, ClassifierError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ClassifierError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    ClassifierError::Timeout(self.timeout_secs)
                } else {
                    ClassifierError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::ResponseParsing(e.to_string()))?;

        extract_completion(parsed)
    }
}

fn extract_completion(response: ChatResponse) -> Result<String, ClassifierError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(ClassifierError::EmptyCompletion)
}
