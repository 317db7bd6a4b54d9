use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{BackendErrorBody, StepResult};
use crate::progress::Phase;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP {status}: {}", message.as_deref().unwrap_or("no error message"))]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

/// The generation service the orchestrator talks to.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Clears server-side generation state. Callers treat failure as non-fatal.
    async fn reset(&self) -> Result<(), BackendError>;

    /// Sends the prompt to the process endpoint. `phase` only labels the call.
    async fn process(&self, prompt: &str, phase: Phase) -> Result<StepResult, BackendError>;
}

// Keeps logged bodies readable when the backend returns a whole site.
fn truncate_for_log(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...[{} chars total]", &text[..idx], text.chars().count()),
        None => text.to_string(),
    }
}

pub struct BuilderClient {
    client: Client,
    base_url: String,
}

impl BuilderClient {
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| BackendError::Http(e.to_string()))?;

        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetches the backend's own view of the current generation, as-is.
    pub async fn generation_state(&self) -> Result<Value, BackendError> {
        let url = self.endpoint("get-generation-state/");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.json::<BackendErrorBody>().await.ok().and_then(|b| b.error);
            return Err(BackendError::Status { status, message });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerationBackend for BuilderClient {
    async fn reset(&self) -> Result<(), BackendError> {
        let url = self.endpoint("reset-generation/");
        info!("🔄 Resetting generation state at {}", url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;
        if !response.status().is_success() {
            warn!("⚠️ Reset returned status {}", response.status());
        }
        Ok(())
    }

    async fn process(&self, prompt: &str, phase: Phase) -> Result<StepResult, BackendError> {
        let url = self.endpoint("process-prompt/");
        info!("🔗 Requesting {} step from: {}", phase, url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 {} step response status: {}", phase, status);

        let response_text = response
            .text()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ {} step failed: {}", phase, truncate_for_log(&response_text, 500));
            let message = serde_json::from_str::<BackendErrorBody>(&response_text)
                .ok()
                .and_then(|body| body.error);
            return Err(BackendError::Status { status, message });
        }

        info!("📥 {} step body: {}", phase, truncate_for_log(&response_text, 300));

        serde_json::from_str::<StepResult>(&response_text)
            .map_err(|e| BackendError::Decode(format!("invalid {phase} step response: {e}")))
    }
}
