use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{BackendError, GenerationBackend};
use crate::models::GenerationOutcome;
use crate::progress::{Phase, ProgressObserver};

pub const DEFAULT_MIN_CHARS: usize = 10;
pub const DEFAULT_MAX_CHARS: usize = 1000;

const TRANSPORT_FALLBACK: &str = "Failed to process prompt";
const UNKNOWN_FALLBACK: &str = "An unexpected error occurred while generating the website";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Prompt must be between {min} and {max} characters (got {len})")]
    Validation { len: usize, min: usize, max: usize },
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    Semantic(String),
    #[error("{0}")]
    Unknown(String),
}

impl From<BackendError> for GenerationError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { message, .. } => GenerationError::Transport(
                message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| TRANSPORT_FALLBACK.to_string()),
            ),
            BackendError::Http(msg) | BackendError::Decode(msg) => GenerationError::Unknown(
                if msg.trim().is_empty() { UNKNOWN_FALLBACK.to_string() } else { msg },
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self { min_chars: DEFAULT_MIN_CHARS, max_chars: DEFAULT_MAX_CHARS }
    }
}

impl PromptLimits {
    /// Checks the trimmed prompt length in characters against both bounds.
    pub fn validate(&self, prompt: &str) -> Result<(), GenerationError> {
        let len = prompt.trim().chars().count();
        if len < self.min_chars || len > self.max_chars {
            return Err(GenerationError::Validation { len, min: self.min_chars, max: self.max_chars });
        }
        Ok(())
    }
}

/// Runs the reset + four-step generation sequence against a backend.
pub struct Orchestrator<B> {
    backend: B,
    limits: PromptLimits,
}

impl<B: GenerationBackend> Orchestrator<B> {
    pub fn new(backend: B, limits: PromptLimits) -> Self {
        Self { backend, limits }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn limits(&self) -> PromptLimits {
        self.limits
    }

    pub async fn run_generation(
        &self,
        generation_id: u64,
        prompt: &str,
        progress: &dyn ProgressObserver,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.limits.validate(prompt)?;

        info!(generation_id, "🚀 Starting generation ({} chars)", prompt.trim().chars().count());

        if let Err(e) = self.backend.reset().await {
            warn!(generation_id, "⚠️ Reset failed, continuing: {}", e);
        }

        let started = Instant::now();
        let mut warnings = Vec::new();
        let mut payload = None;

        for phase in Phase::ALL {
            progress.on_phase(phase);
            let step = self.request_phase(prompt, phase).await?;

            if let Some(first) = step.errors.into_iter().next() {
                warn!(generation_id, %phase, "❌ Step reported error: {}", first);
                return Err(GenerationError::Semantic(first));
            }

            warnings.extend(step.warnings);
            payload = Some(step.payload);
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(generation_id, elapsed_ms, warnings = warnings.len(), "✅ Generation finished");

        Ok(GenerationOutcome {
            generation_id,
            payload: payload.unwrap_or_default(),
            warnings,
            elapsed_ms,
            completed_at: Utc::now(),
        })
    }

    async fn request_phase(
        &self,
        prompt: &str,
        phase: Phase,
    ) -> Result<crate::models::StepResult, GenerationError> {
        self.backend.process(prompt, phase).await.map_err(|e| {
            warn!(%phase, "❌ Step failed: {}", e);
            GenerationError::from(e)
        })
    }
}
