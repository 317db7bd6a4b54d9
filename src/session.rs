//! Shared state between concurrent generation requests.
//!
//! Every submission takes a fresh generation id. Only the submission that is
//! still the newest when it finishes may publish its bundle, error or
//! progress; older ones are reported as superseded and their results dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::backend::GenerationBackend;
use crate::models::{GenerationOutcome, PreviewBundle, ProgressSnapshot, RunState};
use crate::orchestrator::{GenerationError, Orchestrator};
use crate::progress::Phase;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("Generation {generation_id} was superseded by a newer request")]
    Superseded { generation_id: u64 },
}

/// The bundle currently on display.
#[derive(Debug, Clone)]
pub struct PublishedPreview {
    pub id: Uuid,
    pub generation_id: u64,
    pub render_token: u64,
    pub prompt: String,
    pub bundle: Arc<PreviewBundle>,
}

#[derive(Default)]
struct PreviewSlot {
    render_token: u64,
    current: Option<PublishedPreview>,
}

pub struct Session<B> {
    orchestrator: Orchestrator<B>,
    latest: AtomicU64,
    progress: RwLock<ProgressSnapshot>,
    preview: RwLock<PreviewSlot>,
}

impl<B: GenerationBackend> Session<B> {
    pub fn new(orchestrator: Orchestrator<B>) -> Self {
        Self {
            orchestrator,
            latest: AtomicU64::new(0),
            progress: RwLock::new(ProgressSnapshot::default()),
            preview: RwLock::new(PreviewSlot::default()),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<B> {
        &self.orchestrator
    }

    fn begin(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation_id: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation_id
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.read().clone()
    }

    pub fn preview(&self) -> Option<PublishedPreview> {
        self.preview.read().current.clone()
    }

    pub fn render_token(&self) -> u64 {
        self.preview.read().render_token
    }

    // Writes the snapshot only if `generation_id` is still the newest run.
    fn set_progress(&self, generation_id: u64, update: impl FnOnce(&mut ProgressSnapshot)) {
        let mut guard = self.progress.write();
        if !self.is_current(generation_id) || guard.generation_id > generation_id {
            return;
        }
        guard.generation_id = generation_id;
        update(&mut guard);
    }

    fn publish(&self, generation_id: u64, prompt: &str, bundle: PreviewBundle) -> Option<u64> {
        let mut slot = self.preview.write();
        if !self.is_current(generation_id) {
            return None;
        }
        slot.render_token += 1;
        let render_token = slot.render_token;
        slot.current = Some(PublishedPreview {
            id: Uuid::new_v4(),
            generation_id,
            render_token,
            prompt: prompt.trim().to_string(),
            bundle: Arc::new(bundle),
        });
        Some(render_token)
    }

    /// Runs one generation and publishes its result if nothing newer started.
    pub async fn submit(&self, prompt: &str) -> Result<GenerationOutcome, SubmitError> {
        // Reject before taking an id so a bad submission can't supersede a good one.
        self.orchestrator.limits().validate(prompt)?;

        let generation_id = self.begin();
        self.set_progress(generation_id, |p| {
            *p = ProgressSnapshot {
                generation_id,
                state: RunState::Running,
                ..Default::default()
            };
        });

        let observer = |phase: Phase| {
            self.set_progress(generation_id, |p| {
                p.phase = Some(phase);
                p.percent = phase.percent();
                p.message = phase.message().to_string();
            });
        };
        let result = self
            .orchestrator
            .run_generation(generation_id, prompt, &observer)
            .await;

        if !self.is_current(generation_id) {
            info!(generation_id, "🗑️ Discarding result of superseded generation");
            return Err(SubmitError::Superseded { generation_id });
        }

        match result {
            Ok(outcome) => {
                let bundle = PreviewBundle::from_payload(&outcome.payload);
                let published = match bundle {
                    Some(bundle) => self.publish(generation_id, prompt, bundle),
                    None => {
                        info!(generation_id, "Final payload carried no previewable code");
                        None
                    }
                };
                if published.is_none() && !self.is_current(generation_id) {
                    return Err(SubmitError::Superseded { generation_id });
                }
                self.set_progress(generation_id, |p| {
                    p.state = RunState::Succeeded;
                    p.message = "Your website is ready!".to_string();
                });
                Ok(outcome)
            }
            Err(err) => {
                self.set_progress(generation_id, |p| {
                    p.state = RunState::Failed;
                    p.error = Some(err.to_string());
                });
                Err(err.into())
            }
        }
    }
}
