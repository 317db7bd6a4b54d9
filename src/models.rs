use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DefaultOnNull};

use crate::progress::Phase;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
}

/// One decoded response from the process endpoint.
#[serde_as]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StepResult {
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationOutcome {
    pub generation_id: u64,
    pub payload: Map<String, Value>,
    pub warnings: Vec<String>,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

/// Body of a failed step, as sent by the backend with a non-2xx status.
#[derive(Debug, Deserialize, Default)]
pub struct BackendErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct PreviewBundle {
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub css: String,
    #[serde(default)]
    pub js: String,
}

static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A```[A-Za-z0-9_+-]*[ \t]*(?:\r?\n|\z)").expect("valid opening fence pattern")
});
static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\A|\r?\n)[ \t]*```\z").expect("valid closing fence pattern"));

/// Removes one markdown fence wrapped around the whole blob, if present.
/// Backticks anywhere else are left as they are.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let opened = OPENING_FENCE.replace(trimmed, "");
    let closed = CLOSING_FENCE.replace(&opened, "");
    closed.trim().to_string()
}

impl PreviewBundle {
    pub fn is_empty(&self) -> bool {
        self.html.is_empty() && self.css.is_empty() && self.js.is_empty()
    }

    /// Pulls the bundle out of the final step payload.
    ///
    /// Structured `html`/`css`/`js` string fields win; otherwise a single
    /// `code` blob is taken as markup. Returns `None` when nothing usable is
    /// present.
    pub fn from_payload(payload: &Map<String, Value>) -> Option<Self> {
        let field = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);

        let bundle = match (field("html"), field("css"), field("js")) {
            // the legacy blob may come back wrapped in a markdown fence
            (None, None, None) => PreviewBundle {
                html: strip_code_fences(&field("code")?),
                ..Default::default()
            },
            (html, css, js) => PreviewBundle {
                html: html.unwrap_or_default(),
                css: css.unwrap_or_default(),
                js: js.unwrap_or_default(),
            },
        };

        (!bundle.is_empty()).then_some(bundle)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub generation_id: u64,
    pub state: RunState,
    pub phase: Option<Phase>,
    pub percent: u8,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            generation_id: 0,
            state: RunState::Idle,
            phase: None,
            percent: 0,
            message: String::new(),
            error: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreviewInfo {
    pub available: bool,
    pub render_token: u64,
    pub generation_id: Option<u64>,
}
