use serde::{Deserialize, Serialize};

/// The four generation steps, in the order they are requested.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Structure,
    Html,
    Css,
    Js,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Structure, Phase::Html, Phase::Css, Phase::Js];

    /// Progress checkpoint set just before this phase's request is issued.
    pub fn percent(self) -> u8 {
        match self {
            Phase::Structure => 25,
            Phase::Html => 50,
            Phase::Css => 75,
            Phase::Js => 100,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Phase::Structure => "Analyzing your website structure...",
            Phase::Html => "Generating HTML markup...",
            Phase::Css => "Styling the page with CSS...",
            Phase::Js => "Adding JavaScript interactivity...",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Structure => "structure",
            Phase::Html => "html",
            Phase::Css => "css",
            Phase::Js => "js",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Receives a phase notification before each step request goes out.
pub trait ProgressObserver: Send + Sync {
    fn on_phase(&self, phase: Phase);
}

impl<F> ProgressObserver for F
where
    F: Fn(Phase) + Send + Sync,
{
    fn on_phase(&self, phase: Phase) {
        self(phase)
    }
}
