use std::env;
use std::time::Duration;

use anyhow::{bail, Context};

use crate::orchestrator::{PromptLimits, DEFAULT_MAX_CHARS, DEFAULT_MIN_CHARS};

const DEFAULT_API_BASE: &str = "http://localhost:8000/api/";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Base URL of the generation API (process/reset/state endpoints).
    pub api_base: String,
    /// Base URL that serves generated `images/...` assets.
    pub asset_base: String,
    pub limits: PromptLimits,
    pub request_timeout: Option<Duration>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let parsed = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
                None => Ok(default),
            }
        };

        let port = u16::try_from(parsed("PORT", 8080)?).context("PORT out of range")?;
        let min_chars = parsed("PROMPT_MIN_CHARS", DEFAULT_MIN_CHARS as u64)? as usize;
        let max_chars = parsed("PROMPT_MAX_CHARS", DEFAULT_MAX_CHARS as u64)? as usize;
        if min_chars == 0 || min_chars > max_chars {
            bail!("PROMPT_MIN_CHARS ({min_chars}) must be at least 1 and not exceed PROMPT_MAX_CHARS ({max_chars})");
        }

        let api_base = lookup("BUILDER_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let api_base = reqwest::Url::parse(&api_base)
            .with_context(|| format!("BUILDER_API_BASE is not a valid URL: {api_base}"))?;

        let asset_base = match lookup("BUILDER_ASSET_BASE") {
            Some(raw) => reqwest::Url::parse(&raw)
                .with_context(|| format!("BUILDER_ASSET_BASE is not a valid URL: {raw}"))?
                .to_string(),
            // images are served from the backend's origin by default
            None => api_base.join("/").context("cannot derive asset base")?.to_string(),
        };

        let timeout_secs = parsed("BUILDER_REQUEST_TIMEOUT_SECS", 0)?;

        Ok(Self {
            port,
            api_base: api_base.to_string(),
            asset_base,
            limits: PromptLimits { min_chars, max_chars },
            request_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
        })
    }
}
