use std::time::Duration;

use crate::errors::EngineError;

use super::options::OpenAiReasoningEffort;

/// Model used when `CHAT_RELAY_MODEL` is unset.
pub const DEFAULT_MODEL: &str = "gpt-5-nano";

/// Configuration for the OpenAI-backed engine.
#[derive(Clone, Debug)]
pub struct OpenAiEngineConfig {
    /// API key used for bearer auth.
    pub api_key: String,
    /// Base URL for the OpenAI-compatible endpoint.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Bounds connection setup. The response stream itself is not time-limited;
    /// generation deadlines belong to the orchestrator.
    pub connect_timeout: Duration,
    /// Optional reasoning effort hint. When set, reasoning summaries are
    /// requested and arrive on the `reasoning` stage.
    pub reasoning_effort: Option<OpenAiReasoningEffort>,
}

impl OpenAiEngineConfig {
    /// Creates a config with sensible defaults and a provided API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com".to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(30),
            reasoning_effort: None,
        }
    }

    /// Builds a config from `OPENAI_API_KEY`, with optional `OPENAI_BASE_URL`,
    /// `CHAT_RELAY_MODEL` and `CHAT_RELAY_REASONING_EFFORT` overrides.
    pub fn from_env() -> Result<Self, EngineError> {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(EngineError::Config(
                "missing OPENAI_API_KEY for OpenAI engine".into(),
            ));
        }
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL")
            && !base_url.trim().is_empty()
        {
            config = config.base_url(base_url);
        }
        if let Ok(model) = std::env::var("CHAT_RELAY_MODEL")
            && !model.trim().is_empty()
        {
            config = config.model(model);
        }
        if let Ok(effort) = std::env::var("CHAT_RELAY_REASONING_EFFORT")
            && !effort.trim().is_empty()
        {
            config = config.reasoning_effort(effort.parse().map_err(EngineError::Config)?);
        }
        Ok(config)
    }

    /// Overrides the API base URL (for proxies or test servers).
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn reasoning_effort(mut self, effort: OpenAiReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    pub(crate) fn responses_url(&self) -> String {
        format!("{}/v1/responses", self.base_url.trim_end_matches('/'))
    }
}
