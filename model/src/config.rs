use crate::provider::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for an OpenAI-compatible chat completions endpoint.
///
/// The API key is never serialized, so a config can be logged or dumped
/// without leaking it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub default_model: String,
    pub default_temperature: f32,
    pub default_top_p: f32,
    pub default_max_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            default_model: "gpt-4o-mini".to_string(),
            default_temperature: 0.9,
            default_top_p: 0.9,
            default_max_tokens: Some(3000),
        }
    }
}

impl ProviderConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.default_temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = Some(max_tokens);
        self
    }

    /// `base_url` with any trailing slash removed and `path` appended.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> ModelResult<()> {
        let invalid = |msg: &str| Err(ModelError::InvalidConfig(msg.to_string()));

        let url = self.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return invalid("base_url must start with http:// or https://");
        }
        if self.default_model.trim().is_empty() {
            return invalid("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return invalid("temperature must be between 0.0 and 2.0");
        }
        if !(0.0..=1.0).contains(&self.default_top_p) {
            return invalid("top_p must be between 0.0 and 1.0");
        }
        if self.default_max_tokens == Some(0) {
            return invalid("max_tokens must be greater than 0");
        }
        if self.timeout.is_zero() {
            return invalid("timeout must be greater than 0");
        }
        Ok(())
    }
}
