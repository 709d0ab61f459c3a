use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Could not decode model response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid provider configuration: {0}")]
    InvalidConfig(String),

    #[error("Model endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication rejected by model endpoint")]
    Authentication,

    #[error("Model returned no choices")]
    EmptyResponse,
}

impl ModelError {
    /// Whether repeating the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(_)
            | ModelError::Unreachable(_)
            | ModelError::Timeout { .. }
            | ModelError::RateLimit
            | ModelError::EmptyResponse => true,
            ModelError::Status { status, .. } => *status >= 500,
            ModelError::Decode(_) | ModelError::InvalidConfig(_) | ModelError::Authentication => {
                false
            }
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;

/// A chat-completion backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse>;

    async fn health_check(&self) -> ModelResult<()>;

    fn provider_name(&self) -> &'static str;

    /// Model used when the caller does not name one.
    fn default_model(&self) -> &str;
}
