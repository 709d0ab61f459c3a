pub mod config;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod types;

pub use config::ProviderConfig;
pub use openai::OpenAiProvider;
pub use provider::{ModelError, ModelProvider, ModelResult};
pub use retry::RetryPolicy;
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, OutputFormat,
    TokenUsage,
};
