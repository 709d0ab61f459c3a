use crate::config::ProviderConfig;
use crate::provider::{ModelError, ModelProvider, ModelResult};
use crate::types::{
    ChatMessage, ChatRequest, ChatResponse, Choice, FinishReason, MessageRole, OutputFormat,
    TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

const CHAT_PATH: &str = "v1/chat/completions";
const MODELS_PATH: &str = "v1/models";

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Provider for any endpoint speaking the OpenAI chat completions protocol.
pub struct OpenAiProvider {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> ModelResult<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ModelError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn wire_request<'a>(&self, request: &'a ChatRequest) -> WireRequest<'a> {
        WireRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature.unwrap_or(self.config.default_temperature),
            top_p: request.top_p.unwrap_or(self.config.default_top_p),
            max_tokens: request.max_tokens.or(self.config.default_max_tokens),
            response_format: match request.format {
                OutputFormat::Text => None,
                OutputFormat::JsonObject => Some(WireFormat {
                    kind: "json_object",
                }),
            },
        }
    }

    fn finish_reason(reason: Option<&str>) -> Option<FinishReason> {
        reason.map(|r| match r {
            "length" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else if err.is_connect() {
            ModelError::Unreachable(err.to_string())
        } else {
            ModelError::Transport(err)
        }
    }

    fn status_error(status: reqwest::StatusCode, body: String) -> ModelError {
        match status.as_u16() {
            401 | 403 => ModelError::Authentication,
            429 => ModelError::RateLimit,
            code => ModelError::Status { status: code, body },
        }
    }

    fn decode_response(wire: WireResponse) -> ModelResult<ChatResponse> {
        if wire.choices.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let choices = wire
            .choices
            .into_iter()
            .map(|choice| Choice {
                message: ChatMessage {
                    role: MessageRole::Assistant,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: Self::finish_reason(choice.finish_reason.as_deref()),
            })
            .collect();

        Ok(ChatResponse {
            choices,
            usage: wire.usage.map(|u| TokenUsage {
                prompt: u.prompt_tokens,
                completion: u.completion_tokens,
            }),
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn chat(&self, request: ChatRequest) -> ModelResult<ChatResponse> {
        debug!(
            "Chat request to {} ({} messages)",
            request.model,
            request.messages.len()
        );

        let http_response = self
            .authorized(self.client.post(self.config.endpoint(CHAT_PATH)))
            .json(&self.wire_request(&request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = http_response.status();
        if !status.is_success() {
            let body = http_response.text().await.unwrap_or_default();
            warn!("Model endpoint returned {} for {}", status, request.model);
            return Err(Self::status_error(status, body));
        }

        let raw = http_response.text().await.map_err(|e| self.transport_error(e))?;
        let wire: WireResponse = serde_json::from_str(&raw)?;
        let response = Self::decode_response(wire)?;

        if let Some(usage) = response.usage {
            debug!("Chat request used {} tokens", usage.total());
        }
        if response.is_truncated() {
            warn!("Model output for {} was truncated", request.model);
        }

        Ok(response)
    }

    async fn health_check(&self) -> ModelResult<()> {
        let response = self
            .authorized(self.client.get(self.config.endpoint(MODELS_PATH)))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            debug!("Health check passed");
            Ok(())
        } else {
            error!("Health check failed with status: {}", status);
            let body = response.text().await.unwrap_or_default();
            Err(Self::status_error(status, body))
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.config.default_model
    }
}
