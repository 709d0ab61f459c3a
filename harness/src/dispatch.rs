//! Target agent client: persona discovery and question dispatch over
//! JSON-RPC `message/send`.

use crate::command::TargetAddress;
use crate::task::{EvaluationTask, QaPair, QuestionPlan, TaskAnswers};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const TIMEOUT_ANSWER: &str = "Error: Timed out waiting for target agent to respond.";

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Invalid dispatch configuration: {0}")]
    InvalidConfig(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Timed out fetching persona profile")]
    Timeout,

    #[error("Profile request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Profile response has no persona_description")]
    MissingPersona,
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

impl From<reqwest::Error> for DiscoveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DiscoveryError::Timeout
        } else {
            DiscoveryError::Transport(err)
        }
    }
}

/// How a question is packed into the outgoing message.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum RequestShape {
    /// A single text part holding the question.
    #[default]
    QuestionOnly,
    /// Two text parts: the persona, then the question.
    PersonaAndQuestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub request_timeout: Duration,
    pub discovery_timeout: Duration,
    pub shape: RequestShape,
    /// Tasks dispatched at the same time; questions within a task are
    /// always sent one after another.
    pub max_concurrent_tasks: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(180),
            discovery_timeout: Duration::from_secs(60),
            shape: RequestShape::QuestionOnly,
            max_concurrent_tasks: 1,
        }
    }
}

impl DispatchConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn with_shape(mut self, shape: RequestShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_max_concurrent_tasks(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.request_timeout.is_zero() {
            return Err("request_timeout must be greater than 0".to_string());
        }
        if self.discovery_timeout.is_zero() {
            return Err("discovery_timeout must be greater than 0".to_string());
        }
        if self.max_concurrent_tasks == 0 {
            return Err("max_concurrent_tasks must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Client for one target agent.
///
/// Cloning shares the underlying connection pool, which is how the benchmark
/// runner keeps a single session across personas.
#[derive(Debug, Clone)]
pub struct DispatchClient {
    client: reqwest::Client,
    target: TargetAddress,
    config: DispatchConfig,
}

impl DispatchClient {
    pub fn new(target: TargetAddress, config: DispatchConfig) -> DispatchResult<Self> {
        config.validate().map_err(DispatchError::InvalidConfig)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(DispatchError::Client)?;
        Ok(Self {
            client,
            target,
            config,
        })
    }

    pub fn target(&self) -> &TargetAddress {
        &self.target
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Same session, different request shape.
    pub fn with_shape(mut self, shape: RequestShape) -> Self {
        self.config.shape = shape;
        self
    }

    /// Fetch `persona_description` from the target's profile endpoint.
    pub async fn discover_persona(&self) -> DiscoveryResult<String> {
        let url = self.target.profile_url();
        debug!("Fetching persona from {}", url);

        let profile: Value = self
            .client
            .get(&url)
            .timeout(self.config.discovery_timeout)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match profile.get("persona_description").and_then(Value::as_str) {
            Some(persona) if !persona.trim().is_empty() => Ok(persona.to_string()),
            _ => Err(DiscoveryError::MissingPersona),
        }
    }

    /// Ask every planned question and collect the answers.
    ///
    /// Never fails: a question whose call times out or errors keeps its slot
    /// with an error string as the answer.
    pub async fn send(&self, persona: &str, plan: &QuestionPlan) -> TaskAnswers {
        info!(
            "Dispatching {} questions across {} tasks to {}",
            plan.len(),
            plan.task_count(),
            self.target
        );

        stream::iter(plan.iter())
            .map(|(task, questions)| async move {
                (task, self.ask_task(persona, task, questions).await)
            })
            .buffered(self.config.max_concurrent_tasks.max(1))
            .collect::<TaskAnswers>()
            .await
    }

    async fn ask_task(
        &self,
        persona: &str,
        task: EvaluationTask,
        questions: &[String],
    ) -> Vec<QaPair> {
        let mut answers = Vec::with_capacity(questions.len());
        for (index, question) in questions.iter().enumerate() {
            debug!("Sending {} question {}/{}", task, index + 1, questions.len());
            let answer = self.ask(persona, question).await;
            answers.push(QaPair::new(question.clone(), answer));
        }
        answers
    }

    /// Send one question. Failures come back as descriptive answer text.
    pub async fn ask(&self, persona: &str, question: &str) -> String {
        let payload = build_message(self.config.shape, persona, question);

        let response = self
            .client
            .post(self.target.rpc_url())
            .timeout(self.config.request_timeout)
            .json(&payload)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        let body = match response {
            Ok(response) => response.json::<Value>().await,
            Err(e) => Err(e),
        };

        match body {
            Ok(body) => extract_answer(&body),
            Err(e) if e.is_timeout() => {
                warn!("Target agent timed out");
                TIMEOUT_ANSWER.to_string()
            }
            Err(e) => {
                warn!("Failed to reach target agent: {}", e);
                format!("Error during communication: {}", e)
            }
        }
    }
}

/// JSON-RPC 2.0 `message/send` envelope for one question.
pub fn build_message(shape: RequestShape, persona: &str, question: &str) -> Value {
    let parts = match shape {
        RequestShape::QuestionOnly => vec![json!({"kind": "text", "text": question})],
        RequestShape::PersonaAndQuestion => vec![
            json!({"kind": "text", "text": persona}),
            json!({"kind": "text", "text": question}),
        ],
    };

    json!({
        "jsonrpc": "2.0",
        "method": "message/send",
        "id": Uuid::new_v4().to_string(),
        "params": {
            "message": {
                "messageId": Uuid::new_v4().to_string(),
                "role": "user",
                "parts": parts,
            }
        }
    })
}

/// Answer text from a JSON-RPC reply.
///
/// Message-shaped results carry `parts` directly; task-shaped results carry
/// them under `status.message` or in `artifacts`.
pub fn extract_answer(body: &Value) -> String {
    if let Some(result) = body.get("result") {
        let text = first_text(result.get("parts"))
            .or_else(|| first_text(result.pointer("/status/message/parts")))
            .or_else(|| {
                result
                    .get("artifacts")
                    .and_then(Value::as_array)
                    .and_then(|artifacts| {
                        artifacts
                            .iter()
                            .find_map(|artifact| first_text(artifact.get("parts")))
                    })
            });
        if let Some(text) = text {
            return text.to_string();
        }
    }

    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Error");
        return format!("Error from agent: {}", message);
    }

    format!("Error: Malformed response: {}", body)
}

fn first_text(parts: Option<&Value>) -> Option<&str> {
    parts?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
}
