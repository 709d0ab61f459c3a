use super::prompts::{MutationPrompt, QuestionPrompt, ScoringPrompt, SettingsPrompt};
use super::{Oracle, OracleError, OracleResult, OracleScores};
use crate::task::{EvaluationTask, QaPair};
use async_trait::async_trait;
use persona_model::{ChatMessage, ChatRequest, ModelProvider, RetryPolicy};
use std::sync::Arc;
use tracing::{debug, warn};

const JUDGE_SYSTEM_PROMPT: &str =
    "You are a careful evaluator. Follow the requested output format exactly.";

/// Oracle backed by a chat-completion model.
///
/// Every model call goes through the configured [`RetryPolicy`], so a single
/// flaky response costs a retry rather than a failed run.
pub struct LlmOracle {
    provider: Arc<dyn ModelProvider>,
    retry: RetryPolicy,
    model: String,
    scoring_temperature: f32,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            retry: RetryPolicy::default(),
            model,
            scoring_temperature: 0.0,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: String) -> ChatRequest {
        ChatRequest::new(
            self.model.clone(),
            vec![ChatMessage::system(JUDGE_SYSTEM_PROMPT), ChatMessage::user(prompt)],
        )
    }

    async fn complete(
        &self,
        operation: &'static str,
        request: ChatRequest,
    ) -> OracleResult<String> {
        let response = self
            .retry
            .run(operation, || self.provider.chat(request.clone()))
            .await?;

        response
            .text()
            .map(str::to_string)
            .ok_or(OracleError::EmptyOutput { operation })
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn select_settings(
        &self,
        persona: &str,
        candidates: &[String],
    ) -> OracleResult<Vec<String>> {
        let prompt = SettingsPrompt::build(persona, candidates);
        let reply = self.complete("select_settings", self.request(prompt)).await?;
        let settings = SettingsPrompt::parse_response(&reply);
        debug!("Oracle selected {} settings", settings.len());
        Ok(settings)
    }

    async fn generate_questions(
        &self,
        persona: &str,
        settings: &[String],
        task: EvaluationTask,
        count: usize,
    ) -> OracleResult<Vec<String>> {
        let prompt = QuestionPrompt::build(persona, settings, task, count);
        let reply = self
            .complete("generate_questions", self.request(prompt))
            .await?;
        let questions = QuestionPrompt::parse_response(&reply, count);
        if questions.is_empty() {
            return Err(OracleError::Unparseable {
                operation: "generate_questions",
                output: reply,
            });
        }
        if questions.len() < count {
            warn!(
                "Oracle produced {} of {} questions for {}",
                questions.len(),
                count,
                task
            );
        }
        Ok(questions)
    }

    async fn mutate_question(
        &self,
        persona: &str,
        setting: &str,
        template: &str,
    ) -> OracleResult<String> {
        let prompt = MutationPrompt::build(persona, setting, template);
        let reply = self.complete("mutate_question", self.request(prompt)).await?;
        MutationPrompt::parse_response(&reply).ok_or(OracleError::Unparseable {
            operation: "mutate_question",
            output: reply,
        })
    }

    async fn score_answers(
        &self,
        persona: &str,
        task: EvaluationTask,
        rubric: &str,
        qa_pairs: &[QaPair],
    ) -> OracleResult<OracleScores> {
        let mut scores = OracleScores::default();

        for qa in qa_pairs {
            let request = self
                .request(ScoringPrompt::build(persona, task, rubric, qa))
                .with_temperature(self.scoring_temperature)
                .with_json_output();
            let reply = self.complete("score_answers", request).await?;
            let (score, reason) = ScoringPrompt::parse_response(&reply);
            scores.scores.push(score);
            scores.reasons.push(reason);
        }

        Ok(scores)
    }

    fn name(&self) -> &str {
        self.provider.provider_name()
    }
}
