//! The language-model oracle used for settings selection, question
//! generation and mutation, and rubric scoring.

pub mod llm;
pub mod prompts;

pub use llm::LlmOracle;

use crate::scorer::ScoreValue;
use crate::task::{EvaluationTask, QaPair};
use async_trait::async_trait;
use persona_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("Oracle returned no usable output for {operation}")]
    EmptyOutput { operation: &'static str },

    #[error("Could not parse oracle output for {operation}: {output}")]
    Unparseable {
        operation: &'static str,
        output: String,
    },
}

pub type OracleResult<T> = Result<T, OracleError>;

/// Scores for one task, in the same order as the QA pairs that were scored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OracleScores {
    pub scores: Vec<ScoreValue>,
    pub reasons: Vec<String>,
}

impl OracleScores {
    pub fn numeric<I: IntoIterator<Item = f64>>(scores: I) -> Self {
        Self {
            scores: scores.into_iter().map(ScoreValue::Numeric).collect(),
            reasons: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Everything the harness asks of a language model.
///
/// Implementations are shared by reference across a run; retry and timeout
/// behaviour belongs to the implementation.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Pick the settings from `candidates` that suit the persona.
    async fn select_settings(&self, persona: &str, candidates: &[String])
        -> OracleResult<Vec<String>>;

    /// Generate `count` fresh questions for `task`.
    async fn generate_questions(
        &self,
        persona: &str,
        settings: &[String],
        task: EvaluationTask,
        count: usize,
    ) -> OracleResult<Vec<String>>;

    /// Rewrite a bank template into a question tailored to persona and setting.
    async fn mutate_question(
        &self,
        persona: &str,
        setting: &str,
        template: &str,
    ) -> OracleResult<String>;

    /// Score every answer of one task against its rubric.
    async fn score_answers(
        &self,
        persona: &str,
        task: EvaluationTask,
        rubric: &str,
        qa_pairs: &[QaPair],
    ) -> OracleResult<OracleScores>;

    fn name(&self) -> &str;
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted oracle for unit tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeOracle {
        pub settings: Vec<String>,
        pub fail_settings: bool,
        pub scores: HashMap<EvaluationTask, Vec<f64>>,
        pub failing_tasks: Vec<EvaluationTask>,
        pub short_tasks: Vec<EvaluationTask>,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeOracle {
        pub fn new() -> Self {
            Self {
                settings: vec!["a hospital ward".to_string()],
                ..Default::default()
            }
        }

        pub fn with_scores(mut self, task: EvaluationTask, scores: Vec<f64>) -> Self {
            self.scores.insert(task, scores);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl Oracle for FakeOracle {
        async fn select_settings(
            &self,
            _persona: &str,
            candidates: &[String],
        ) -> OracleResult<Vec<String>> {
            self.record(format!("select_settings:{}", candidates.len()));
            if self.fail_settings {
                return Err(OracleError::EmptyOutput {
                    operation: "select_settings",
                });
            }
            Ok(self.settings.clone())
        }

        async fn generate_questions(
            &self,
            _persona: &str,
            _settings: &[String],
            task: EvaluationTask,
            count: usize,
        ) -> OracleResult<Vec<String>> {
            self.record(format!("generate:{}", task));
            Ok((1..=count).map(|i| format!("{} question {}", task, i)).collect())
        }

        async fn mutate_question(
            &self,
            _persona: &str,
            setting: &str,
            template: &str,
        ) -> OracleResult<String> {
            self.record(format!("mutate:{}", template));
            Ok(format!("{} [{}]", template, setting))
        }

        async fn score_answers(
            &self,
            _persona: &str,
            task: EvaluationTask,
            _rubric: &str,
            qa_pairs: &[QaPair],
        ) -> OracleResult<OracleScores> {
            self.record(format!("score:{}", task));
            if self.failing_tasks.contains(&task) {
                return Err(OracleError::EmptyOutput {
                    operation: "score_answers",
                });
            }
            let mut scores = self
                .scores
                .get(&task)
                .cloned()
                .unwrap_or_else(|| vec![3.0; qa_pairs.len()]);
            if self.short_tasks.contains(&task) {
                scores.pop();
            }
            Ok(OracleScores::numeric(scores))
        }

        fn name(&self) -> &str {
            "fake"
        }
    }
}
