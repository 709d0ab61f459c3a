//! Turns collected answers into per-task score records via the oracle.

use crate::oracle::{Oracle, OracleError};
use crate::rubric::{RubricError, RubricSet};
use crate::task::{EvaluationTask, QaPair, TaskAnswers};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ScoringError {
    #[error(transparent)]
    Rubric(#[from] RubricError),

    #[error("Oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("Oracle returned {actual} scores for {expected} answers")]
    LengthMismatch { expected: usize, actual: usize },
}

pub type ScoringResult<T> = Result<T, ScoringError>;

/// A single score as produced by the oracle.
///
/// Replies the oracle could not turn into a number are kept as text so the
/// record stays aligned with its QA pairs; aggregation ignores them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Numeric(f64),
    Unparsed(String),
}

impl ScoreValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Numeric(value) if value.is_finite() => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub scores: Vec<ScoreValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl ScoreRecord {
    pub fn numeric_scores(&self) -> impl Iterator<Item = f64> + '_ {
        self.scores.iter().filter_map(ScoreValue::as_f64)
    }

    /// Mean of the numeric scores, `None` when there are none.
    pub fn average(&self) -> Option<f64> {
        let values: Vec<f64> = self.numeric_scores().collect();
        crate::report::mean(&values)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Scoring outcome for one run: records for tasks that scored, the error
/// text for tasks that did not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreSheet {
    pub records: BTreeMap<EvaluationTask, ScoreRecord>,
    pub failures: BTreeMap<EvaluationTask, String>,
}

impl ScoreSheet {
    pub fn record(&self, task: EvaluationTask) -> Option<&ScoreRecord> {
        self.records.get(&task)
    }
}

pub struct ScorerAdapter {
    oracle: Arc<dyn Oracle>,
}

impl ScorerAdapter {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Score every task in `answers`. A failure in one task is recorded in
    /// the sheet and does not affect the others.
    pub async fn score(
        &self,
        persona: &str,
        answers: &TaskAnswers,
        rubrics: &RubricSet,
    ) -> ScoreSheet {
        let mut sheet = ScoreSheet::default();

        for (task, qa_pairs) in answers {
            match self.score_task(persona, *task, qa_pairs, rubrics).await {
                Ok(record) => {
                    debug!("Scored {} answers for {}", record.len(), task);
                    sheet.records.insert(*task, record);
                }
                Err(e) => {
                    warn!("Scoring failed for {}: {}", task, e);
                    sheet.failures.insert(*task, e.to_string());
                }
            }
        }

        info!(
            "Scored {} tasks ({} failed)",
            sheet.records.len(),
            sheet.failures.len()
        );
        sheet
    }

    pub async fn score_task(
        &self,
        persona: &str,
        task: EvaluationTask,
        qa_pairs: &[QaPair],
        rubrics: &RubricSet,
    ) -> ScoringResult<ScoreRecord> {
        if qa_pairs.is_empty() {
            return Ok(ScoreRecord::default());
        }

        let rubric = rubrics.get(task)?;
        let output = self
            .oracle
            .score_answers(persona, task, rubric, qa_pairs)
            .await?;

        if output.scores.len() != qa_pairs.len() {
            return Err(ScoringError::LengthMismatch {
                expected: qa_pairs.len(),
                actual: output.scores.len(),
            });
        }

        let reasons = if output.reasons.len() == output.scores.len() {
            output.reasons
        } else {
            Vec::new()
        };

        Ok(ScoreRecord {
            scores: output.scores,
            reasons,
        })
    }
}
