//! Aggregation helpers and the report types a run produces.

use crate::scorer::{ScoreRecord, ScoreSheet};
use crate::task::EvaluationTask;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

pub const BENCHMARK_SUMMARY: &str = "Static Benchmark Complete";

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation. Fewer than two values give `0.0`.
pub fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Mean of every numeric score across all records, `0.0` when there are none.
pub fn overall_score<'a, I>(records: I) -> f64
where
    I: IntoIterator<Item = &'a ScoreRecord>,
{
    let values: Vec<f64> = records
        .into_iter()
        .flat_map(ScoreRecord::numeric_scores)
        .collect();
    mean(&values).unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean and spread of one task across benchmark personas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskStat {
    Summary { mean: f64, stdev: f64 },
    NotAvailable,
}

impl TaskStat {
    pub fn from_samples(values: &[f64]) -> Self {
        match mean(values) {
            Some(mean) => TaskStat::Summary {
                mean,
                stdev: sample_stdev(values),
            },
            None => TaskStat::NotAvailable,
        }
    }
}

impl fmt::Display for TaskStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStat::Summary { mean, stdev } => write!(f, "{:.2} ± {:.2}", mean, stdev),
            TaskStat::NotAvailable => f.write_str("N/A"),
        }
    }
}

impl Serialize for TaskStat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of a completed evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub persona: String,
    pub overall_score: f64,
    pub per_task: BTreeMap<EvaluationTask, ScoreRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub scoring_failures: BTreeMap<EvaluationTask, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialist: Option<String>,
    pub rubric_set: String,
    pub degraded_discovery: bool,
    pub question_count: usize,
    pub completed_at: DateTime<Utc>,
}

impl EvaluationReport {
    /// Build a report from a score sheet; failed tasks stay out of the score.
    pub fn from_sheet(persona: impl Into<String>, sheet: ScoreSheet) -> Self {
        Self {
            persona: persona.into(),
            overall_score: overall_score(sheet.records.values()),
            per_task: sheet.records,
            scoring_failures: sheet.failures,
            specialist: None,
            rubric_set: String::new(),
            degraded_discovery: false,
            question_count: 0,
            completed_at: Utc::now(),
        }
    }

    /// Mean of each task's numeric scores, for tasks that have any.
    pub fn task_averages(&self) -> BTreeMap<EvaluationTask, f64> {
        self.per_task
            .iter()
            .filter_map(|(task, record)| record.average().map(|avg| (*task, avg)))
            .collect()
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        write!(f, "Evaluation Complete. Final Scores: {}", json)
    }
}

/// What is left of a run that errored, panicked, or was cancelled.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub error: String,
    pub failed_state: String,
    pub backtrace: String,
    pub failed_at: DateTime<Utc>,
}

impl FailureReport {
    pub fn new(error: impl Into<String>, failed_state: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            failed_state: failed_state.into(),
            backtrace: std::backtrace::Backtrace::force_capture().to_string(),
            failed_at: Utc::now(),
        }
    }

    /// Replace the catch-site backtrace with one taken where the fault was.
    pub fn with_backtrace(mut self, backtrace: impl Into<String>) -> Self {
        self.backtrace = backtrace.into();
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.error == crate::orchestrator::CANCELLED
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EVALUATION RUN FAILED:\n{}\n\nFAILED IN STATE: {}\n\nBACKTRACE:\n{}",
            self.error, self.failed_state, self.backtrace
        )
    }
}

/// Every run ends with exactly one of these.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(EvaluationReport),
    Failed(FailureReport),
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }

    pub fn report(&self) -> Option<&EvaluationReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReport> {
        match self {
            RunOutcome::Completed(_) => None,
            RunOutcome::Failed(failure) => Some(failure),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed(report) => report.fmt(f),
            RunOutcome::Failed(failure) => failure.fmt(f),
        }
    }
}

/// Population statistics over a benchmark corpus.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub summary: String,
    pub total_personas: usize,
    pub average_benchmark_score: f64,
    pub task_breakdown: BTreeMap<EvaluationTask, TaskStat>,
    pub persona_details: BTreeMap<String, f64>,
}

impl BenchmarkReport {
    /// `persona_scores` holds one entry per processed persona (zero for the
    /// ones that could not be evaluated); `task_samples` holds, per task, one
    /// average per persona that produced numeric scores for it.
    pub fn build(
        total_personas: usize,
        persona_scores: BTreeMap<String, f64>,
        task_samples: &BTreeMap<EvaluationTask, Vec<f64>>,
    ) -> Self {
        let values: Vec<f64> = persona_scores.values().copied().collect();
        let task_breakdown = EvaluationTask::ALL
            .into_iter()
            .map(|task| {
                let samples = task_samples.get(&task).map(Vec::as_slice).unwrap_or(&[]);
                (task, TaskStat::from_samples(samples))
            })
            .collect();

        Self {
            summary: BENCHMARK_SUMMARY.to_string(),
            total_personas,
            average_benchmark_score: round2(mean(&values).unwrap_or(0.0)),
            task_breakdown,
            persona_details: persona_scores,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
