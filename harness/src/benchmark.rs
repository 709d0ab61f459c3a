//! Benchmark sweep over a persona corpus with pre-built questions.

use crate::bank::StaticQuestionStore;
use crate::command::TargetAddress;
use crate::dispatch::{DispatchClient, DispatchConfig, DispatchError};
use crate::oracle::Oracle;
use crate::orchestrator::{EvaluationOrchestrator, RunMode};
use crate::planner::PlannerConfig;
use crate::report::{BenchmarkReport, RunOutcome};
use crate::specialist::SpecialistRegistry;
use crate::task::EvaluationTask;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum BenchmarkError {
    #[error("Failed to read persona corpus {path}: {source}")]
    CorpusIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid persona corpus {path}: {source}")]
    CorpusParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Benchmark cancelled after {completed} personas")]
    Cancelled { completed: usize },
}

pub type BenchmarkResult<T> = Result<T, BenchmarkError>;

/// Ordered list of persona descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaCorpus {
    personas: Vec<String>,
}

impl PersonaCorpus {
    pub fn from_personas<I, S>(personas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            personas: personas.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a JSON array of persona strings.
    pub fn load(path: &Path) -> BenchmarkResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| BenchmarkError::CorpusIo {
            path: path.to_path_buf(),
            source,
        })?;
        let personas: Vec<String> =
            serde_json::from_str(&raw).map_err(|source| BenchmarkError::CorpusParse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self { personas })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.personas.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

pub struct BenchmarkRunner {
    oracle: Arc<dyn Oracle>,
    registry: Arc<SpecialistRegistry>,
    store: StaticQuestionStore,
    rubrics_root: PathBuf,
    dispatch_config: DispatchConfig,
    cancel: CancellationToken,
}

impl BenchmarkRunner {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: StaticQuestionStore,
        rubrics_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            oracle,
            registry: Arc::new(SpecialistRegistry::new()),
            store,
            rubrics_root: rubrics_root.into(),
            dispatch_config: DispatchConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch_config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Evaluate every persona in `corpus` against `target`.
    ///
    /// A persona without stored questions, or whose cycle fails, scores `0`
    /// and the sweep moves on. One dispatch session serves the whole sweep.
    pub async fn run(
        &self,
        target: TargetAddress,
        corpus: &PersonaCorpus,
    ) -> BenchmarkResult<BenchmarkReport> {
        info!(
            "Starting static benchmark on {} with {} personas",
            target,
            corpus.len()
        );

        let session = DispatchClient::new(target, self.dispatch_config.clone())?;
        let mut persona_scores: BTreeMap<String, f64> = BTreeMap::new();
        let mut task_samples: BTreeMap<EvaluationTask, Vec<f64>> = BTreeMap::new();

        for (index, persona) in corpus.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Benchmark cancelled");
                return Err(BenchmarkError::Cancelled { completed: index });
            }
            info!(
                "[{}/{}] Processing: {}",
                index + 1,
                corpus.len(),
                persona.chars().take(40).collect::<String>()
            );

            let plan = match self.store.load(persona) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!("Failed to load questions: {}", e);
                    persona_scores.insert(persona.to_string(), 0.0);
                    continue;
                }
            };

            let mut orchestrator = EvaluationOrchestrator::new(
                self.registry.clone(),
                self.oracle.clone(),
                session.clone(),
                PlannerConfig::default(),
                self.rubrics_root.clone(),
            )
            .with_cancellation(self.cancel.child_token());

            let outcome = orchestrator
                .run(RunMode::Static {
                    persona: persona.to_string(),
                    plan,
                })
                .await;

            match outcome {
                RunOutcome::Completed(report) => {
                    info!("Score: {:.2}", report.overall_score);
                    for (task, average) in report.task_averages() {
                        task_samples.entry(task).or_default().push(average);
                    }
                    persona_scores.insert(persona.to_string(), report.overall_score);
                }
                RunOutcome::Failed(failure) => {
                    if failure.is_cancelled() {
                        return Err(BenchmarkError::Cancelled { completed: index });
                    }
                    warn!("Cycle failed for persona: {}", failure.error);
                    persona_scores.insert(persona.to_string(), 0.0);
                }
            }
        }

        drop(session);
        Ok(BenchmarkReport::build(
            corpus.len(),
            persona_scores,
            &task_samples,
        ))
    }
}
