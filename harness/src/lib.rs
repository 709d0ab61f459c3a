pub mod bank;
pub mod benchmark;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod oracle;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod rubric;
pub mod scorer;
pub mod specialist;
pub mod task;

pub use bank::{persona_slug, BankError, QuestionTemplate, StaticQuestionStore, TemplateBank};
pub use benchmark::{BenchmarkError, BenchmarkResult, BenchmarkRunner, PersonaCorpus};
pub use command::{CommandError, EvaluationCommand, EvaluationRequest, TargetAddress};
pub use config::{ConfigError, ConfigResult, HarnessConfig};
pub use dispatch::{
    DiscoveryError, DispatchClient, DispatchConfig, DispatchError, RequestShape, TIMEOUT_ANSWER,
};
pub use oracle::{LlmOracle, Oracle, OracleError, OracleResult, OracleScores};
pub use orchestrator::{
    EvaluationOrchestrator, OrchestratorError, RunMode, RunState, PLACEHOLDER_PERSONA,
};
pub use planner::{PlannerConfig, PlanningError, QuestionPlanner};
pub use report::{BenchmarkReport, EvaluationReport, FailureReport, RunOutcome, TaskStat};
pub use rubric::{RubricError, RubricSet};
pub use scorer::{ScoreRecord, ScoreSheet, ScoreValue, ScorerAdapter, ScoringError};
pub use specialist::{RegistryError, SpecialistProfile, SpecialistRegistry};
pub use task::{EvaluationTask, QaPair, QuestionPlan, TaskAnswers};
