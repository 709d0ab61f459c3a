//! Evaluation orchestrator
//!
//! Drives one evaluation run through a fixed sequence of states:
//!
//! 1. DiscoverPersona: fetch the persona from the target's profile endpoint
//! 2. DegradedDiscovery: entered instead when discovery fails; the run goes
//!    on with a placeholder persona
//! 3. PlanQuestions: match a specialist, then plan questions
//! 4. Dispatch: ask every question
//! 5. Score: grade the answers against the resolved rubric set
//! 6. Aggregate: build the report
//! 7. Done
//!
//! Any error, panic or cancellation ends the run in `Failed` with a failure
//! report. [`EvaluationOrchestrator::run`] itself never fails.

use crate::dispatch::DispatchClient;
use crate::oracle::Oracle;
use crate::planner::{PlannerConfig, PlanningError, QuestionPlanner};
use crate::report::{EvaluationReport, FailureReport, RunOutcome};
use crate::rubric::{resolve_rubric_dir, RubricSet};
use crate::scorer::{ScoreSheet, ScorerAdapter};
use crate::specialist::{SpecialistProfile, SpecialistRegistry};
use crate::task::{QuestionPlan, TaskAnswers};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const CANCELLED: &str = "cancelled";

/// Persona used when the target's profile cannot be fetched.
pub const PLACEHOLDER_PERSONA: &str = "Error: Could not retrieve persona.";

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("cancelled")]
    Cancelled,

    #[error("Run reached failed state: {0}")]
    StateError(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunState {
    DiscoverPersona,
    DegradedDiscovery,
    PlanQuestions,
    Dispatch,
    Score,
    Aggregate,
    Done,
    Failed(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed(_))
    }
}

/// What a run starts from.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Discover the persona and plan questions, specialist-aware.
    Live,
    /// Persona and questions are already known; starts at dispatch and
    /// scores against the general rubric set.
    Static { persona: String, plan: QuestionPlan },
}

#[derive(Debug, Default)]
struct RunContext {
    persona: String,
    degraded: bool,
    specialist: Option<SpecialistProfile>,
    plan: QuestionPlan,
    answers: TaskAnswers,
    rubric_dir: PathBuf,
    sheet: ScoreSheet,
    report: Option<EvaluationReport>,
}

/// One instance per run. Owns its dispatch session and planner.
pub struct EvaluationOrchestrator {
    registry: Arc<SpecialistRegistry>,
    dispatch: DispatchClient,
    planner: QuestionPlanner,
    scorer: ScorerAdapter,
    rubrics_root: PathBuf,
    state: RunState,
    history: Vec<RunState>,
    cancel: CancellationToken,
}

impl EvaluationOrchestrator {
    pub fn new(
        registry: Arc<SpecialistRegistry>,
        oracle: Arc<dyn Oracle>,
        dispatch: DispatchClient,
        planner_config: PlannerConfig,
        rubrics_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            dispatch,
            planner: QuestionPlanner::new(oracle.clone(), planner_config),
            scorer: ScorerAdapter::new(oracle),
            rubrics_root: rubrics_root.into(),
            state: RunState::DiscoverPersona,
            history: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned token, e.g. one tied to Ctrl-C.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Every state entered during the last run, in order.
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run to completion. Errors and panics become [`RunOutcome::Failed`].
    pub async fn run(&mut self, mode: RunMode) -> RunOutcome {
        install_panic_hook();
        take_panic_site();
        let outcome = AssertUnwindSafe(self.drive(mode)).catch_unwind().await;

        match outcome {
            Ok(Ok(report)) => {
                info!("Evaluation complete: overall score {:.2}", report.overall_score);
                RunOutcome::Completed(report)
            }
            Ok(Err(e)) => self.fail(e.to_string(), None),
            Err(payload) => {
                let message = panic_message(&*payload);
                match take_panic_site() {
                    Some(site) => self.fail(
                        format!("run panicked at {}: {}", site.location, message),
                        Some(site.backtrace),
                    ),
                    None => self.fail(format!("run panicked: {}", message), None),
                }
            }
        }
    }

    fn fail(&mut self, message: String, backtrace: Option<String>) -> RunOutcome {
        let failed_in = format!("{:?}", self.state);
        error!("Evaluation failed in {}: {}", failed_in, message);
        self.transition_to(RunState::Failed(message.clone()));
        let mut failure = FailureReport::new(message, failed_in);
        if let Some(backtrace) = backtrace {
            failure = failure.with_backtrace(backtrace);
        }
        RunOutcome::Failed(failure)
    }

    async fn drive(&mut self, mode: RunMode) -> OrchestratorResult<EvaluationReport> {
        let mut ctx = RunContext::default();
        self.history.clear();

        let initial = match mode {
            RunMode::Live => RunState::DiscoverPersona,
            RunMode::Static { persona, plan } => {
                ctx.persona = persona;
                ctx.plan = plan;
                RunState::Dispatch
            }
        };
        self.state = initial.clone();
        self.history.push(initial);

        loop {
            if self.cancel.is_cancelled() && !self.state.is_terminal() {
                return Err(OrchestratorError::Cancelled);
            }

            match &self.state {
                RunState::DiscoverPersona => {
                    match guard(&self.cancel, self.dispatch.discover_persona()).await? {
                        Ok(persona) => {
                            info!("Discovered persona: '{}'", preview(&persona));
                            ctx.persona = persona;
                            self.transition_to(RunState::PlanQuestions);
                        }
                        Err(e) => {
                            warn!("Persona discovery failed, continuing degraded: {}", e);
                            ctx.persona = PLACEHOLDER_PERSONA.to_string();
                            ctx.degraded = true;
                            self.transition_to(RunState::DegradedDiscovery);
                        }
                    }
                }
                RunState::DegradedDiscovery => {
                    self.transition_to(RunState::PlanQuestions);
                }
                RunState::PlanQuestions => {
                    ctx.specialist = self.registry.find(&ctx.persona).cloned();
                    if let Some(profile) = &ctx.specialist {
                        info!("Specialist '{}' detected", profile.domain_name);
                    }
                    ctx.plan = guard(
                        &self.cancel,
                        self.planner.plan(&ctx.persona, ctx.specialist.as_ref()),
                    )
                    .await??;
                    self.transition_to(RunState::Dispatch);
                }
                RunState::Dispatch => {
                    ctx.answers =
                        guard(&self.cancel, self.dispatch.send(&ctx.persona, &ctx.plan)).await?;
                    self.transition_to(RunState::Score);
                }
                RunState::Score => {
                    ctx.rubric_dir =
                        resolve_rubric_dir(&self.rubrics_root, ctx.specialist.as_ref());
                    info!("Using rubrics from {}", ctx.rubric_dir.display());
                    let rubrics = RubricSet::load(&ctx.rubric_dir);
                    ctx.sheet = guard(
                        &self.cancel,
                        self.scorer.score(&ctx.persona, &ctx.answers, &rubrics),
                    )
                    .await?;
                    self.transition_to(RunState::Aggregate);
                }
                RunState::Aggregate => {
                    ctx.report = Some(build_report(&mut ctx));
                    self.transition_to(RunState::Done);
                }
                RunState::Done => {
                    return ctx
                        .report
                        .take()
                        .ok_or_else(|| OrchestratorError::StateError("no report".to_string()));
                }
                RunState::Failed(message) => {
                    return Err(OrchestratorError::StateError(message.clone()));
                }
            }
        }
    }

    fn transition_to(&mut self, new_state: RunState) {
        debug!("State transition: {:?} → {:?}", self.state, new_state);
        self.history.push(new_state.clone());
        self.state = new_state;
    }
}

fn build_report(ctx: &mut RunContext) -> EvaluationReport {
    let sheet = std::mem::take(&mut ctx.sheet);
    let mut report = EvaluationReport::from_sheet(ctx.persona.clone(), sheet);
    report.specialist = ctx.specialist.as_ref().map(|p| p.domain_name.clone());
    report.rubric_set = ctx.rubric_dir.display().to_string();
    report.degraded_discovery = ctx.degraded;
    report.question_count = ctx.plan.len();
    report
}

/// Await `fut` unless the token fires first.
async fn guard<F: Future>(token: &CancellationToken, fut: F) -> OrchestratorResult<F::Output> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(OrchestratorError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Where a panic was raised, recorded by the hook on the panicking thread.
#[derive(Debug)]
struct PanicSite {
    location: String,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the existing one that records the panic site.
///
/// `catch_unwind` only sees the payload, so the location and backtrace have
/// to be taken while the panicking frame is still on the stack.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string());
            let site = PanicSite {
                location,
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(site));
            previous(info);
        }));
    });
}

fn take_panic_site() -> Option<PanicSite> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn preview(text: &str) -> String {
    let mut short: String = text.chars().take(80).collect();
    if short.len() < text.len() {
        short.push_str("...");
    }
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_through() {
        let token = CancellationToken::new();
        assert_eq!(guard(&token, async { 42 }).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_guard_stops_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let result = guard(&token, std::future::pending::<()>()).await;
        assert!(matches!(result, Err(OrchestratorError::Cancelled)));
        assert_eq!(OrchestratorError::Cancelled.to_string(), CANCELLED);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic payload");
    }

    #[test]
    fn test_panic_site_keeps_location() {
        install_panic_hook();
        take_panic_site();

        let result = std::panic::catch_unwind(|| panic!("located"));
        assert!(result.is_err());

        let site = take_panic_site().unwrap();
        assert!(site.location.contains("orchestrator.rs"));
        assert!(!site.backtrace.is_empty());
        assert!(take_panic_site().is_none());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed("x".into()).is_terminal());
        assert!(!RunState::DegradedDiscovery.is_terminal());
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short"), "short");
        assert!(preview(&"x".repeat(200)).ends_with("..."));
    }
}
