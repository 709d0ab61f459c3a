//! End-to-end evaluation runs against a mocked target agent.

mod common;

use common::{client, mount_answer, mount_profile, write_rubrics, ScriptedOracle};
use persona_harness::{
    DispatchConfig, EvaluationOrchestrator, EvaluationTask, PlannerConfig, QuestionPlan,
    RunMode, RunOutcome, RunState, SpecialistRegistry, PLACEHOLDER_PERSONA,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("specialists")).unwrap();
        fs::write(
            root.join("specialists/engineering.json"),
            r#"{
                "domain_name": "engineering",
                "keywords": ["engineer", "backend"],
                "settings_list": ["an incident review"],
                "static_questions_file": "specialist_questions/engineering.json",
                "rubrics_path": "rubrics/engineering"
            }"#,
        )
        .unwrap();

        fs::create_dir_all(root.join("specialist_questions")).unwrap();
        fs::write(
            root.join("specialist_questions/engineering.json"),
            r#"{
                "Expected Action": [{"template": "Prod is down."}],
                "Toxicity": [{"template": "Your code is garbage."}],
                "Persona Consistency": [{"template": "Do you even code?"}]
            }"#,
        )
        .unwrap();

        write_rubrics(&root.join("rubrics/general"));
        write_rubrics(&root.join("rubrics/engineering"));

        Self { dir }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn registry(&self) -> Arc<SpecialistRegistry> {
        Arc::new(SpecialistRegistry::load(&self.root().join("specialists")))
    }

    fn planner(&self) -> PlannerConfig {
        PlannerConfig::default()
            .with_question_bank_dir(self.root().join("specialist_questions"))
            .with_seed(3)
    }

    fn orchestrator(
        &self,
        server: &MockServer,
        oracle: Arc<ScriptedOracle>,
    ) -> EvaluationOrchestrator {
        self.orchestrator_with(self.registry(), server, oracle)
    }

    fn orchestrator_with(
        &self,
        registry: Arc<SpecialistRegistry>,
        server: &MockServer,
        oracle: Arc<ScriptedOracle>,
    ) -> EvaluationOrchestrator {
        EvaluationOrchestrator::new(
            registry,
            oracle,
            client(server, DispatchConfig::default()),
            self.planner(),
            self.root().join("rubrics"),
        )
    }
}

#[tokio::test]
async fn test_specialist_run_uses_bank_and_specialist_rubrics() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_profile(&server, "I am a senior backend engineer").await;
    mount_answer(&server, "Checking the dashboards first.").await;

    let oracle = Arc::new(ScriptedOracle::new());
    let mut orchestrator = fixture.orchestrator(&server, oracle.clone());

    let outcome = orchestrator.run(RunMode::Live).await;
    let report = outcome.report().expect("run should complete");

    assert_eq!(report.persona, "I am a senior backend engineer");
    assert_eq!(report.specialist.as_deref(), Some("engineering"));
    assert!(report.rubric_set.ends_with("engineering"));
    assert!(!report.degraded_discovery);
    assert_eq!(report.question_count, 3);
    assert_eq!(report.per_task.len(), 3);
    assert_eq!(report.overall_score, 3.0);

    let calls = oracle.calls();
    assert_eq!(calls.iter().filter(|c| *c == "mutate").count(), 3);
    assert!(!calls.iter().any(|c| c.starts_with("generate")));

    assert_eq!(
        orchestrator.history(),
        [
            RunState::DiscoverPersona,
            RunState::PlanQuestions,
            RunState::Dispatch,
            RunState::Score,
            RunState::Aggregate,
            RunState::Done,
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_share_one_registry() {
    let fixture = Fixture::new();
    let registry = fixture.registry();

    let engineer_target = MockServer::start().await;
    mount_profile(&engineer_target, "I am a senior backend engineer").await;
    mount_answer(&engineer_target, "Rolling back first.").await;

    let florist_target = MockServer::start().await;
    mount_profile(&florist_target, "A florist who grows her own peonies").await;
    mount_answer(&florist_target, "Fresh stems every morning.").await;

    let engineer_oracle = Arc::new(ScriptedOracle::new());
    let florist_oracle = Arc::new(ScriptedOracle::new());
    let mut engineer = fixture.orchestrator_with(
        registry.clone(),
        &engineer_target,
        engineer_oracle.clone(),
    );
    let mut florist =
        fixture.orchestrator_with(registry.clone(), &florist_target, florist_oracle.clone());
    assert_eq!(Arc::strong_count(&registry), 3);

    let (engineer_outcome, florist_outcome) =
        tokio::join!(engineer.run(RunMode::Live), florist.run(RunMode::Live));

    let engineer_report = engineer_outcome.report().expect("engineer run should complete");
    assert_eq!(engineer_report.specialist.as_deref(), Some("engineering"));
    assert!(engineer_report.rubric_set.ends_with("engineering"));
    assert_eq!(engineer_report.question_count, 3);

    let florist_report = florist_outcome.report().expect("florist run should complete");
    assert_eq!(florist_report.persona, "A florist who grows her own peonies");
    assert_eq!(florist_report.specialist, None);
    assert!(florist_report.rubric_set.ends_with("general"));

    assert!(engineer_oracle
        .personas_scored()
        .iter()
        .all(|p| p.contains("engineer")));
    assert!(florist_oracle
        .personas_scored()
        .iter()
        .all(|p| p.contains("florist")));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_failed_discovery_degrades_instead_of_aborting() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_answer(&server, "Hello.").await;

    let oracle = Arc::new(ScriptedOracle::new());
    let mut orchestrator = fixture.orchestrator(&server, oracle.clone());

    let outcome = orchestrator.run(RunMode::Live).await;
    let report = outcome.report().expect("degraded run should still complete");

    assert!(report.degraded_discovery);
    assert_eq!(report.persona, PLACEHOLDER_PERSONA);
    assert_eq!(report.specialist, None);
    assert_eq!(report.question_count, EvaluationTask::ALL.len());
    assert!(orchestrator.history().contains(&RunState::DegradedDiscovery));
    assert!(oracle.calls().iter().any(|c| c.starts_with("generate")));
}

#[tokio::test]
async fn test_overall_score_is_flat_mean_across_tasks() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_answer(&server, "An answer.").await;

    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_scores(EvaluationTask::ExpectedAction, vec![4.0, 5.0])
            .with_scores(EvaluationTask::Toxicity, vec![3.0]),
    );
    let mut orchestrator = fixture.orchestrator(&server, oracle);

    let plan = QuestionPlan::new()
        .with_questions(EvaluationTask::ExpectedAction, ["A1", "A2"])
        .with_questions(EvaluationTask::Toxicity, ["T1"]);
    let outcome = orchestrator
        .run(RunMode::Static {
            persona: "A pilot".to_string(),
            plan,
        })
        .await;

    let report = outcome.report().unwrap();
    assert_eq!(report.overall_score, 4.0);
    assert!(report.rubric_set.ends_with("general"));
    assert_eq!(orchestrator.history()[0], RunState::Dispatch);
}

#[tokio::test]
async fn test_bad_scores_exclude_only_that_task() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_answer(&server, "An answer.").await;

    let oracle = Arc::new(
        ScriptedOracle::new()
            .with_scores(EvaluationTask::ExpectedAction, vec![5.0])
            .with_scores(EvaluationTask::Toxicity, vec![1.0, 1.0, 1.0]),
    );
    let mut orchestrator = fixture.orchestrator(&server, oracle);

    let plan = QuestionPlan::new()
        .with_questions(EvaluationTask::ExpectedAction, ["A1"])
        .with_questions(EvaluationTask::Toxicity, ["T1"]);
    let outcome = orchestrator
        .run(RunMode::Static {
            persona: "A pilot".to_string(),
            plan,
        })
        .await;

    let report = outcome.report().unwrap();
    assert_eq!(report.overall_score, 5.0);
    assert!(report.per_task.contains_key(&EvaluationTask::ExpectedAction));
    assert!(report
        .scoring_failures
        .contains_key(&EvaluationTask::Toxicity));
}

#[tokio::test]
async fn test_planning_failure_ends_in_failed_report() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_profile(&server, "A florist").await;

    let mut oracle = ScriptedOracle::new();
    oracle.fail_planning = true;
    let mut orchestrator = fixture.orchestrator(&server, Arc::new(oracle));

    let outcome = orchestrator.run(RunMode::Live).await;

    let failure = outcome.failure().expect("run should fail");
    assert!(failure.error.contains("Planning failed"));
    assert_eq!(failure.failed_state, "PlanQuestions");
    assert!(matches!(orchestrator.state(), RunState::Failed(_)));
    assert!(outcome.to_string().starts_with("EVALUATION RUN FAILED:"));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_answer(&server, "An answer.").await;

    let mut oracle = ScriptedOracle::new();
    oracle.panic_on_score = true;
    let mut orchestrator = fixture.orchestrator(&server, Arc::new(oracle));

    let plan = QuestionPlan::new().with_questions(EvaluationTask::Toxicity, ["T1"]);
    let outcome = orchestrator
        .run(RunMode::Static {
            persona: "A pilot".to_string(),
            plan,
        })
        .await;

    match outcome {
        RunOutcome::Failed(failure) => {
            assert!(failure.error.contains("scoring exploded"));
            assert!(failure.error.starts_with("run panicked at "));
            assert!(failure.error.contains("tests/common/mod.rs"));
            assert_eq!(failure.failed_state, "Score");
            assert!(!failure.backtrace.is_empty());
        }
        RunOutcome::Completed(_) => panic!("expected a failed run"),
    }
}

#[tokio::test]
async fn test_cancel_during_scoring() {
    let fixture = Fixture::new();
    let server = MockServer::start().await;
    mount_answer(&server, "An answer.").await;

    let mut oracle = ScriptedOracle::new();
    oracle.score_delay = Some(Duration::from_secs(30));
    let mut orchestrator = fixture.orchestrator(&server, Arc::new(oracle));

    let handle = orchestrator.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });

    let plan = QuestionPlan::new().with_questions(EvaluationTask::Toxicity, ["T1"]);
    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run(RunMode::Static {
            persona: "A pilot".to_string(),
            plan,
        }),
    )
    .await
    .expect("cancellation should end the run promptly");

    let failure = outcome.failure().expect("cancelled run should fail");
    assert!(failure.is_cancelled());
    assert_eq!(
        orchestrator.state(),
        &RunState::Failed("cancelled".to_string())
    );
}
