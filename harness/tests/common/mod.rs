#![allow(dead_code)]

use async_trait::async_trait;
use persona_harness::{
    DispatchClient, DispatchConfig, EvaluationTask, Oracle, OracleError, OracleResult,
    OracleScores, QaPair, TargetAddress,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Oracle with scripted behaviour and a call log.
#[derive(Default)]
pub struct ScriptedOracle {
    pub scores: HashMap<EvaluationTask, Vec<f64>>,
    pub fail_planning: bool,
    pub panic_on_score: bool,
    pub score_delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
    personas_scored: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scores(mut self, task: EvaluationTask, scores: Vec<f64>) -> Self {
        self.scores.insert(task, scores);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn personas_scored(&self) -> Vec<String> {
        self.personas_scored.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn select_settings(
        &self,
        _persona: &str,
        candidates: &[String],
    ) -> OracleResult<Vec<String>> {
        self.record("select_settings");
        if self.fail_planning {
            return Err(OracleError::EmptyOutput {
                operation: "select_settings",
            });
        }
        Ok(candidates.iter().take(1).cloned().collect())
    }

    async fn generate_questions(
        &self,
        _persona: &str,
        _settings: &[String],
        task: EvaluationTask,
        count: usize,
    ) -> OracleResult<Vec<String>> {
        self.record(format!("generate:{}", task));
        Ok((1..=count).map(|i| format!("{} Q{}", task, i)).collect())
    }

    async fn mutate_question(
        &self,
        _persona: &str,
        setting: &str,
        template: &str,
    ) -> OracleResult<String> {
        self.record("mutate");
        Ok(format!("{} (in {})", template, setting))
    }

    async fn score_answers(
        &self,
        persona: &str,
        task: EvaluationTask,
        _rubric: &str,
        qa_pairs: &[QaPair],
    ) -> OracleResult<OracleScores> {
        self.record(format!("score:{}", task));
        self.personas_scored.lock().unwrap().push(persona.to_string());
        if self.panic_on_score {
            panic!("scoring exploded");
        }
        if let Some(delay) = self.score_delay {
            tokio::time::sleep(delay).await;
        }
        let scores = self
            .scores
            .get(&task)
            .cloned()
            .unwrap_or_else(|| vec![3.0; qa_pairs.len()]);
        Ok(OracleScores::numeric(scores))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn client(server: &MockServer, config: DispatchConfig) -> DispatchClient {
    let target = TargetAddress::parse(&server.uri()).unwrap();
    DispatchClient::new(target, config).unwrap()
}

pub fn text_reply(text: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": "1",
        "result": {"kind": "message", "role": "agent", "parts": [{"kind": "text", "text": text}]}
    })
}

pub async fn mount_profile(server: &MockServer, persona: &str) {
    Mock::given(method("GET"))
        .and(path("/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "persona_description": persona
        })))
        .mount(server)
        .await;
}

/// Answer any `message/send` with the same text.
pub async fn mount_answer(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(text)))
        .mount(server)
        .await;
}

/// Answer messages containing `needle` with `text`, ahead of other mocks.
pub async fn mount_answer_for(server: &MockServer, needle: &str, text: &str) {
    Mock::given(method("POST"))
        .and(path("/"))
        .and(body_string_contains(needle))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_reply(text)))
        .with_priority(1)
        .mount(server)
        .await;
}

pub fn write_rubrics(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for task in EvaluationTask::ALL {
        fs::write(
            dir.join(format!("{}.txt", task.slug())),
            format!("Rubric for {}", task),
        )
        .unwrap();
    }
}
