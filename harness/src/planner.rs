//! Decides what to ask the target agent.

use crate::bank::{BankError, TemplateBank};
use crate::oracle::{Oracle, OracleError};
use crate::specialist::SpecialistProfile;
use crate::task::{EvaluationTask, QuestionPlan};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Setting used for mutation when the oracle selects none.
pub const FALLBACK_SETTING: &str = "a relevant professional setting";

#[derive(Error, Debug)]
pub enum PlanningError {
    #[error("Oracle failed during planning: {0}")]
    Oracle(#[from] OracleError),

    #[error("Could not load question bank: {0}")]
    TemplateBank(#[from] BankError),
}

pub type PlanningResult<T> = Result<T, PlanningError>;

pub fn default_settings() -> Vec<String> {
    [
        "a family dinner",
        "a job interview",
        "a doctor's office",
        "a neighbourhood community meeting",
        "a crowded public transport commute",
        "a university lecture hall",
        "an office team meeting",
        "a hospital waiting room",
        "a courtroom",
        "a local market",
        "a sports event",
        "a religious service",
        "a social media discussion",
        "a workplace conflict",
        "a customer service call",
        "a vacation abroad",
        "a volunteering event",
        "a technical conference",
        "an emergency situation",
        "a casual conversation with a stranger",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Questions generated per task in dynamic mode.
    pub questions_per_task: usize,
    /// Seed for template and setting choice; entropy when unset.
    pub seed: Option<u64>,
    pub default_settings: Vec<String>,
    /// Where specialist template banks live.
    pub question_bank_dir: PathBuf,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            questions_per_task: 1,
            seed: None,
            default_settings: default_settings(),
            question_bank_dir: PathBuf::from("data/specialist_questions"),
        }
    }
}

impl PlannerConfig {
    pub fn with_questions_per_task(mut self, count: usize) -> Self {
        self.questions_per_task = count;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_question_bank_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.question_bank_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.questions_per_task == 0 {
            return Err("questions_per_task must be at least 1".to_string());
        }
        if self.default_settings.is_empty() {
            return Err("default_settings must not be empty".to_string());
        }
        Ok(())
    }
}

pub struct QuestionPlanner {
    oracle: Arc<dyn Oracle>,
    config: PlannerConfig,
    rng: StdRng,
}

impl QuestionPlanner {
    pub fn new(oracle: Arc<dyn Oracle>, config: PlannerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            oracle,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Build the question plan for one run.
    ///
    /// A specialist with a question bank gets one mutated template per task;
    /// anyone else gets freshly generated questions, using the specialist's
    /// settings when there is a specialist.
    pub async fn plan(
        &mut self,
        persona: &str,
        specialist: Option<&SpecialistProfile>,
    ) -> PlanningResult<QuestionPlan> {
        let settings = specialist
            .and_then(|profile| profile.settings_list.clone())
            .unwrap_or_else(|| self.config.default_settings.clone());

        let plan = match specialist {
            Some(profile) => match profile.static_questions_file.as_deref() {
                Some(file) => {
                    info!("Planning from '{}' question bank", profile.domain_name);
                    let bank_path = self.bank_path(file);
                    self.plan_from_bank(persona, &settings, &bank_path).await?
                }
                None => {
                    info!(
                        "Specialist '{}' has no question bank; generating questions",
                        profile.domain_name
                    );
                    self.plan_dynamic(persona, &settings).await?
                }
            },
            None => {
                info!("No specialist matched; generating questions");
                self.plan_dynamic(persona, &settings).await?
            }
        };

        if plan.is_empty() {
            warn!("Question plan is empty");
        }
        debug!(
            "Planned {} questions across {} tasks",
            plan.len(),
            plan.task_count()
        );
        Ok(plan)
    }

    fn bank_path(&self, reference: &str) -> PathBuf {
        match Path::new(reference).file_name() {
            Some(name) => self.config.question_bank_dir.join(name),
            None => self.config.question_bank_dir.join(reference),
        }
    }

    async fn plan_from_bank(
        &mut self,
        persona: &str,
        settings: &[String],
        bank_path: &Path,
    ) -> PlanningResult<QuestionPlan> {
        let selected = self.oracle.select_settings(persona, settings).await?;
        let setting = selected
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| FALLBACK_SETTING.to_string());
        debug!("Mutating templates for setting '{}'", setting);

        let bank = TemplateBank::load(bank_path)?;

        let mut plan = QuestionPlan::new();
        for (task, templates) in bank.iter() {
            let Some(template) = templates.choose(&mut self.rng) else {
                continue;
            };
            let question = self
                .oracle
                .mutate_question(persona, &setting, &template.template)
                .await?;
            plan.push(task, question);
        }
        Ok(plan)
    }

    async fn plan_dynamic(
        &mut self,
        persona: &str,
        settings: &[String],
    ) -> PlanningResult<QuestionPlan> {
        let selected = self.oracle.select_settings(persona, settings).await?;

        let mut plan = QuestionPlan::new();
        for task in EvaluationTask::ALL {
            let questions = self
                .oracle
                .generate_questions(persona, &selected, task, self.config.questions_per_task)
                .await?;
            plan.extend(task, questions);
        }
        Ok(plan)
    }
}
