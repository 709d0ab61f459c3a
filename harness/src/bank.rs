//! On-disk question sources: specialist template banks and the pre-built
//! benchmark question store.

use crate::task::{EvaluationTask, QuestionPlan};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BankError {
    #[error("Failed to read question file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid question file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type BankResult<T> = Result<T, BankError>;

/// One template entry of a specialist bank. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionTemplate {
    pub template: String,
}

/// Task name to question templates, as stored for a specialist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateBank {
    templates: BTreeMap<EvaluationTask, Vec<QuestionTemplate>>,
}

impl TemplateBank {
    /// Read a bank from a JSON file of the form
    /// `{"<task name>": [{"template": "..."}, ...], ...}`.
    ///
    /// Keys that are not known task names are dropped with a warning.
    pub fn load(path: &Path) -> BankResult<Self> {
        let raw = read(path)?;
        let parsed: BTreeMap<String, Vec<QuestionTemplate>> =
            serde_json::from_str(&raw).map_err(|source| BankError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut bank = Self::default();
        for (name, templates) in parsed {
            match name.parse::<EvaluationTask>() {
                Ok(task) => bank.insert(task, templates),
                Err(e) => warn!("{} in {}; skipping", e, path.display()),
            }
        }
        debug!(
            "Loaded template bank {} covering {} tasks",
            path.display(),
            bank.templates.len()
        );
        Ok(bank)
    }

    pub fn insert(&mut self, task: EvaluationTask, templates: Vec<QuestionTemplate>) {
        if !templates.is_empty() {
            self.templates.entry(task).or_default().extend(templates);
        }
    }

    pub fn templates(&self, task: EvaluationTask) -> &[QuestionTemplate] {
        self.templates.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tasks that have at least one template.
    pub fn iter(&self) -> impl Iterator<Item = (EvaluationTask, &[QuestionTemplate])> + '_ {
        self.templates
            .iter()
            .map(|(task, templates)| (*task, templates.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Directory of pre-built benchmark questions, one JSON file per persona.
///
/// Each file maps task names to question lists and is named by
/// [`persona_slug`] of the persona text.
#[derive(Debug, Clone)]
pub struct StaticQuestionStore {
    root: PathBuf,
}

impl StaticQuestionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, persona: &str) -> PathBuf {
        self.root.join(format!("{}.json", persona_slug(persona)))
    }

    /// Load the stored plan for `persona`. Unknown task names are skipped.
    pub fn load(&self, persona: &str) -> BankResult<QuestionPlan> {
        let path = self.path_for(persona);
        let raw = read(&path)?;
        let parsed: BTreeMap<String, Vec<String>> =
            serde_json::from_str(&raw).map_err(|source| BankError::Parse {
                path: path.clone(),
                source,
            })?;

        let mut plan = QuestionPlan::new();
        for (name, questions) in parsed {
            match name.parse::<EvaluationTask>() {
                Ok(task) => plan.extend(task, questions),
                Err(e) => warn!("{} in {}; skipping", e, path.display()),
            }
        }
        Ok(plan)
    }
}

/// Filesystem-safe name for a persona: lowercase ASCII alphanumerics with
/// single underscores between runs of anything else, capped at 80 chars,
/// then `_` and the first 8 hex digits of the SHA-256 of the trimmed text.
///
/// The readable part is lossy (non-Latin text, long shared prefixes); the
/// digest keeps distinct personas in distinct files.
pub fn persona_slug(persona: &str) -> String {
    const MAX_LEN: usize = 80;

    let persona = persona.trim();
    let mut slug = String::with_capacity(persona.len().min(MAX_LEN) + 9);
    let mut pending_separator = false;

    for c in persona.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
        if slug.len() >= MAX_LEN {
            break;
        }
    }

    slug.truncate(MAX_LEN);
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("persona");
    }

    let digest = Sha256::digest(persona.as_bytes());
    slug.push('_');
    slug.push_str(&hex::encode(&digest[..4]));
    slug
}

fn read(path: &Path) -> BankResult<String> {
    fs::read_to_string(path).map_err(|source| BankError::Io {
        path: path.to_path_buf(),
        source,
    })
}
