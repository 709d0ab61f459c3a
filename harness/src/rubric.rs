//! Rubric sets: one rubric text per task, stored as `<task_slug>.txt`.

use crate::specialist::SpecialistProfile;
use crate::task::EvaluationTask;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Rubric set used when no specialist supplies its own.
pub const GENERAL_RUBRICS: &str = "general";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RubricError {
    #[error("No rubric for task '{task}' in {dir}")]
    Missing { task: EvaluationTask, dir: PathBuf },
}

pub type RubricResult<T> = Result<T, RubricError>;

#[derive(Debug, Clone, Default)]
pub struct RubricSet {
    dir: PathBuf,
    rubrics: BTreeMap<EvaluationTask, String>,
}

impl RubricSet {
    /// Read whatever task rubrics exist under `dir`.
    ///
    /// Never fails: absent or unreadable files are logged and later reported
    /// by [`RubricSet::get`] as a per-task error.
    pub fn load(dir: &Path) -> Self {
        let mut set = Self {
            dir: dir.to_path_buf(),
            rubrics: BTreeMap::new(),
        };

        for task in EvaluationTask::ALL {
            let path = dir.join(format!("{}.txt", task.slug()));
            match fs::read_to_string(&path) {
                Ok(text) if !text.trim().is_empty() => {
                    set.rubrics.insert(task, text);
                }
                Ok(_) => warn!("Rubric {} is empty", path.display()),
                Err(e) => warn!("Rubric {} unavailable: {}", path.display(), e),
            }
        }

        debug!(
            "Loaded {} rubrics from {}",
            set.rubrics.len(),
            dir.display()
        );
        set
    }

    pub fn from_texts<I, S>(dir: impl Into<PathBuf>, rubrics: I) -> Self
    where
        I: IntoIterator<Item = (EvaluationTask, S)>,
        S: Into<String>,
    {
        Self {
            dir: dir.into(),
            rubrics: rubrics
                .into_iter()
                .map(|(task, text)| (task, text.into()))
                .collect(),
        }
    }

    pub fn get(&self, task: EvaluationTask) -> RubricResult<&str> {
        self.rubrics
            .get(&task)
            .map(String::as_str)
            .ok_or_else(|| RubricError::Missing {
                task,
                dir: self.dir.clone(),
            })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.rubrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rubrics.is_empty()
    }
}

/// Rubric directory for a run: the specialist's own set when it names one,
/// the general set otherwise. Only the last path component of the
/// specialist's `rubrics_path` is used, resolved under `root`.
pub fn resolve_rubric_dir(root: &Path, specialist: Option<&SpecialistProfile>) -> PathBuf {
    specialist
        .and_then(|profile| profile.rubrics_path.as_deref())
        .and_then(|path| Path::new(path).file_name())
        .map(|name| root.join(name))
        .unwrap_or_else(|| root.join(GENERAL_RUBRICS))
}
