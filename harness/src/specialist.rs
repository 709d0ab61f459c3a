//! Specialist profiles and keyword-based persona matching.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read specialist descriptor {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid specialist descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// A domain profile describing how to evaluate personas in that domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistProfile {
    pub domain_name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_questions_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubrics_path: Option<String>,
}

impl SpecialistProfile {
    pub fn new(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            keywords: Vec::new(),
            settings_list: None,
            static_questions_file: None,
            rubrics_path: None,
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_settings<I, S>(mut self, settings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings_list = Some(settings.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_questions_file(mut self, file: impl Into<String>) -> Self {
        self.static_questions_file = Some(file.into());
        self
    }

    pub fn with_rubrics_path(mut self, path: impl Into<String>) -> Self {
        self.rubrics_path = Some(path.into());
        self
    }

    /// Parse a single descriptor file.
    pub fn from_file(path: &Path) -> RegistryResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut profile: SpecialistProfile =
            serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        profile.normalize_keywords();
        Ok(profile)
    }

    /// True when any non-empty keyword occurs in `persona_lower`.
    fn matches(&self, persona_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|keyword| !keyword.is_empty() && persona_lower.contains(keyword.as_str()))
    }

    fn normalize_keywords(&mut self) {
        for keyword in &mut self.keywords {
            *keyword = keyword.trim().to_lowercase();
        }
    }
}

/// Read-only set of specialists, in deterministic load order.
///
/// Shared between runs behind an `Arc`; nothing mutates it after loading.
#[derive(Debug, Clone, Default)]
pub struct SpecialistRegistry {
    profiles: Vec<SpecialistProfile>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: Vec<SpecialistProfile>) -> Self {
        let mut registry = Self::new();
        for profile in profiles {
            registry.register(profile);
        }
        registry
    }

    pub fn register(&mut self, mut profile: SpecialistProfile) {
        profile.normalize_keywords();
        info!("Registered specialist '{}'", profile.domain_name);
        self.profiles.push(profile);
    }

    /// Load every `*.json` descriptor in `dir`, sorted by file name.
    ///
    /// A missing directory yields an empty registry. Descriptors that fail to
    /// read or parse are logged and skipped.
    pub fn load(dir: &Path) -> Self {
        let mut registry = Self::new();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Specialists directory not found at {}: {}", dir.display(), e);
                return registry;
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        for path in paths {
            match SpecialistProfile::from_file(&path) {
                Ok(profile) => registry.register(profile),
                Err(e) => warn!("Skipping specialist descriptor: {}", e),
            }
        }

        debug!(
            "Loaded {} specialists from {}",
            registry.len(),
            dir.display()
        );
        registry
    }

    /// First profile, in load order, with a keyword occurring in the persona.
    pub fn find(&self, persona: &str) -> Option<&SpecialistProfile> {
        let persona_lower = persona.to_lowercase();
        self.profiles
            .iter()
            .find(|profile| profile.matches(&persona_lower))
    }

    pub fn profiles(&self) -> &[SpecialistProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
