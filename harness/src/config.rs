//! Harness configuration, loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a valid configuration. Durations are given in whole seconds.

use crate::dispatch::{DispatchConfig, RequestShape};
use crate::planner::{default_settings, PlannerConfig};
use persona_model::{ProviderConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub paths: PathsConfig,
    pub dispatch: DispatchSection,
    pub planner: PlannerSection,
    pub oracle: OracleSection,
    pub retry: RetrySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub specialists_dir: PathBuf,
    pub question_bank_dir: PathBuf,
    pub rubrics_dir: PathBuf,
    pub benchmark_corpus: PathBuf,
    pub benchmark_questions_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            specialists_dir: PathBuf::from("data/specialists"),
            question_bank_dir: PathBuf::from("data/specialist_questions"),
            rubrics_dir: PathBuf::from("data/rubrics"),
            benchmark_corpus: PathBuf::from("data/benchmark/personas.json"),
            benchmark_questions_dir: PathBuf::from("data/benchmark/questions"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    pub request_timeout_secs: u64,
    pub discovery_timeout_secs: u64,
    pub shape: RequestShape,
    pub max_concurrent_tasks: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        let defaults = DispatchConfig::default();
        Self {
            request_timeout_secs: defaults.request_timeout.as_secs(),
            discovery_timeout_secs: defaults.discovery_timeout.as_secs(),
            shape: defaults.shape,
            max_concurrent_tasks: defaults.max_concurrent_tasks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    pub questions_per_task: usize,
    pub seed: Option<u64>,
    /// Replaces the built-in settings catalog when set.
    pub default_settings: Option<Vec<String>>,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            questions_per_task: PlannerConfig::default().questions_per_task,
            seed: None,
            default_settings: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
}

impl Default for OracleSection {
    fn default() -> Self {
        let defaults = ProviderConfig::default();
        Self {
            base_url: defaults.base_url,
            model: defaults.default_model,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: defaults.timeout.as_secs(),
            temperature: defaults.default_temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
    pub call_timeout_secs: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay_ms,
            max_delay_ms: defaults.max_delay_ms,
            jitter_factor: defaults.jitter_factor,
            call_timeout_secs: defaults.call_timeout.as_secs(),
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_shape(mut self, shape: RequestShape) -> Self {
        self.dispatch.shape = shape;
        self
    }

    pub fn with_rubrics_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths.rubrics_dir = dir.into();
        self
    }

    pub fn with_benchmark_corpus(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.benchmark_corpus = path.into();
        self
    }

    pub fn with_benchmark_questions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.paths.benchmark_questions_dir = dir.into();
        self
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.dispatch_config()
            .validate()
            .and_then(|_| self.planner_config().validate())
            .and_then(|_| self.retry_policy().validate())
            .and_then(|_| self.validate_oracle())
            .map_err(ConfigError::Invalid)
    }

    fn validate_oracle(&self) -> Result<(), String> {
        self.provider_config()
            .validate()
            .map_err(|e| format!("oracle: {}", e))
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::default()
            .with_request_timeout(Duration::from_secs(self.dispatch.request_timeout_secs))
            .with_discovery_timeout(Duration::from_secs(self.dispatch.discovery_timeout_secs))
            .with_shape(self.dispatch.shape)
            .with_max_concurrent_tasks(self.dispatch.max_concurrent_tasks)
    }

    /// Dispatch settings with a command-line shape taking precedence over
    /// the configured one.
    pub fn dispatch_config_for(&self, shape: Option<RequestShape>) -> DispatchConfig {
        self.dispatch_config().with_shape(shape.unwrap_or(self.dispatch.shape))
    }

    pub fn planner_config(&self) -> PlannerConfig {
        PlannerConfig {
            questions_per_task: self.planner.questions_per_task,
            seed: self.planner.seed,
            default_settings: self
                .planner
                .default_settings
                .clone()
                .unwrap_or_else(default_settings),
            question_bank_dir: self.paths.question_bank_dir.clone(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay_ms: self.retry.base_delay_ms,
            max_delay_ms: self.retry.max_delay_ms,
            jitter_factor: self.retry.jitter_factor,
            call_timeout: Duration::from_secs(self.retry.call_timeout_secs),
        }
    }

    /// Provider settings for the oracle, with the API key taken from the
    /// environment variable named by `oracle.api_key_env`.
    pub fn provider_config(&self) -> ProviderConfig {
        let mut config = ProviderConfig::default()
            .with_base_url(self.oracle.base_url.clone())
            .with_model(self.oracle.model.clone())
            .with_timeout(Duration::from_secs(self.oracle.timeout_secs))
            .with_temperature(self.oracle.temperature);
        if let Ok(key) = std::env::var(&self.oracle.api_key_env) {
            if !key.trim().is_empty() {
                config = config.with_api_key(key);
            }
        }
        config
    }
}
