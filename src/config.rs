//! Configuration module for evaluation runs.
//!
//! Handles YAML run configuration loading with validation. Every field has a
//! default so a partial file (or no file at all) yields a usable config.

use crate::download::DownloadConfig;
use crate::metrics::StatConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Task ids evaluated when none are given
pub const DEFAULT_TASKS: &str = "axb,boolq,cb,wsc,copa,multirc,rte,wic,record,axg";

/// Evaluation run configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalConfig {
    /// Task ids to evaluate (matched against promptsource ids)
    #[serde(default = "default_tasks")]
    pub tasks: Vec<String>,
    /// Maximum number of records per task, `None` for the whole split
    #[serde(default = "default_firstn")]
    pub firstn: Option<usize>,
    /// Demonstrations prepended to every prompt
    #[serde(default = "default_num_demonstrations")]
    pub num_demonstrations: usize,
    /// Seed for demonstration sampling
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Directory holding downloaded archives
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Apply Porter stemming before ROUGE matching
    #[serde(default = "default_use_stemmer")]
    pub use_stemmer: bool,
    /// Template catalog replacing the built-in one
    #[serde(default)]
    pub templates: Option<PathBuf>,
    /// External generator command
    #[serde(default)]
    pub generator: GeneratorConfig,
    /// Bootstrap resamples for per-template confidence intervals
    #[serde(default = "default_bootstrap_n")]
    pub bootstrap_n: usize,
    /// Confidence level of the intervals
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Show progress bars on stderr
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_tasks() -> Vec<String> {
    parse_task_list(DEFAULT_TASKS)
}
#[allow(clippy::unnecessary_wraps)]
const fn default_firstn() -> Option<usize> {
    Some(1000)
}
const fn default_num_demonstrations() -> usize {
    3
}
const fn default_seed() -> u64 {
    42
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}
const fn default_use_stemmer() -> bool {
    true
}
const fn default_bootstrap_n() -> usize {
    1000
}
const fn default_confidence() -> f64 {
    0.95
}
const fn default_timeout_secs() -> u64 {
    600
}
const fn default_progress() -> bool {
    true
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            tasks: default_tasks(),
            firstn: default_firstn(),
            num_demonstrations: default_num_demonstrations(),
            seed: default_seed(),
            cache_dir: default_cache_dir(),
            use_stemmer: default_use_stemmer(),
            templates: None,
            generator: GeneratorConfig::default(),
            bootstrap_n: default_bootstrap_n(),
            confidence: default_confidence(),
            timeout_secs: default_timeout_secs(),
            progress: default_progress(),
        }
    }
}

impl EvalConfig {
    /// Load run configuration from YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load run configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or validated.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tasks.is_empty() {
            return Err(ConfigError::InvalidValue("tasks must not be empty".into()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::InvalidValue(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        if self.generator.command.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "generator.command must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Statistics settings derived from this run
    #[must_use]
    pub const fn stat_config(&self) -> StatConfig {
        StatConfig {
            bootstrap_n: self.bootstrap_n,
            confidence: self.confidence,
            seed: self.seed,
        }
    }

    /// Download settings derived from this run
    #[must_use]
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            cache_dir: self.cache_dir.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ..DownloadConfig::default()
        }
    }
}

/// Split a comma-separated task list, dropping blanks
#[must_use]
pub fn parse_task_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Command line used to reach the evaluated model
///
/// `{model}` and `{prompt}` placeholders are substituted per argument. When
/// no argument mentions `{prompt}` the prompt is written to stdin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Executable to invoke
    pub command: String,
    /// Arguments template
    pub args_template: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::ollama()
    }
}

impl GeneratorConfig {
    /// Local Ollama model, prompt on stdin
    #[must_use]
    pub fn ollama() -> Self {
        Self {
            command: "ollama".to_string(),
            args_template: "run {model}".to_string(),
        }
    }

    /// Arbitrary command
    #[must_use]
    pub fn custom(command: &str, args_template: &str) -> Self {
        Self {
            command: command.to_string(),
            args_template: args_template.to_string(),
        }
    }
}
