//! Configuration management for AnswerForge
//!
//! Supports loading configuration from:
//! - A configuration file given on the command line (TOML, YAML or JSON)
//! - Environment variables (prefixed with APP__)
//! - Default values

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// Pipeline orchestration configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Question set and corpus locations
    #[serde(default)]
    pub data: DataConfig,

    /// Built-in corpus answer generator
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Remote ranking service configuration
    #[serde(default)]
    pub ranker: RankerConfig,

    /// Trusting merger/ranker configuration
    #[serde(default)]
    pub trusting: TrustingConfig,

    /// Result writer configuration
    #[serde(default)]
    pub results: ResultsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Registry key of the pipeline to build
    pub kind: Option<String>,

    /// Worker pool size (required)
    pub num_threads: Option<usize>,

    /// Number of training folds; zero or negative means one degenerate fold
    #[serde(default = "default_num_folds")]
    pub num_folds: i32,

    /// Drop candidates whose label was already seen for the same question
    #[serde(default)]
    pub filter_duplicates: bool,

    /// Depth of the bounded question task queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DataConfig {
    /// Training question set (JSON)
    pub train_path: Option<PathBuf>,

    /// Component training set; used instead of fold rotation when present
    pub validation_path: Option<PathBuf>,

    /// Test question set (JSON)
    pub test_path: Option<PathBuf>,

    /// Document corpus for the corpus answer generator
    pub corpus_path: Option<PathBuf>,

    /// Source tag stamped onto loaded questions
    #[serde(default = "default_source")]
    pub source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// Maximum candidates emitted per question
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RankerConfig {
    /// Ranking service provider: http, mock
    #[serde(default = "default_ranker_provider")]
    pub provider: String,

    /// Service base URL
    pub endpoint: Option<String>,

    /// Basic auth user name
    pub username: Option<String>,

    /// Basic auth password
    pub password: Option<String>,

    /// Name sent with training submissions
    #[serde(default = "default_ranker_name")]
    pub ranker_name: String,

    /// Pre-trained model to use when this run does not train one
    pub model_id: Option<String>,

    /// Retries after the first failed rank request (required by the remote adapter)
    pub retry_limit: Option<u32>,

    /// Fixed delay between rank attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Interval between training status polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Request timeout in seconds
    #[serde(default = "default_ranker_timeout")]
    pub timeout_secs: u64,

    /// Durable copy of the submitted training data
    pub training_data_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrustingConfig {
    /// Feature copied into the answer confidence
    #[serde(default = "default_trusted_feature")]
    pub feature_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResultsConfig {
    /// Results file written by the result writer
    pub path: Option<PathBuf>,

    /// Output format: default, verbose, competition
    #[serde(default)]
    pub format: ResultsFormat,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultsFormat {
    #[default]
    Default,
    Verbose,
    Competition,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Prometheus exporter port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,
}

// Default value functions
fn default_num_folds() -> i32 { -1 }
fn default_queue_capacity() -> usize { 256 }
fn default_source() -> String { "default".to_string() }
fn default_max_candidates() -> usize { 20 }
fn default_ranker_provider() -> String { "http".to_string() }
fn default_ranker_name() -> String { "answerforge-ranker".to_string() }
fn default_retry_delay() -> u64 { 3000 }
fn default_poll_interval() -> u64 { 30 }
fn default_ranker_timeout() -> u64 { 30 }
fn default_trusted_feature() -> String { "search_score".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            kind: None,
            num_threads: None,
            num_folds: default_num_folds(),
            filter_duplicates: false,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
        }
    }
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            provider: default_ranker_provider(),
            endpoint: None,
            username: None,
            password: None,
            ranker_name: default_ranker_name(),
            model_id: None,
            retry_limit: None,
            retry_delay_ms: default_retry_delay(),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_ranker_timeout(),
            training_data_path: None,
        }
    }
}

impl Default for TrustingConfig {
    fn default() -> Self {
        Self {
            feature_name: default_trusted_feature(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: 0,
        }
    }
}

/// Validated, immutable settings the orchestrator reads at initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub num_threads: usize,
    pub num_folds: i32,
    pub filter_duplicates: bool,
    pub queue_capacity: usize,
}

impl AppConfig {
    /// Load from a specific configuration file, with APP__ environment overrides
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            // e.g., APP__PIPELINE__NUM_THREADS=8
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load and validate in one step, mapping loader failures to configuration errors
    pub fn load(path: &str) -> Result<Self> {
        let config = Self::from_file(path)
            .map_err(|e| AppError::config(format!("failed to load {}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required options and value ranges before any work begins
    pub fn validate(&self) -> Result<()> {
        self.pipeline_settings()?;
        if self.pipeline.kind.is_none() {
            return Err(AppError::MissingOption {
                option: "pipeline.kind".to_string(),
            });
        }
        Ok(())
    }

    /// Extract the orchestrator settings
    pub fn pipeline_settings(&self) -> Result<PipelineSettings> {
        let num_threads = self.pipeline.num_threads.ok_or_else(|| AppError::MissingOption {
            option: "pipeline.num_threads".to_string(),
        })?;
        if num_threads == 0 {
            return Err(AppError::config("pipeline.num_threads must be positive"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(AppError::config("pipeline.queue_capacity must be positive"));
        }

        Ok(PipelineSettings {
            num_threads,
            num_folds: self.pipeline.num_folds,
            filter_duplicates: self.pipeline.filter_duplicates,
            queue_capacity: self.pipeline.queue_capacity,
        })
    }

    /// Get the delay between rank attempts as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.ranker.retry_delay_ms)
    }

    /// Get the training status poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ranker.poll_interval_secs)
    }
}
