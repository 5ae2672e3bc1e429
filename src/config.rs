//! Engine settings and logging setup.
//!
//! Settings are layered: built-in defaults, then an optional file (format taken
//! from its extension), then environment variables such as
//! `CHAINSTORE__PIPELINE__ENABLED=false`.
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{ChainError, Result};

pub const ENV_PREFIX: &str = "CHAINSTORE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub evaluation: EvaluationConfig,
    pub pipeline: PipelineConfig,
    pub writer: WriterConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Batched joins when the right side is a direct lookup.
    pub performant: bool,
    /// Log the operator tree before evaluating it.
    pub display_query_plan: bool,
    /// Accepted for compatibility; evaluation runs on one worker.
    pub num_threads: usize,
    pub join_batch_size: usize,
}
impl Default for EvaluationConfig {
    fn default() -> Self {
        Self { performant: true, display_query_plan: false, num_threads: 1, join_batch_size: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub enabled: bool,
    pub batch_size: usize,
    pub allow_large_intermediate_results: bool,
}
impl Default for PipelineConfig {
    fn default() -> Self {
        Self { enabled: true, batch_size: 1000, allow_large_intermediate_results: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub batch_size: usize,
    pub queue_capacity: usize,
    pub flush_interval_ms: u64,
}
impl Default for WriterConfig {
    fn default() -> Self {
        Self { batch_size: 1000, queue_capacity: 10_000, flush_interval_ms: 100 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Stop after this many passes even without reaching a fixpoint.
    pub max_passes: Option<usize>,
    /// Label stamped on every derived fact.
    pub visibility: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_owned() }
    }
}

impl EngineConfig {
    /// Defaults, then the file at `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?;
        Self::finish(settings)
    }

    /// Settings from TOML text, without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let settings = Config::builder().add_source(File::from_str(text, FileFormat::Toml)).build()?;
        Self::finish(settings)
    }

    fn finish(settings: Config) -> Result<Self> {
        let config: EngineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("evaluation.join_batch_size", self.evaluation.join_batch_size),
            ("pipeline.batch_size", self.pipeline.batch_size),
            ("writer.batch_size", self.writer.batch_size),
            ("writer.queue_capacity", self.writer.queue_capacity),
        ];
        for (name, size) in sizes {
            if size == 0 {
                return Err(ChainError::Config(format!("{} must be greater than zero", name)));
            }
        }
        EnvFilter::try_new(&self.logging.filter)
            .map_err(|e| ChainError::Config(format!("logging.filter: {}", e)))?;
        Ok(())
    }
}

/// Installs a formatting subscriber. Does nothing if one is installed already.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter).map_err(|e| ChainError::Config(e.to_string()))?,
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    Ok(())
}
