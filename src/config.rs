//! Pipeline configuration, loaded from TOML and overridable from the environment.

use crate::error::{Error, Result};
use crate::utils::evaluation::Metric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `STREAMAD__PROFILE__START_INDEX=500`
pub const ENV_PREFIX: &str = "STREAMAD";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Payload field holding the sample value
    #[serde(default = "default_attribute")]
    pub attribute: String,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub preprocessor: PreprocessorConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub output: SinkConfig,
    #[serde(default)]
    pub alerts: SinkConfig,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub evaluation: Option<EvaluationConfig>,
    #[serde(default)]
    pub on_stop: StopAction,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_attribute() -> String {
    "value".to_string()
}

/// Where payload lines come from
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    #[default]
    Stdin,
    File {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Reader waits for the processor to free a slot
    #[default]
    Block,
    /// Messages arriving at a full queue are discarded
    DropNewest,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub policy: QueuePolicy,
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            policy: QueuePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessMethod {
    #[default]
    None,
    #[serde(alias = "StandardScaler")]
    StandardScaler,
    #[serde(alias = "MinMaxScaler")]
    MinMaxScaler,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PreprocessorConfig {
    #[serde(default)]
    pub method: PreprocessMethod,
    /// Stop learning scaling statistics once detection starts
    #[serde(default)]
    pub freeze_after_warmup: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProfileConfig {
    /// Number of warm-up samples before detection starts
    #[serde(default)]
    pub start_index: u64,
}

/// Model selector plus model-specific parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    FixedThreshold {
        threshold: f64,
    },
    FixedThresholdBatch {
        threshold: f64,
        batch_size: Option<usize>,
    },
    StandardAbsoluteDeviation {
        #[serde(default = "default_z_cutoff")]
        z_cutoff: f64,
        #[serde(default)]
        keep_learning: bool,
    },
    HalfSpaceTrees {
        #[serde(default)]
        min: f64,
        #[serde(default = "default_hst_max")]
        max: f64,
        #[serde(default = "default_hst_window")]
        window_size: usize,
        #[serde(default = "default_hst_trees")]
        num_trees: usize,
        #[serde(default = "default_hst_depth")]
        max_depth: usize,
        #[serde(default = "default_hst_cutoff")]
        anomaly_cutoff: f64,
        seed: Option<u64>,
    },
    WindowForecast {
        batch_size: Option<usize>,
        #[serde(default = "default_time_step")]
        time_step: usize,
        history: usize,
        #[serde(default = "default_forecast_percentile")]
        percentile: f64,
    },
}

fn default_z_cutoff() -> f64 {
    crate::models::sad::DEFAULT_Z_CUTOFF
}
fn default_hst_max() -> f64 {
    1.0
}
fn default_hst_window() -> usize {
    250
}
fn default_hst_trees() -> usize {
    10
}
fn default_hst_depth() -> usize {
    8
}
fn default_hst_cutoff() -> f64 {
    0.8
}
fn default_time_step() -> usize {
    10
}
fn default_forecast_percentile() -> f64 {
    0.99
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Scores under the cutoff are anomalous
    #[default]
    Below,
    /// Scores over the cutoff are anomalous
    Above,
}

/// How a sanitized score becomes a flag in the detection phase
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Keep the flag the model produced itself
    #[default]
    Model,
    Fixed {
        cutoff: f64,
        #[serde(default)]
        polarity: Polarity,
    },
    Quantile {
        q: f64,
        #[serde(default = "default_quantile_step")]
        step: f64,
        #[serde(default)]
        adapt_during_detection: bool,
    },
}

fn default_quantile_step() -> f64 {
    0.01
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    #[default]
    None,
    File {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub kind: CacheKind,
    /// Connection URL, required for redis
    pub url: Option<String>,
    #[serde(default = "default_scores_key")]
    pub scores_key: String,
    #[serde(default = "default_alerts_key")]
    pub alerts_key: String,
}

fn default_scores_key() -> String {
    "anomaly_scores".to_string()
}
fn default_alerts_key() -> String {
    "anomaly_alerts".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub labels_file: PathBuf,
    /// Predicted flags, one per line
    pub anomalies_file: PathBuf,
    /// Predicted scores, required for ROCAUC
    #[serde(default)]
    pub scores_file: Option<PathBuf>,
    pub metrics: Vec<Metric>,
}

/// What happens after the stream is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopAction {
    /// Prompt on the terminal whether to evaluate
    #[default]
    Ask,
    Evaluate,
    Exit,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file, then apply `STREAMAD__*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(env_source())
            .build()?;
        Self::finish(settings)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Self::finish(settings)
    }

    fn finish(settings: config::Config) -> Result<Self> {
        let config: PipelineConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need the model to be built.
    pub fn validate(&self) -> Result<()> {
        if self.attribute.trim().is_empty() {
            return Err(Error::Configuration("attribute must not be empty".into()));
        }
        if self.queue.capacity == 0 {
            return Err(Error::Configuration("queue.capacity must be positive".into()));
        }
        if let ClassifierConfig::Quantile { q, step, .. } = self.classifier {
            if !(q > 0.0 && q < 1.0) {
                return Err(Error::Configuration(format!(
                    "classifier.q must lie strictly between 0 and 1, got {}",
                    q
                )));
            }
            if !(step > 0.0 && step.is_finite()) {
                return Err(Error::Configuration(format!(
                    "classifier.step must be positive, got {}",
                    step
                )));
            }
        }
        if let Some(cache) = &self.cache {
            if cache.kind == CacheKind::Redis && cache.url.is_none() {
                return Err(Error::Configuration("cache.url is required for redis".into()));
            }
        }
        if let Some(eval) = &self.evaluation {
            if eval.metrics.contains(&Metric::RocAuc) && eval.scores_file.is_none() {
                return Err(Error::Configuration(
                    "evaluation.scores_file is required for ROCAUC".into(),
                ));
            }
        }
        Ok(())
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
