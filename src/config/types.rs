use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub tail: TailConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Connection settings for the analysis service.
///
/// Each field may be left out of the file and supplied through the environment
/// (`API_URL`, `MODEL`, `API_KEY`) instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Service settings after validation, with every field present
#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub url: String,
    pub model: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(default)]
    pub max_batches: Option<usize>,
}

fn default_batch_size() -> usize {
    200
}

fn default_window() -> usize {
    50
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            window: default_window(),
            max_batches: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Idle time after which a short batch is cut anyway
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default)]
    pub read_start: ReadStart,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: None,
            poll_interval: default_poll_interval(),
            read_start: ReadStart::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStart {
    Beginning,
    #[default]
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSONL file receiving findings; console when unset
    #[serde(default)]
    pub findings: Option<PathBuf>,
    /// Raw response log
    #[serde(default)]
    pub llm_log: Option<PathBuf>,
    #[serde(default = "default_progress")]
    pub progress: bool,
}

fn default_progress() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            findings: None,
            llm_log: None,
            progress: default_progress(),
        }
    }
}
