use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Top-level config (cogs.toml + COGS_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CogsConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Durable store defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default entry lifetime in days. Zero means session-scoped.
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i32,
    /// Default `path=` attribute on writes.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            path: default_path(),
        }
    }
}

/// Scheduler timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval of the step machine's driving timer, shared by all steps.
    #[serde(default = "default_drive_ms")]
    pub drive_interval_ms: u64,
    /// Coarse interval of the resume-after-reload poll.
    #[serde(default = "default_resume_ms")]
    pub resume_poll_ms: u64,
    /// Default interval for recurring tasks added without one.
    #[serde(default = "default_task_ms")]
    pub task_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            drive_interval_ms: default_drive_ms(),
            resume_poll_ms: default_resume_ms(),
            task_interval_ms: default_task_ms(),
        }
    }
}

impl CogsConfig {
    /// Load from an explicit TOML path (or `cogs.toml` in the working
    /// directory) with `COGS_*` environment overrides on top.
    pub fn load(path: Option<&str>) -> crate::Result<Self> {
        let path = path.unwrap_or("cogs.toml");
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("COGS_").split("_"))
            .extract()
            .map_err(|e| CoreError::Config(e.to_string()))
    }
}

fn default_ttl_days() -> i32 {
    7
}

fn default_path() -> String {
    "/".to_string()
}

fn default_drive_ms() -> u64 {
    500
}

fn default_resume_ms() -> u64 {
    2000
}

fn default_task_ms() -> u64 {
    1000
}
