use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / jat.toml / env vars)
// =============================================================================
//
//   jat.toml:        [monitor]
//                    window_kb = 512
//
//   env var:         JAT_MONITOR__WINDOW_KB=512   (double underscore = nesting)

/// How results are written to stdout.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub monitor: MonitorFileConfig,
    #[serde(default)]
    pub output: OutputFileConfig,
}

/// Polling and parsing knobs (lives under `[monitor]` in jat.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitorFileConfig {
    /// Only the last `window_kb` KiB of each buffer are parsed (0 = all).
    #[serde(default = "default_window_kb")]
    pub window_kb: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether sessions are treated as having a task assigned when no
    /// marker has been seen yet.
    #[serde(default)]
    pub assigned_task: bool,
}

impl Default for MonitorFileConfig {
    fn default() -> Self {
        Self {
            window_kb: default_window_kb(),
            poll_interval_ms: default_poll_interval_ms(),
            assigned_task: false,
        }
    }
}

/// Output knobs (lives under `[output]` in jat.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputFileConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_window_kb() -> usize {
    256
}
fn default_poll_interval_ms() -> u64 {
    500
}

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Build a figment that layers: defaults → jat.toml → JAT_* env vars.
///
/// A missing config file is not an error; figment skips it.
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("JAT_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, overridden by CLI flags)
// =============================================================================

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    pub window_bytes: usize,
    pub poll_interval: Duration,
    pub assigned_task: bool,
    pub format: OutputFormat,
}

impl MonitorConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            window_bytes: fc.monitor.window_kb * 1024,
            poll_interval: Duration::from_millis(fc.monitor.poll_interval_ms).max(MIN_POLL_INTERVAL),
            assigned_task: fc.monitor.assigned_task,
            format: fc.output.format,
        }
    }
}
