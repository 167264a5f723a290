//! Watcher configuration loaded from `config.toml` under the data dir.

use color_eyre::eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the watcher config under the data dir.
pub const CONFIG_FILE: &str = "config.toml";

/// Top-level watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    /// Seconds between reconciliation passes (default: 60).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// How long a rendered notification stays up before it is cleared,
    /// in milliseconds (default: 10000).
    #[serde(default = "default_notification_clear")]
    pub notification_clear_ms: u64,

    /// Where notifications are rendered.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Notification output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Output mode: "stdout" or "file".
    #[serde(default = "default_output_mode")]
    pub mode: String,

    /// Sink path for file mode. Defaults to `notifications.jsonl` under
    /// the data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_notification_clear() -> u64 {
    10_000
}

fn default_output_mode() -> String {
    "stdout".into()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            notification_clear_ms: default_notification_clear(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mode: default_output_mode(),
            path: None,
        }
    }
}

impl WatchConfig {
    /// Load config from `config.toml` under the data dir. A missing file
    /// yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).wrap_err_with(|| format!("failed to read {}", path.display()));
            }
        };
        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        config.validate();
        Ok(config)
    }

    /// Write the default config file, leaving an existing one untouched.
    pub fn write_default(data_dir: &Path) -> Result<PathBuf> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            eprintln!("[config] already exists: {}", path.display());
            return Ok(path);
        }
        std::fs::create_dir_all(data_dir)
            .wrap_err_with(|| format!("failed to create {}", data_dir.display()))?;
        let toml_str =
            toml::to_string_pretty(&Self::default()).wrap_err("failed to serialize config")?;
        std::fs::write(&path, toml_str)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Warn about suspicious values. The watcher clamps where it must, so
    /// this never fails.
    fn validate(&self) {
        if self.poll_interval_secs == 0 {
            eprintln!("[config] poll_interval_secs is 0; the watcher will use 1s");
        }
        if self.notification_clear_ms == 0 {
            eprintln!("[config] notification_clear_ms is 0; notifications will clear immediately");
        }
        if self.output.mode != "stdout" && self.output.mode != "file" {
            eprintln!(
                "[config] unknown output mode {:?}; the watcher will refuse to start",
                self.output.mode
            );
        }
    }
}
