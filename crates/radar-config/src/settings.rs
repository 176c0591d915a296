use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use radar_dedup::DEFAULT_STALE_WINDOW_MS;

/// Cursor key inside the backing store.
pub const DEFAULT_CURSOR_KEY: &str = "last_record_parsed";
/// Durable cursor file, relative to the working directory.
pub const DEFAULT_CURSOR_PATH: &str = "radar-cursor.json";
/// Delay the host waits before re-starting a torn-down watcher (ms).
pub const DEFAULT_RESTART_DELAY_MS: i64 = 1_000;
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Typed settings consumed by the runtime and CLI.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub dedup: DedupSettings,
    pub cursor: CursorSettings,
    pub lifecycle: LifecycleSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupSettings {
    /// Only consulted while no cursor baseline exists.
    pub stale_window_ms: i64,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            stale_window_ms: DEFAULT_STALE_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSettings {
    pub path: String,
    pub key: String,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_CURSOR_PATH.to_string(),
            key: DEFAULT_CURSOR_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleSettings {
    pub restart_delay_ms: i64,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RadarConfig {
    /// Decode + validate a merged config document.
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let cfg: RadarConfig =
            serde_json::from_value(config_json.clone()).context("config schema mismatch")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dedup.stale_window_ms < 0 {
            bail!(
                "CONFIG_INVALID dedup.stale_window_ms must be >= 0, got {}",
                self.dedup.stale_window_ms
            );
        }
        if self.lifecycle.restart_delay_ms < 0 {
            bail!(
                "CONFIG_INVALID lifecycle.restart_delay_ms must be >= 0, got {}",
                self.lifecycle.restart_delay_ms
            );
        }
        if self.cursor.key.trim().is_empty() {
            bail!("CONFIG_INVALID cursor.key must not be empty");
        }
        if self.cursor.path.trim().is_empty() {
            bail!("CONFIG_INVALID cursor.path must not be empty");
        }
        Ok(())
    }
}
