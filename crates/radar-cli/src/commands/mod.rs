//! Command handlers for the `radar` binary.
//!
//! Shared config/cursor plumbing lives here; command logic lives in the
//! submodules.

pub mod cursor;
pub mod replay;

use std::sync::Arc;

use anyhow::{Context, Result};
use radar_config::{report_unused_keys, RadarConfig, UnusedKeyPolicy};
use radar_cursor::{CursorStore, FileCursorBacking};
use tracing::{info, warn};

/// Typed config plus what is worth logging about where it came from.
pub struct Settings {
    pub config: RadarConfig,
    pub config_hash: Option<String>,
    pub unused_keys: Vec<String>,
}

impl Settings {
    /// Emit the load summary. Call after tracing is initialised.
    pub fn log_summary(&self) {
        match &self.config_hash {
            Some(hash) => info!(config_hash = %hash, "config/loaded"),
            None => info!("config/defaults"),
        }
        for pointer in &self.unused_keys {
            warn!(pointer = %pointer, "config/unused_key");
        }
    }
}

/// Load layered YAML if any paths were given, else defaults.
pub fn load_settings(paths: &[String]) -> Result<Settings> {
    if paths.is_empty() {
        return Ok(Settings {
            config: RadarConfig::default(),
            config_hash: None,
            unused_keys: Vec::new(),
        });
    }

    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = radar_config::load_layered_yaml(&path_refs)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    let config = loaded.settings()?;

    Ok(Settings {
        config,
        config_hash: Some(loaded.config_hash),
        unused_keys: report.unused_leaf_pointers,
    })
}

/// Cursor store over the durable file named in the config.
pub fn open_cursor_store(cfg: &RadarConfig) -> Result<CursorStore> {
    let backing = FileCursorBacking::open(&cfg.cursor.path)
        .with_context(|| format!("open cursor file: {}", cfg.cursor.path))?;
    CursorStore::open(Arc::new(backing), cfg.cursor.key.clone())
        .with_context(|| format!("read cursor key: {}", cfg.cursor.key))
}
