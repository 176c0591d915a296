//! radar-config
//!
//! Layered YAML configuration for the radar watcher.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - The merged document is canonicalised and hashed (SHA-256, hex) so a run
//!   can be tied to the exact settings it used.
//! - [`RadarConfig`] is the typed view the runtime consumes; every key has a
//!   default, so an empty document is a valid config.

mod settings;
mod unused;

pub use settings::{
    CursorSettings, DedupSettings, LifecycleSettings, LoggingSettings, RadarConfig,
    DEFAULT_CURSOR_KEY, DEFAULT_CURSOR_PATH, DEFAULT_LOG_FILTER, DEFAULT_RESTART_DELAY_MS,
    DEFAULT_STALE_WINDOW_MS,
};
pub use unused::{consumed_pointers, report_unused_keys, UnusedKeyPolicy, UnusedKeyReport};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

/// Merged document plus its fingerprint.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    fn from_merged(config_json: Value) -> Result<Self> {
        // Map is BTreeMap-backed (no `preserve_order`), so keys serialise sorted.
        let canonical_json =
            serde_json::to_string(&config_json).context("serialize merged config")?;
        let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
        Ok(Self {
            config_hash,
            canonical_json,
            config_json,
        })
    }

    /// Typed settings for the merged document.
    pub fn settings(&self) -> Result<RadarConfig> {
        RadarConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (n, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value = serde_yaml::from_str(raw)
            .with_context(|| format!("config layer {} is not valid yaml", n + 1))?;
        // Empty document: no overrides.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer)
            .with_context(|| format!("config layer {} has no json form", n + 1))?;
        overlay(&mut merged, layer);
    }
    LoadedConfig::from_merged(merged)
}

/// Objects merge key by key; anything else in `top` replaces `base`.
fn overlay(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(base_map), Value::Object(top_map)) => {
            for (k, v) in top_map {
                match base_map.get_mut(&k) {
                    Some(slot) => overlay(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layers_override_earlier_ones() {
        let base = "dedup:\n  stale_window_ms: 5000\ncursor:\n  key: a\n";
        let overlay = "cursor:\n  key: b\n";
        let loaded = load_layered_yaml_from_strings(&[base, overlay]).unwrap();

        assert_eq!(loaded.config_json.pointer("/cursor/key").unwrap(), "b");
        assert_eq!(
            loaded.config_json.pointer("/dedup/stale_window_ms").unwrap(),
            5000
        );
    }

    #[test]
    fn empty_document_is_ignored() {
        let loaded = load_layered_yaml_from_strings(&["", "cursor:\n  key: k\n"]).unwrap();
        assert_eq!(loaded.config_json.pointer("/cursor/key").unwrap(), "k");
    }

    #[test]
    fn invalid_yaml_names_the_layer() {
        let err = load_layered_yaml_from_strings(&["{}", "cursor: [unclosed"]).unwrap_err();
        assert!(err.to_string().contains("layer 2"));
    }

    #[test]
    fn hash_ignores_key_order_across_layers() {
        let a = load_layered_yaml_from_strings(&["cursor:\n  key: k\n  path: p\n"]).unwrap();
        let b = load_layered_yaml_from_strings(&["cursor:\n  path: p\n", "cursor:\n  key: k\n"])
            .unwrap();
        assert_eq!(a.config_hash, b.config_hash);
        assert_eq!(a.canonical_json, r#"{"cursor":{"key":"k","path":"p"}}"#);
    }
}
