//! Unused-key guard.
//!
//! A typo in an override layer (`cursor.keys` for `cursor.key`) silently
//! falls back to the default. This walks every leaf of the merged document
//! and reports those that no setting reads.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumed_prefixes: Vec<String>,
    /// JSON pointers of leaves nothing reads, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Every pointer [`crate::RadarConfig`] deserialises. Must match `settings.rs`.
const CONSUMED: [&str; 5] = [
    "/cursor/key",
    "/cursor/path",
    "/dedup/stale_window_ms",
    "/lifecycle/restart_delay_ms",
    "/logging/filter",
];

pub fn consumed_pointers() -> &'static [&'static str] {
    &CONSUMED
}

pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let mut leaves = BTreeSet::new();
    walk_leaves(config_json, &mut String::new(), &mut leaves);

    let unused: Vec<String> = leaves.into_iter().filter(|l| !is_consumed(l)).collect();

    if policy == UnusedKeyPolicy::Fail && !unused.is_empty() {
        bail!(
            "CONFIG_UNUSED_KEYS {} key(s) not read by radar: {}",
            unused.len(),
            unused.join(", ")
        );
    }

    Ok(UnusedKeyReport {
        consumed_prefixes: CONSUMED.iter().map(|p| p.to_string()).collect(),
        unused_leaf_pointers: unused,
    })
}

/// `leaf` is `p` itself or sits below it on a segment boundary
/// (`/cursor` covers `/cursor/key`, not `/cursors`).
fn is_consumed(leaf: &str) -> bool {
    CONSUMED.iter().any(|p| {
        leaf == *p
            || leaf
                .strip_prefix(p)
                .map_or(false, |rest| rest.starts_with('/'))
    })
}

/// Collect RFC 6901 pointers of scalar leaves. Empty objects/arrays have no
/// leaves; a scalar document is the single leaf `/`.
fn walk_leaves(v: &Value, path: &mut String, out: &mut BTreeSet<String>) {
    let children: Vec<(String, &Value)> = match v {
        Value::Object(map) => map
            .iter()
            .map(|(k, child)| (k.replace('~', "~0").replace('/', "~1"), child))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, child)| (i.to_string(), child))
            .collect(),
        _ => {
            out.insert(if path.is_empty() { "/".to_string() } else { path.clone() });
            return;
        }
    };

    for (token, child) in children {
        let mark = path.len();
        path.push('/');
        path.push_str(&token);
        walk_leaves(child, path, out);
        path.truncate(mark);
    }
}
