//! Key/value persistence behind the cursor.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::CursorError;

/// Durable key/value persistence with synchronous commit.
///
/// `set` must not return `Ok` until the value would survive a process crash.
pub trait CursorBacking: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<i64>, CursorError>;

    fn set(&self, key: &str, value: i64) -> Result<(), CursorError>;
}

// ---------------------------------------------------------------------------
// In-memory backing
// ---------------------------------------------------------------------------

/// Volatile backing. Clones share the same map, so reopening a
/// [`crate::CursorStore`] over a clone behaves like a process restart that
/// kept its storage.
#[derive(Clone, Debug, Default)]
pub struct MemoryCursorBacking {
    entries: Arc<Mutex<BTreeMap<String, i64>>>,
}

impl MemoryCursorBacking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read for assertions; bypasses the cursor store.
    pub fn peek(&self, key: &str) -> Option<i64> {
        self.entries.lock().ok().and_then(|m| m.get(key).copied())
    }
}

impl CursorBacking for MemoryCursorBacking {
    fn get(&self, key: &str) -> Result<Option<i64>, CursorError> {
        let entries = self.entries.lock().map_err(|_| CursorError::Poisoned)?;
        Ok(entries.get(key).copied())
    }

    fn set(&self, key: &str, value: i64) -> Result<(), CursorError> {
        let mut entries = self.entries.lock().map_err(|_| CursorError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File backing
// ---------------------------------------------------------------------------

/// JSON object on disk (`{"last_record_parsed": 42}`).
///
/// Every `set` rewrites the whole object to a sibling temp file, fsyncs it,
/// then renames it over the target, so readers only ever see a complete
/// document. A missing file means every key is unset.
#[derive(Debug)]
pub struct FileCursorBacking {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, i64>>,
}

impl FileCursorBacking {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CursorError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| CursorError::Backing(format!("read {}: {e}", path.display())))?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| CursorError::Corrupt(format!("{}: {e}", path.display())))?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "cursor/file_opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_atomic(&self, entries: &BTreeMap<String, i64>) -> Result<(), CursorError> {
        let io_err = |what: &str, e: std::io::Error| {
            CursorError::Backing(format!("{what} {}: {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err("create dir for", e))?;
        }

        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| CursorError::Backing(format!("serialize cursor: {e}")))?;

        let tmp = self.temp_path();
        let mut file = File::create(&tmp).map_err(|e| io_err("create temp for", e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|e| io_err("write temp for", e))?;
        file.sync_all().map_err(|e| io_err("fsync temp for", e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| io_err("rename temp over", e))?;
        Ok(())
    }
}

impl CursorBacking for FileCursorBacking {
    fn get(&self, key: &str) -> Result<Option<i64>, CursorError> {
        let entries = self.entries.lock().map_err(|_| CursorError::Poisoned)?;
        Ok(entries.get(key).copied())
    }

    fn set(&self, key: &str, value: i64) -> Result<(), CursorError> {
        let mut entries = self.entries.lock().map_err(|_| CursorError::Poisoned)?;
        let mut next = entries.clone();
        next.insert(key.to_string(), value);
        self.write_atomic(&next)?;
        *entries = next;
        Ok(())
    }
}
