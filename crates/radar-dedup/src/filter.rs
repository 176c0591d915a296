use std::sync::Arc;

use radar_cursor::{Cursor, CursorError, CursorStore};
use radar_schemas::Record;
use tracing::debug;

use crate::{decide, Admission, TimeSource};

/// First-run freshness window (ms).
pub const DEFAULT_STALE_WINDOW_MS: i64 = 5_000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DedupConfig {
    pub stale_window_ms: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            stale_window_ms: DEFAULT_STALE_WINDOW_MS,
        }
    }
}

/// Owns the cursor store; the only component that reads or advances it.
pub struct DedupFilter {
    cursor: CursorStore,
    clock: Arc<dyn TimeSource>,
    config: DedupConfig,
}

impl DedupFilter {
    pub fn new(cursor: CursorStore, clock: Arc<dyn TimeSource>, config: DedupConfig) -> Self {
        Self {
            cursor,
            clock,
            config,
        }
    }

    /// Decide and, on `Admit`, durably advance the cursor before returning.
    ///
    /// The cursor lock is held from read to advance, so concurrent callers
    /// serialise. A persistence failure is returned as `Err`; the candidate
    /// is then neither admitted nor recorded.
    pub fn admit(&self, candidate: &Record) -> Result<Admission, CursorError> {
        let mut guard = self.cursor.lock()?;
        let cursor = guard.current();
        let now = self.clock.now();

        let decision = decide(
            cursor,
            candidate.id,
            candidate.timestamp,
            now,
            self.config.stale_window_ms,
        );

        match decision {
            Admission::Admit => {
                guard.advance(candidate.id)?;
                debug!(id = %candidate.id, prev = %cursor, "dedup/admit");
            }
            Admission::Reject(reason) => {
                debug!(
                    id = %candidate.id,
                    cursor = %cursor,
                    age_ms = now.millis_since(candidate.timestamp),
                    reason = reason.as_str(),
                    "dedup/reject"
                );
            }
        }

        Ok(decision)
    }

    pub fn cursor(&self) -> Result<Cursor, CursorError> {
        self.cursor.current()
    }

    pub fn config(&self) -> DedupConfig {
        self.config
    }
}
