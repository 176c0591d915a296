use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use radar_schemas::Timestamp;

/// Wall-clock source. Injected so dedup decisions are deterministic under test.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// UTC wall clock.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(Utc::now().timestamp_millis())
    }
}

/// Manually driven clock. Clones share the same reading.
#[derive(Clone, Debug, Default)]
pub struct ManualTimeSource {
    now_ms: Arc<AtomicI64>,
}

impl ManualTimeSource {
    pub fn at(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_reading() {
        let a = ManualTimeSource::at(1_000);
        let b = a.clone();
        a.advance(250);
        assert_eq!(b.now(), Timestamp(1_250));
        b.set(7);
        assert_eq!(a.now(), Timestamp(7));
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemTimeSource.now().epoch_ms() > 1_577_836_800_000);
    }
}
