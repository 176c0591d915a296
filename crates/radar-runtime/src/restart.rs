use radar_dedup::TimeSource;
use radar_schemas::Timestamp;
use serde::Serialize;
use tracing::info;

/// When the host should call `Radar::start` again after the watcher was torn
/// down underneath it.
///
/// This crate does not schedule anything itself; the plan is handed to the
/// host's wake-up mechanism.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestartPlan {
    pub torn_down_at: Timestamp,
    pub restart_at: Timestamp,
}

impl RestartPlan {
    pub fn after_teardown(clock: &dyn TimeSource, delay_ms: i64) -> Self {
        let now = clock.now();
        let plan = Self {
            torn_down_at: now,
            restart_at: now.plus_millis(delay_ms.max(0)),
        };
        info!(
            torn_down_at = now.epoch_ms(),
            restart_at = plan.restart_at.epoch_ms(),
            "lifecycle/restart_scheduled"
        );
        plan
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        now >= self.restart_at
    }

    /// Milliseconds until `restart_at`, zero once due.
    pub fn remaining_ms(&self, now: Timestamp) -> i64 {
        self.restart_at.millis_since(now).max(0)
    }
}
