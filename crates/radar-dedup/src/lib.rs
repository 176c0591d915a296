//! radar-dedup
//!
//! Decides whether a parsed record is genuinely new.
//!
//! Decision rule:
//! - No baseline yet (cursor `Unset`): admit only if the record is fresh,
//!   i.e. `now - timestamp <= stale_window`. This keeps the historical
//!   backlog from being replayed on first run.
//! - Baseline exists: admit iff `id > cursor`. The timestamp is ignored.
//!
//! The rule itself ([`decide`]) is pure. [`DedupFilter`] wraps it with the
//! cursor lock, the injected clock and the persist-then-publish advance.

mod clock;
mod filter;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource};
pub use filter::{DedupConfig, DedupFilter, DEFAULT_STALE_WINDOW_MS};

use radar_cursor::Cursor;
use radar_schemas::{RecordId, Timestamp};

/// Outcome of a dedup decision.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Reject(RejectReason),
}

impl Admission {
    pub fn is_admit(self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Why a candidate was not admitted. Both are expected steady-state outcomes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// First observation, but older than the staleness window.
    Stale,
    /// Identifier at or below the cursor.
    AlreadySeen,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::Stale => "stale",
            RejectReason::AlreadySeen => "already_seen",
        }
    }
}

/// The dedup rule. Pure: no IO, no clock.
pub fn decide(
    cursor: Cursor,
    candidate_id: RecordId,
    candidate_ts: Timestamp,
    now: Timestamp,
    stale_window_ms: i64,
) -> Admission {
    let is_first = cursor.is_unset();
    let is_stale = now.millis_since(candidate_ts) > stale_window_ms;

    let admit_new = match cursor {
        Cursor::Unset => !is_stale,
        Cursor::At(last) => candidate_id > last,
    };

    if admit_new {
        Admission::Admit
    } else if is_first && is_stale {
        Admission::Reject(RejectReason::Stale)
    } else {
        Admission::Reject(RejectReason::AlreadySeen)
    }
}
