//! radar-schemas
//!
//! Typed records and identifiers shared by every radar crate.
//!
//! Pure data. No IO, no clock, no logging.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Store-assigned record identifier. Monotonically increasing per store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Epoch milliseconds (UTC). Comparable; not guaranteed unique.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn from_epoch_ms(ms: i64) -> Self {
        Self(ms)
    }

    pub fn epoch_ms(self) -> i64 {
        self.0
    }

    /// Parse the store's string-encoded epoch-millisecond field.
    ///
    /// Surrounding whitespace is tolerated; anything else that is not a
    /// base-10 `i64` is rejected.
    pub fn parse_epoch_ms(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self)
    }

    /// `self - earlier` in milliseconds, saturating at the `i64` bounds.
    pub fn millis_since(self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn plus_millis(self, ms: i64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Human-facing UTC rendering. `None` when out of chrono's range.
    pub fn to_utc(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.0).single()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ---------------------------------------------------------------------------
// Direction / partition
// ---------------------------------------------------------------------------

/// Which way a record travelled relative to the device.
///
/// Resolved once by the snapshot resolver (from the partition it queried)
/// and carried forward unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received by the device (MT).
    Inbound,
    /// Sent from the device (MO).
    Outbound,
}

impl Direction {
    /// Numeric `type` code used by the store for inbound rows.
    pub const INBOUND_CODE: i64 = 1;
    /// Numeric `type` code used by the store for outbound rows.
    pub const OUTBOUND_CODE: i64 = 2;

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            Self::INBOUND_CODE => Some(Direction::Inbound),
            Self::OUTBOUND_CODE => Some(Direction::Outbound),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Direction::Inbound => Self::INBOUND_CODE,
            Direction::Outbound => Self::OUTBOUND_CODE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// A logical subset of the external store that can be queried on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Aggregate view over every record (no filter, no ordering).
    All,
    Outbound,
    Inbound,
}

/// Direction -> partition lookup table. Row order is fixed by
/// [`Partition::for_direction`].
const DIRECTION_PARTITIONS: [(Direction, Partition); 2] = [
    (Direction::Outbound, Partition::Outbound),
    (Direction::Inbound, Partition::Inbound),
];

impl Partition {
    /// Always a leaf partition.
    pub fn for_direction(direction: Direction) -> Partition {
        let row = match direction {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        };
        DIRECTION_PARTITIONS[row].1
    }

    /// Direction implied by a leaf partition. `None` for the aggregate view.
    pub fn direction(self) -> Option<Direction> {
        DIRECTION_PARTITIONS
            .iter()
            .find(|(_, p)| *p == self)
            .map(|(d, _)| *d)
    }

    /// Store-side partition identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::All => "all",
            Partition::Outbound => "sent",
            Partition::Inbound => "inbox",
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A typed record read from the store. Constructed per reconciliation pass
/// and never stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Counterpart address (MSISDN or alphanumeric sender).
    pub origin_address: String,
    pub timestamp: Timestamp,
    pub body: String,
    pub direction: Direction,
    pub id: RecordId,
}

impl Record {
    pub fn new(
        origin_address: impl Into<String>,
        timestamp: Timestamp,
        body: impl Into<String>,
        direction: Direction,
        id: RecordId,
    ) -> Self {
        Self {
            origin_address: origin_address.into(),
            timestamp,
            body: body.into(),
            direction,
            id,
        }
    }
}

// ---------------------------------------------------------------------------
// Change signal
// ---------------------------------------------------------------------------

/// "The store was mutated." Carries no record payload; the listener must
/// re-query to find out what changed.
///
/// `self_change` is informational only. The dedup filter, not notification
/// filtering, decides what is new.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSignal {
    pub self_change: bool,
}

impl ChangeSignal {
    pub fn external() -> Self {
        Self { self_change: false }
    }

    pub fn self_echo() -> Self {
        Self { self_change: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_parse_accepts_trimmed_integers_only() {
        assert_eq!(
            Timestamp::parse_epoch_ms(" 1700000000000 "),
            Some(Timestamp(1_700_000_000_000))
        );
        assert_eq!(Timestamp::parse_epoch_ms("abc"), None);
        assert_eq!(Timestamp::parse_epoch_ms(""), None);
        assert_eq!(Timestamp::parse_epoch_ms("12.5"), None);
    }

    #[test]
    fn millis_since_saturates() {
        assert_eq!(Timestamp(i64::MAX).millis_since(Timestamp(-1)), i64::MAX);
        assert_eq!(Timestamp(1_000).millis_since(Timestamp(900)), 100);
        assert_eq!(Timestamp(900).millis_since(Timestamp(1_000)), -100);
    }

    #[test]
    fn direction_codes_match_store_contract() {
        assert_eq!(Direction::from_code(1), Some(Direction::Inbound));
        assert_eq!(Direction::from_code(2), Some(Direction::Outbound));
        assert_eq!(Direction::from_code(-1), None);
        assert_eq!(Direction::from_code(3), None);
        assert_eq!(Direction::Outbound.code(), 2);
    }

    #[test]
    fn partition_lookup_is_symmetric() {
        for d in [Direction::Inbound, Direction::Outbound] {
            assert_eq!(Partition::for_direction(d).direction(), Some(d));
        }
        assert_eq!(Partition::All.direction(), None);
        for (d, p) in DIRECTION_PARTITIONS {
            assert_eq!(Partition::for_direction(d), p);
            assert_ne!(p, Partition::All);
        }
        assert_eq!(Partition::for_direction(Direction::Outbound).as_str(), "sent");
        assert_eq!(Partition::for_direction(Direction::Inbound).as_str(), "inbox");
    }

    #[test]
    fn record_equality_is_structural() {
        let a = Record::new("+100", Timestamp(5), "hi", Direction::Inbound, RecordId(1));
        let b = a.clone();
        assert_eq!(a, b);

        let c = Record { direction: Direction::Outbound, ..a.clone() };
        assert_ne!(a, c);
    }

    #[test]
    fn record_serializes_with_plain_scalars() {
        let r = Record::new("+100", Timestamp(5), "hi", Direction::Outbound, RecordId(9));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["id"], 9);
        assert_eq!(v["timestamp"], 5);
        assert_eq!(v["direction"], "outbound");
    }
}
