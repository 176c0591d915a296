//! radar-cursor
//!
//! Durable high-water mark: the highest record id already delivered.
//!
//! # Invariants
//!
//! - **Non-decreasing**: once advanced, the cursor never moves backwards.
//! - **Persist before publish**: the in-memory value changes only after the
//!   backing has committed the new value. A failed write leaves both the
//!   backing and the cache at the old value.
//! - **Single writer**: read-modify-write happens under one lock
//!   ([`CursorStore::lock`]); concurrent admits cannot observe the same stale
//!   cursor.

mod backing;
mod store;

pub use backing::{CursorBacking, FileCursorBacking, MemoryCursorBacking};
pub use store::{CursorGuard, CursorStore};

use std::fmt;

use radar_schemas::RecordId;

/// Raw persisted value meaning "nothing delivered yet".
pub const UNSET_RAW: i64 = -1;

/// Highest record id already delivered, or `Unset` before the first delivery.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cursor {
    Unset,
    At(RecordId),
}

impl Cursor {
    /// Decode the persisted form. `-1` is the unset sentinel; any other
    /// negative value cannot have been written by this crate.
    pub fn from_raw(raw: i64) -> Result<Self, CursorError> {
        match raw {
            UNSET_RAW => Ok(Cursor::Unset),
            r if r < 0 => Err(CursorError::Corrupt(format!(
                "negative cursor value {r} (only {UNSET_RAW} is reserved)"
            ))),
            r => Ok(Cursor::At(RecordId(r))),
        }
    }

    pub fn to_raw(self) -> i64 {
        match self {
            Cursor::Unset => UNSET_RAW,
            Cursor::At(id) => id.get(),
        }
    }

    pub fn is_unset(self) -> bool {
        matches!(self, Cursor::Unset)
    }

    pub fn id(self) -> Option<RecordId> {
        match self {
            Cursor::Unset => None,
            Cursor::At(id) => Some(id),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Unset => f.write_str("UNSET"),
            Cursor::At(id) => write!(f, "{id}"),
        }
    }
}

/// Errors raised by cursor persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// The backing store failed to read or commit.
    Backing(String),
    /// Persisted data could not be decoded.
    Corrupt(String),
    /// An advance would move the cursor backwards.
    Regression { current: RecordId, requested: RecordId },
    /// A previous holder of the cursor lock panicked.
    Poisoned,
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Backing(msg) => write!(f, "cursor backing error: {msg}"),
            CursorError::Corrupt(msg) => write!(f, "cursor data corrupt: {msg}"),
            CursorError::Regression { current, requested } => write!(
                f,
                "cursor regression refused: current={current} requested={requested}"
            ),
            CursorError::Poisoned => f.write_str("cursor lock poisoned"),
        }
    }
}

impl std::error::Error for CursorError {}
