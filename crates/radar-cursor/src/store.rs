use std::sync::{Arc, Mutex, MutexGuard};

use radar_schemas::RecordId;
use tracing::debug;

use crate::{Cursor, CursorBacking, CursorError};

/// The cursor plus the backing it is persisted to.
///
/// The persisted value is loaded once at [`open`](CursorStore::open); after
/// that the cached value is authoritative for reads and the backing is only
/// written.
pub struct CursorStore {
    backing: Arc<dyn CursorBacking>,
    key: String,
    cursor: Mutex<Cursor>,
}

impl CursorStore {
    pub fn open(
        backing: Arc<dyn CursorBacking>,
        key: impl Into<String>,
    ) -> Result<Self, CursorError> {
        let key = key.into();
        let cursor = match backing.get(&key)? {
            Some(raw) => Cursor::from_raw(raw)?,
            None => Cursor::Unset,
        };
        debug!(key = %key, cursor = %cursor, "cursor/opened");
        Ok(Self {
            backing,
            key,
            cursor: Mutex::new(cursor),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Snapshot of the current value. Do not use for read-modify-write; use
    /// [`lock`](CursorStore::lock).
    pub fn current(&self) -> Result<Cursor, CursorError> {
        Ok(*self.cursor.lock().map_err(|_| CursorError::Poisoned)?)
    }

    /// Exclusive access for a read-decide-advance sequence.
    pub fn lock(&self) -> Result<CursorGuard<'_>, CursorError> {
        let cursor = self.cursor.lock().map_err(|_| CursorError::Poisoned)?;
        Ok(CursorGuard {
            backing: self.backing.as_ref(),
            key: &self.key,
            cursor,
        })
    }

    /// Forget every delivery (back to `Unset`). Operator tooling only; the
    /// watcher must not be running against the same backing.
    pub fn reset(&self) -> Result<(), CursorError> {
        let mut cursor = self.cursor.lock().map_err(|_| CursorError::Poisoned)?;
        self.backing.set(&self.key, Cursor::Unset.to_raw())?;
        *cursor = Cursor::Unset;
        debug!(key = %self.key, "cursor/reset");
        Ok(())
    }
}

/// Held cursor lock. Dropping it releases the lock.
pub struct CursorGuard<'a> {
    backing: &'a dyn CursorBacking,
    key: &'a str,
    cursor: MutexGuard<'a, Cursor>,
}

impl CursorGuard<'_> {
    pub fn current(&self) -> Cursor {
        *self.cursor
    }

    /// Persist `id` as the new high-water mark, then publish it.
    ///
    /// Advancing to the current value is a no-op. Moving backwards is refused.
    pub fn advance(&mut self, id: RecordId) -> Result<(), CursorError> {
        if let Cursor::At(current) = *self.cursor {
            if id < current {
                return Err(CursorError::Regression {
                    current,
                    requested: id,
                });
            }
            if id == current {
                return Ok(());
            }
        }

        self.backing.set(self.key, id.get())?;
        *self.cursor = Cursor::At(id);
        Ok(())
    }
}
