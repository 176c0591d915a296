//! External store contract.
//!
//! The store is owned by someone else (the host platform). This module only
//! fixes the shape of what we need from it: partitioned, ordered reads that
//! hand back closeable row-set handles, and a change-notification channel.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use radar_schemas::{ChangeSignal, Partition};

// ---------------------------------------------------------------------------
// Row schema
// ---------------------------------------------------------------------------

pub const COL_ADDRESS: &str = "address";
/// Epoch milliseconds, string encoded.
pub const COL_DATE: &str = "date";
pub const COL_BODY: &str = "body";
/// Numeric direction discriminator (see `Direction::from_code`).
pub const COL_TYPE: &str = "type";
pub const COL_ID: &str = "_id";
/// Relay protocol. Null for outbound-originated rows.
pub const COL_PROTOCOL: &str = "protocol";

pub const ROW_COLUMNS: [&str; 6] = [
    COL_ADDRESS,
    COL_DATE,
    COL_BODY,
    COL_TYPE,
    COL_ID,
    COL_PROTOCOL,
];

/// One materialised row. A missing key reads as SQL NULL.
pub type Row = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortOrder {
    pub column: String,
    pub descending: bool,
}

impl SortOrder {
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "DESC" } else { "ASC" };
        write!(f, "{} {dir}", self.column)
    }
}

/// `query(partition, projection, filter, order)`. `None` means "store default".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub partition: Partition,
    pub projection: Option<Vec<String>>,
    pub filter: Option<String>,
    pub order: Option<SortOrder>,
}

impl Query {
    /// Aggregate view, no projection, no filter, no ordering.
    pub fn root() -> Self {
        Self {
            partition: Partition::All,
            projection: None,
            filter: None,
            order: None,
        }
    }

    /// One leaf partition ordered newest-first by `date`.
    pub fn newest_first(partition: Partition) -> Self {
        Self {
            partition,
            projection: None,
            filter: None,
            order: Some(SortOrder::desc(COL_DATE)),
        }
    }
}

// ---------------------------------------------------------------------------
// Row sets
// ---------------------------------------------------------------------------

/// A cursor-style result handle. Positioned before the first row until the
/// first `move_to_next`.
pub trait RowSet: Send {
    fn count(&self) -> usize;

    /// Advance to the next row. `false` once past the end.
    fn move_to_next(&mut self) -> bool;

    /// Value of `name` at the current row. `None` for NULL, for an unknown
    /// column, or when not positioned on a row.
    fn column(&self, name: &str) -> Option<&str>;

    /// Release the handle. Must tolerate being called more than once.
    fn close(&mut self);
}

/// Scoped ownership of a [`RowSet`]: `close()` runs when the guard drops,
/// including during unwinding.
pub struct RowSetGuard {
    inner: Box<dyn RowSet>,
}

impl RowSetGuard {
    pub fn new(inner: Box<dyn RowSet>) -> Self {
        Self { inner }
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn move_to_next(&mut self) -> bool {
        self.inner.move_to_next()
    }

    pub fn column(&self, name: &str) -> Option<&str> {
        self.inner.column(name)
    }
}

impl Drop for RowSetGuard {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl fmt::Debug for RowSetGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSetGuard")
            .field("count", &self.inner.count())
            .finish()
    }
}

/// Fully materialised row set. `on_close` fires exactly once, on the first
/// `close()`.
pub struct BufferedRows {
    rows: Vec<Row>,
    pos: Option<usize>,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl BufferedRows {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            pos: None,
            on_close: None,
        }
    }

    pub fn with_on_close(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn into_guard(self) -> RowSetGuard {
        RowSetGuard::new(Box::new(self))
    }
}

impl RowSet for BufferedRows {
    fn count(&self) -> usize {
        self.rows.len()
    }

    fn move_to_next(&mut self) -> bool {
        let next = self.pos.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.pos = Some(next);
            true
        } else {
            self.pos = Some(self.rows.len());
            false
        }
    }

    fn column(&self, name: &str) -> Option<&str> {
        self.pos
            .and_then(|p| self.rows.get(p))
            .and_then(|row| row.get(name))
            .map(String::as_str)
    }

    fn close(&mut self) {
        if let Some(f) = self.on_close.take() {
            f();
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Receives change signals. May be called from any thread, possibly
/// concurrently and reentrantly.
pub trait ChangeObserver: Send + Sync {
    fn on_change(&self, signal: ChangeSignal);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObserverOptions {
    /// Also fire for mutations to any partition below the registered one.
    pub notify_for_descendants: bool,
    /// Also fire for mutations the observer's own process caused.
    pub deliver_self_notifications: bool,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            notify_for_descendants: true,
            deliver_self_notifications: true,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObserverId(pub u64);

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached at all.
    Unavailable(String),
    /// A specific query failed.
    Query { partition: Partition, message: String },
    /// Observer registration or removal failed.
    Observer(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Query { partition, message } => {
                write!(f, "query on '{}' failed: {message}", partition.as_str())
            }
            StoreError::Observer(msg) => write!(f, "observer registration failed: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// The external mutable store.
pub trait MessageStore: Send + Sync {
    /// `Ok(None)` is "no handle", which callers treat the same as empty.
    fn query(&self, query: &Query) -> Result<Option<RowSetGuard>, StoreError>;

    fn register_observer(
        &self,
        observer: Arc<dyn ChangeObserver>,
        options: ObserverOptions,
    ) -> Result<ObserverId, StoreError>;

    fn unregister_observer(&self, id: ObserverId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn buffered_rows_start_before_first() {
        let mut rows = BufferedRows::new(vec![row(&[("_id", "1")]), row(&[("_id", "2")])]);
        assert_eq!(rows.column("_id"), None);
        assert!(rows.move_to_next());
        assert_eq!(rows.column("_id"), Some("1"));
        assert!(rows.move_to_next());
        assert_eq!(rows.column("_id"), Some("2"));
        assert!(!rows.move_to_next());
        assert_eq!(rows.column("_id"), None);
        assert!(!rows.move_to_next());
    }

    #[test]
    fn guard_closes_exactly_once_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&closes);
        let mut inner = BufferedRows::new(vec![]).with_on_close(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        inner.close();
        inner.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let c = Arc::clone(&closes);
        let guard = BufferedRows::new(vec![])
            .with_on_close(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .into_guard();
        drop(guard);
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn newest_first_orders_by_date_desc() {
        let q = Query::newest_first(Partition::Inbound);
        assert_eq!(q.order.as_ref().map(ToString::to_string).as_deref(), Some("date DESC"));
        assert_eq!(Query::root().partition, Partition::All);
        assert!(Query::root().order.is_none());
    }
}
