//! In-process message store.
//!
//! Behaves like the host store as far as the pipeline can tell:
//! - rows live in one leaf partition (outbound or inbound) and carry the
//!   fixed column schema; `_id` is assigned on insert and only grows;
//! - the aggregate view returns every row, most recently mutated first;
//! - leaf queries honour `date DESC` ordering;
//! - every mutation notifies observers synchronously on the mutating thread,
//!   after the store lock is released (observers may query re-entrantly);
//! - open row-set handles are counted until closed.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use radar_ingest::{
    BufferedRows, ChangeObserver, MessageStore, ObserverId, ObserverOptions, Query, Row,
    RowSetGuard, StoreError, COL_DATE, COL_ID,
};
use radar_schemas::{ChangeSignal, Partition, RecordId};
use tracing::trace;

/// First `_id` handed out by an empty store.
const FIRST_ID: i64 = 1;

/// Query failure to inject.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InjectedFailure {
    /// Every query fails.
    Unavailable,
    /// Queries against this partition fail.
    Partition(Partition),
    /// Queries against this partition return no handle.
    NoHandle(Partition),
}

/// Who caused a mutation, relative to the observing process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    External,
    /// Caused by the watcher's own process; observers that did not opt in to
    /// self notifications are skipped.
    Local,
}

struct StoredRow {
    partition: Partition,
    columns: Row,
}

struct Registration {
    observer: Arc<dyn ChangeObserver>,
    options: ObserverOptions,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, StoredRow>,
    /// Row ids in mutation order, most recent last. Each id appears once.
    mutations: Vec<i64>,
    next_id: i64,
    observers: BTreeMap<ObserverId, Registration>,
    failure: Option<InjectedFailure>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    open_handles: Arc<AtomicUsize>,
    next_observer: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    /// Insert a row into `partition` and notify observers.
    ///
    /// A caller-supplied `_id` is kept if it is above every id issued so
    /// far; otherwise the next id is assigned. An id with no successor
    /// (`i64::MAX`) is refused and nothing is stored.
    pub fn insert(
        &self,
        partition: Partition,
        columns: Row,
        origin: Origin,
    ) -> Result<RecordId, StoreError> {
        if partition == Partition::All {
            return Err(StoreError::Query {
                partition,
                message: "rows must be inserted into a leaf partition".into(),
            });
        }

        let id = {
            let mut inner = self.lock()?;
            let requested = columns
                .get(COL_ID)
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .filter(|id| *id >= inner.next_id.max(FIRST_ID));
            let id = requested.unwrap_or(inner.next_id.max(FIRST_ID));
            let Some(next_id) = id.checked_add(1) else {
                return Err(StoreError::Query {
                    partition,
                    message: format!("_id {id} leaves no room for later inserts"),
                });
            };
            inner.next_id = next_id;

            let mut columns = columns;
            columns.insert(COL_ID.to_string(), id.to_string());
            inner.rows.insert(id, StoredRow { partition, columns });
            inner.mutations.push(id);
            id
        };

        trace!(id, partition = partition.as_str(), "memstore/insert");
        self.notify_mutation(origin);
        Ok(RecordId(id))
    }

    /// Re-mutate an existing row (e.g. a status transition), applying
    /// `changes` on top of its columns. The row moves to the head of the
    /// aggregate view and observers are notified. `_id` cannot be changed.
    pub fn update(&self, id: RecordId, changes: Row, origin: Origin) -> Result<(), StoreError> {
        {
            let mut inner = self.lock()?;
            let Some(row) = inner.rows.get_mut(&id.get()) else {
                return Err(StoreError::Query {
                    partition: Partition::All,
                    message: format!("no row with _id {id}"),
                });
            };
            for (k, v) in changes {
                if k != COL_ID {
                    row.columns.insert(k, v);
                }
            }
            inner.mutations.retain(|m| *m != id.get());
            inner.mutations.push(id.get());
        }

        trace!(%id, "memstore/update");
        self.notify_mutation(origin);
        Ok(())
    }

    /// `update` with no column changes.
    pub fn touch(&self, id: RecordId, origin: Origin) -> Result<(), StoreError> {
        self.update(id, Row::new(), origin)
    }

    /// Deliver a signal on the root partition without mutating anything.
    pub fn notify(&self, signal: ChangeSignal) {
        for reg in self.observers_matching(|_| true) {
            reg.on_change(signal);
        }
    }

    pub fn inject_failure(&self, failure: Option<InjectedFailure>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failure = failure;
        }
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    pub fn observer_count(&self) -> usize {
        self.inner.lock().map(|i| i.observers.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify_mutation(&self, origin: Origin) {
        // Mutations happen in leaf partitions, i.e. below the root every
        // observer is registered on.
        let signal = match origin {
            Origin::External => ChangeSignal::external(),
            Origin::Local => ChangeSignal::self_echo(),
        };
        let targets = self.observers_matching(|opts| {
            opts.notify_for_descendants
                && (origin == Origin::External || opts.deliver_self_notifications)
        });
        for observer in targets {
            observer.on_change(signal);
        }
    }

    fn observers_matching(
        &self,
        accept: impl Fn(&ObserverOptions) -> bool,
    ) -> Vec<Arc<dyn ChangeObserver>> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        let matching = inner
            .observers
            .values()
            .filter(|r| accept(&r.options))
            .map(|r| Arc::clone(&r.observer))
            .collect();
        matching
    }

    fn open_guard(&self, rows: Vec<Row>) -> RowSetGuard {
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        let open = Arc::clone(&self.open_handles);
        BufferedRows::new(rows)
            .with_on_close(move || {
                open.fetch_sub(1, Ordering::SeqCst);
            })
            .into_guard()
    }
}

/// SQLite-like ordering for the string `date` column: NULL sorts lowest,
/// integers compare numerically, and any other text sorts above integers.
fn date_key(row: &Row) -> (u8, i64, &str) {
    match row.get(COL_DATE) {
        None => (0, 0, ""),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(n) => (1, n, ""),
            Err(_) => (2, 0, raw.as_str()),
        },
    }
}

fn date_order(a: &Row, b: &Row) -> CmpOrdering {
    date_key(a).cmp(&date_key(b))
}

fn project(row: &Row, projection: Option<&[String]>) -> Row {
    match projection {
        None => row.clone(),
        Some(cols) => row
            .iter()
            .filter(|(k, _)| cols.iter().any(|c| c == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

impl MessageStore for MemoryStore {
    fn query(&self, query: &Query) -> Result<Option<RowSetGuard>, StoreError> {
        let rows = {
            let inner = self.lock()?;

            match inner.failure {
                Some(InjectedFailure::Unavailable) => {
                    return Err(StoreError::Unavailable("injected".into()))
                }
                Some(InjectedFailure::Partition(p)) if p == query.partition => {
                    return Err(StoreError::Query {
                        partition: p,
                        message: "injected".into(),
                    })
                }
                Some(InjectedFailure::NoHandle(p)) if p == query.partition => return Ok(None),
                _ => {}
            }

            if let Some(filter) = &query.filter {
                return Err(StoreError::Query {
                    partition: query.partition,
                    message: format!("selection filters are not supported: {filter}"),
                });
            }

            let mut rows: Vec<&StoredRow> = match query.partition {
                Partition::All => inner
                    .mutations
                    .iter()
                    .rev()
                    .filter_map(|id| inner.rows.get(id))
                    .collect(),
                leaf => inner
                    .rows
                    .values()
                    .rev()
                    .filter(|r| r.partition == leaf)
                    .collect(),
            };

            if let Some(order) = &query.order {
                if order.column == COL_DATE {
                    // Stable: ties keep the highest id first.
                    rows.sort_by(|a, b| {
                        let ord = date_order(&a.columns, &b.columns);
                        if order.descending {
                            ord.reverse()
                        } else {
                            ord
                        }
                    });
                }
            }

            let projected: Vec<Row> = rows
                .into_iter()
                .map(|r| project(&r.columns, query.projection.as_deref()))
                .collect();
            projected
        };

        trace!(partition = query.partition.as_str(), rows = rows.len(), "memstore/query");
        Ok(Some(self.open_guard(rows)))
    }

    fn register_observer(
        &self,
        observer: Arc<dyn ChangeObserver>,
        options: ObserverOptions,
    ) -> Result<ObserverId, StoreError> {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock()?
            .observers
            .insert(id, Registration { observer, options });
        trace!(%id, "memstore/observer_registered");
        Ok(id)
    }

    fn unregister_observer(&self, id: ObserverId) -> Result<(), StoreError> {
        match self.lock()?.observers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::Observer(format!("{id} is not registered"))),
        }
    }
}
