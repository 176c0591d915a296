use std::fmt;
use std::sync::{Arc, Mutex};

use radar_config::RadarConfig;
use radar_cursor::{Cursor, CursorBacking, CursorError, CursorStore};
use radar_dedup::{DedupConfig, DedupFilter, TimeSource};
use radar_ingest::{MessageStore, ObserverId, ObserverOptions, SnapshotResolver, StoreError};
use tracing::{error, info};

use crate::listener::{ChangeListener, ListenerStats};
use crate::subscriber::RecordSubscriber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    Config(String),
    Cursor(CursorError),
    Store(StoreError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Config(msg) => write!(f, "invalid runtime config: {msg}"),
            RuntimeError::Cursor(e) => write!(f, "cursor: {e}"),
            RuntimeError::Store(e) => write!(f, "store: {e}"),
        }
    }
}

impl std::error::Error for RuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RuntimeError::Config(_) => None,
            RuntimeError::Cursor(e) => Some(e),
            RuntimeError::Store(e) => Some(e),
        }
    }
}

impl From<CursorError> for RuntimeError {
    fn from(e: CursorError) -> Self {
        RuntimeError::Cursor(e)
    }
}

impl From<StoreError> for RuntimeError {
    fn from(e: StoreError) -> Self {
        RuntimeError::Store(e)
    }
}

/// Entry point: wires store, cursor, clock and subscriber into a running
/// watcher.
pub struct Radar;

impl Radar {
    /// Build the pipeline and register it on the store.
    ///
    /// The listener opts in to self notifications and to notifications for
    /// every partition below the root.
    pub fn start(
        store: Arc<dyn MessageStore>,
        backing: Arc<dyn CursorBacking>,
        clock: Arc<dyn TimeSource>,
        subscriber: Arc<dyn RecordSubscriber>,
        config: &RadarConfig,
    ) -> Result<WatcherHandle, RuntimeError> {
        config
            .validate()
            .map_err(|e| RuntimeError::Config(format!("{e:#}")))?;

        let cursor = CursorStore::open(backing, config.cursor.key.clone())?;
        let baseline = cursor.current()?;

        let dedup = DedupFilter::new(
            cursor,
            clock,
            DedupConfig {
                stale_window_ms: config.dedup.stale_window_ms,
            },
        );
        let resolver = SnapshotResolver::new(Arc::clone(&store));
        let listener = Arc::new(ChangeListener::new(resolver, dedup, subscriber));

        let observer = store.register_observer(
            listener.clone(),
            ObserverOptions {
                notify_for_descendants: true,
                deliver_self_notifications: true,
            },
        )?;

        info!(
            %observer,
            cursor = %baseline,
            stale_window_ms = config.dedup.stale_window_ms,
            "radar/start"
        );

        Ok(WatcherHandle {
            store,
            listener,
            observer: Mutex::new(Some(observer)),
        })
    }
}

/// Owned handle to a running watcher. Dropping it stops the watcher.
pub struct WatcherHandle {
    store: Arc<dyn MessageStore>,
    listener: Arc<ChangeListener>,
    observer: Mutex<Option<ObserverId>>,
}

impl WatcherHandle {
    /// Unregister from the store. Idempotent.
    pub fn stop(&self) -> Result<(), RuntimeError> {
        let taken = match self.observer.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(id) = taken {
            self.store.unregister_observer(id)?;
            info!(observer = %id, stats = ?self.listener.stats(), "radar/stop");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.observer.lock().map(|o| o.is_some()).unwrap_or(false)
    }

    /// Re-register the subscriber. The previous one receives nothing after
    /// this returns.
    pub fn replace_subscriber(&self, subscriber: Arc<dyn RecordSubscriber>) {
        self.listener.replace_subscriber(subscriber);
    }

    pub fn stats(&self) -> ListenerStats {
        self.listener.stats()
    }

    pub fn is_halted(&self) -> bool {
        self.listener.is_halted()
    }

    pub fn cursor(&self) -> Result<Cursor, CursorError> {
        self.listener.cursor()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "radar/stop_failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radar_cursor::MemoryCursorBacking;
    use radar_dedup::ManualTimeSource;
    use radar_ingest::Row;
    use radar_schemas::{Partition, Record, RecordId};

    use crate::{MemoryStore, NullSubscriber, Origin};

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<Record>>,
    }

    impl RecordSubscriber for Collect {
        fn on_record_sent(&self, record: &Record) {
            self.seen.lock().unwrap().push(record.clone());
        }

        fn on_record_received(&self, record: &Record) {
            self.seen.lock().unwrap().push(record.clone());
        }
    }

    fn inbound_row(date: i64) -> Row {
        [
            ("address", "+15550100".to_string()),
            ("date", date.to_string()),
            ("body", "hi".to_string()),
            ("type", "1".to_string()),
            ("protocol", "0".to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    fn start(store: &Arc<MemoryStore>, sub: Arc<dyn RecordSubscriber>) -> WatcherHandle {
        Radar::start(
            store.clone(),
            Arc::new(MemoryCursorBacking::new()),
            Arc::new(ManualTimeSource::at(1_000)),
            sub,
            &RadarConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn start_registers_and_stop_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let handle = start(&store, Arc::new(NullSubscriber));
        assert_eq!(store.observer_count(), 1);
        assert!(handle.is_running());

        handle.stop().unwrap();
        handle.stop().unwrap();
        assert_eq!(store.observer_count(), 0);
        assert!(!handle.is_running());
    }

    #[test]
    fn drop_unregisters() {
        let store = Arc::new(MemoryStore::new());
        drop(start(&store, Arc::new(NullSubscriber)));
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn invalid_config_is_refused() {
        let mut cfg = RadarConfig::default();
        cfg.dedup.stale_window_ms = -1;
        let err = Radar::start(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryCursorBacking::new()),
            Arc::new(ManualTimeSource::at(0)),
            Arc::new(NullSubscriber),
            &cfg,
        )
        .err()
        .unwrap();
        assert!(matches!(err, RuntimeError::Config(_)));
    }

    #[test]
    fn replaced_subscriber_takes_over() {
        let store = Arc::new(MemoryStore::new());
        let first = Arc::new(Collect::default());
        let second = Arc::new(Collect::default());
        let handle = start(&store, first.clone());

        store.insert(Partition::Inbound, inbound_row(900), Origin::External).unwrap();
        handle.replace_subscriber(second.clone());
        store.insert(Partition::Inbound, inbound_row(950), Origin::External).unwrap();

        let ids = |c: &Collect| c.seen.lock().unwrap().iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), vec![RecordId(1)]);
        assert_eq!(ids(&second), vec![RecordId(2)]);
        assert_eq!(handle.cursor().unwrap(), Cursor::At(RecordId(2)));

        let stats = serde_json::to_value(handle.stats()).unwrap();
        assert_eq!(stats["dispatched_received"], 2);
        assert_eq!(stats["signals"], 2);
    }
}
