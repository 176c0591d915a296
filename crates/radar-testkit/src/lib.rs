//! Test helpers shared by the radar scenario tests.
//!
//! Nothing here is used by production code paths.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use radar_config::RadarConfig;
use radar_cursor::{CursorBacking, CursorError, FileCursorBacking, MemoryCursorBacking};
use radar_dedup::ManualTimeSource;
use radar_ingest::{Row, COL_ADDRESS, COL_BODY, COL_DATE, COL_ID, COL_PROTOCOL, COL_TYPE};
use radar_runtime::{MemoryStore, Origin, Radar, RecordSubscriber, WatcherHandle};
use radar_schemas::{Direction, Partition, Record, RecordId};

// ---------------------------------------------------------------------------
// Subscriber
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Callback {
    Sent,
    Received,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub callback: Callback,
    pub record: Record,
}

/// Keeps every callback in arrival order.
#[derive(Debug, Default)]
pub struct RecordingSubscriber {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().map(|d| d.clone()).unwrap_or_default()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.deliveries().into_iter().map(|d| d.record.id).collect()
    }

    pub fn len(&self) -> usize {
        self.deliveries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, callback: Callback, record: &Record) {
        if let Ok(mut d) = self.deliveries.lock() {
            d.push(Delivery {
                callback,
                record: record.clone(),
            });
        }
    }
}

impl RecordSubscriber for RecordingSubscriber {
    fn on_record_sent(&self, record: &Record) {
        self.push(Callback::Sent, record);
    }

    fn on_record_received(&self, record: &Record) {
        self.push(Callback::Received, record);
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Builds a row with the fixed store schema.
///
/// Outbound rows carry `type = 2` and no `protocol`; inbound rows carry
/// `type = 1` and `protocol = 0`, matching how the host store marks them.
#[derive(Clone, Debug)]
pub struct RowBuilder {
    cols: Row,
}

impl RowBuilder {
    pub fn outbound() -> Self {
        Self { cols: Row::new() }
            .set(COL_ADDRESS, "+15550100")
            .set(COL_BODY, "outbound body")
            .set(COL_TYPE, &Direction::OUTBOUND_CODE.to_string())
            .set(COL_DATE, "0")
    }

    pub fn inbound() -> Self {
        Self { cols: Row::new() }
            .set(COL_ADDRESS, "+15550199")
            .set(COL_BODY, "inbound body")
            .set(COL_TYPE, &Direction::INBOUND_CODE.to_string())
            .set(COL_PROTOCOL, "0")
            .set(COL_DATE, "0")
    }

    pub fn set(mut self, column: &str, value: &str) -> Self {
        self.cols.insert(column.to_string(), value.to_string());
        self
    }

    /// Drop a column so it reads as NULL.
    pub fn without(mut self, column: &str) -> Self {
        self.cols.remove(column);
        self
    }

    pub fn date(self, epoch_ms: i64) -> Self {
        self.set(COL_DATE, &epoch_ms.to_string())
    }

    pub fn id(self, id: i64) -> Self {
        self.set(COL_ID, &id.to_string())
    }

    pub fn address(self, address: &str) -> Self {
        self.set(COL_ADDRESS, address)
    }

    pub fn body(self, body: &str) -> Self {
        self.set(COL_BODY, body)
    }

    pub fn build(self) -> Row {
        self.cols
    }
}

pub fn outbound_row(date_ms: i64) -> Row {
    RowBuilder::outbound().date(date_ms).build()
}

pub fn inbound_row(date_ms: i64) -> Row {
    RowBuilder::inbound().date(date_ms).build()
}

// ---------------------------------------------------------------------------
// Backings
// ---------------------------------------------------------------------------

/// Cursor backing that accepts the first `ok_writes` writes and refuses the
/// rest. Reads always succeed.
#[derive(Debug)]
pub struct FailingBacking {
    inner: MemoryCursorBacking,
    ok_writes: usize,
    writes: AtomicUsize,
}

impl FailingBacking {
    pub fn always() -> Arc<Self> {
        Self::after(0)
    }

    pub fn after(ok_writes: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCursorBacking::new(),
            ok_writes,
            writes: AtomicUsize::new(0),
        })
    }

    pub fn peek(&self, key: &str) -> Option<i64> {
        self.inner.peek(key)
    }
}

impl CursorBacking for FailingBacking {
    fn get(&self, key: &str) -> Result<Option<i64>, CursorError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: i64) -> Result<(), CursorError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.ok_writes {
            return Err(CursorError::Backing("injected write failure".into()));
        }
        self.inner.set(key, value)
    }
}

/// File backing in a fresh temp dir. Keep the `TempDir` alive for as long as
/// the backing is used.
pub fn durable_backing() -> Result<(tempfile::TempDir, std::path::PathBuf)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("radar-cursor.json");
    Ok((dir, path))
}

pub fn open_file_backing(path: &std::path::Path) -> Result<Arc<dyn CursorBacking>> {
    Ok(Arc::new(FileCursorBacking::open(path)?))
}

// ---------------------------------------------------------------------------
// Pipeline harness
// ---------------------------------------------------------------------------

/// A started watcher over a [`MemoryStore`] with a manual clock.
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub backing: Arc<dyn CursorBacking>,
    pub clock: ManualTimeSource,
    pub subscriber: Arc<RecordingSubscriber>,
    pub config: RadarConfig,
    pub handle: WatcherHandle,
}

/// Default config, in-memory cursor, clock at `now_ms`.
pub fn pipeline(now_ms: i64) -> Result<Pipeline> {
    pipeline_with(
        Arc::new(MemoryCursorBacking::new()),
        now_ms,
        RadarConfig::default(),
    )
}

pub fn pipeline_with(
    backing: Arc<dyn CursorBacking>,
    now_ms: i64,
    config: RadarConfig,
) -> Result<Pipeline> {
    start_over(
        Arc::new(MemoryStore::new()),
        backing,
        ManualTimeSource::at(now_ms),
        config,
    )
}

fn start_over(
    store: Arc<MemoryStore>,
    backing: Arc<dyn CursorBacking>,
    clock: ManualTimeSource,
    config: RadarConfig,
) -> Result<Pipeline> {
    let subscriber = RecordingSubscriber::new();
    let handle = Radar::start(
        store.clone(),
        Arc::clone(&backing),
        Arc::new(clock.clone()),
        subscriber.clone(),
        &config,
    )?;
    Ok(Pipeline {
        store,
        backing,
        clock,
        subscriber,
        config,
        handle,
    })
}

impl Pipeline {
    pub fn insert_outbound(&self, date_ms: i64) -> Result<RecordId> {
        Ok(self
            .store
            .insert(Partition::Outbound, outbound_row(date_ms), Origin::External)?)
    }

    pub fn insert_inbound(&self, date_ms: i64) -> Result<RecordId> {
        Ok(self
            .store
            .insert(Partition::Inbound, inbound_row(date_ms), Origin::External)?)
    }

    /// Stop this watcher and start a new one over the same store, backing and
    /// clock, with a fresh subscriber.
    pub fn restart(self) -> Result<Pipeline> {
        self.handle.stop()?;
        let Pipeline {
            store,
            backing,
            clock,
            config,
            ..
        } = self;
        start_over(store, backing, clock, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_backing_counts_writes() {
        let b = FailingBacking::after(1);
        assert!(b.set("k", 1).is_ok());
        assert!(b.set("k", 2).is_err());
        assert_eq!(b.peek("k"), Some(1));
    }

    #[test]
    fn builders_match_store_markers() {
        let out = outbound_row(5);
        assert_eq!(out.get(COL_TYPE).map(String::as_str), Some("2"));
        assert!(!out.contains_key(COL_PROTOCOL));

        let inb = RowBuilder::inbound().id(7).without(COL_BODY).build();
        assert_eq!(inb.get(COL_ID).map(String::as_str), Some("7"));
        assert_eq!(inb.get(COL_PROTOCOL).map(String::as_str), Some("0"));
        assert!(!inb.contains_key(COL_BODY));
    }
}
