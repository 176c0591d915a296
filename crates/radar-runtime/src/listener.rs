use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use radar_cursor::{Cursor, CursorError};
use radar_dedup::{Admission, DedupFilter, RejectReason};
use radar_ingest::{ChangeObserver, RecordParser, Rejected, SnapshotResolver};
use radar_schemas::{ChangeSignal, Direction, RecordId};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::subscriber::{deliver, RecordSubscriber};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Resolver or parser found nothing to report.
    NoData,
    /// Newest row could not be parsed. Dropped.
    Malformed(Rejected),
    /// Parsed fine but not new.
    Rejected(RejectReason),
    Dispatched { direction: Direction, id: RecordId },
    /// Cursor commit failed. Nothing dispatched; the listener is now halted.
    PersistFailed(CursorError),
    /// A previous pass failed to persist; signals are ignored.
    Halted,
}

/// Point-in-time counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStats {
    pub signals: u64,
    pub no_data: u64,
    pub malformed: u64,
    pub stale: u64,
    pub already_seen: u64,
    pub dispatched_sent: u64,
    pub dispatched_received: u64,
    pub persist_failures: u64,
    pub ignored_while_halted: u64,
}

impl ListenerStats {
    pub fn dispatched(&self) -> u64 {
        self.dispatched_sent + self.dispatched_received
    }
}

#[derive(Default)]
struct Counters {
    signals: AtomicU64,
    no_data: AtomicU64,
    malformed: AtomicU64,
    stale: AtomicU64,
    already_seen: AtomicU64,
    dispatched_sent: AtomicU64,
    dispatched_received: AtomicU64,
    persist_failures: AtomicU64,
    ignored_while_halted: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// resolve -> parse -> admit -> dispatch, once per change signal.
///
/// Safe to call concurrently: the dedup filter serialises cursor access, and
/// subscribers are invoked after the cursor lock is released.
///
/// A cursor persistence failure halts the listener. Halt is sticky for the
/// life of this instance; the host recovers by restarting the watcher.
pub struct ChangeListener {
    resolver: SnapshotResolver,
    parser: RecordParser,
    dedup: DedupFilter,
    subscriber: RwLock<Arc<dyn RecordSubscriber>>,
    halted: AtomicBool,
    counters: Counters,
}

impl ChangeListener {
    pub fn new(
        resolver: SnapshotResolver,
        dedup: DedupFilter,
        subscriber: Arc<dyn RecordSubscriber>,
    ) -> Self {
        Self {
            resolver,
            parser: RecordParser::new(),
            dedup,
            subscriber: RwLock::new(subscriber),
            halted: AtomicBool::new(false),
            counters: Counters::default(),
        }
    }

    /// Run one reconciliation pass for `signal`.
    pub fn process(&self, signal: ChangeSignal) -> PassOutcome {
        bump(&self.counters.signals);

        if self.is_halted() {
            bump(&self.counters.ignored_while_halted);
            debug!(self_change = signal.self_change, "listener/ignored_halted");
            return PassOutcome::Halted;
        }

        let record = {
            let Some(mut snapshot) = self.resolver.resolve(&signal) else {
                bump(&self.counters.no_data);
                return PassOutcome::NoData;
            };

            match self.parser.parse(Some(&mut snapshot.rows), snapshot.direction) {
                Ok(record) => record,
                Err(Rejected::NoData) => {
                    bump(&self.counters.no_data);
                    return PassOutcome::NoData;
                }
                Err(rejected) => {
                    bump(&self.counters.malformed);
                    warn!(
                        partition_direction = snapshot.direction.as_str(),
                        reason = rejected.as_str(),
                        detail = %rejected,
                        "listener/malformed_row"
                    );
                    return PassOutcome::Malformed(rejected);
                }
            }
            // row set released here, before the cursor lock is taken
        };

        match self.dedup.admit(&record) {
            Ok(Admission::Admit) => {}
            Ok(Admission::Reject(reason)) => {
                match reason {
                    RejectReason::Stale => bump(&self.counters.stale),
                    RejectReason::AlreadySeen => bump(&self.counters.already_seen),
                }
                return PassOutcome::Rejected(reason);
            }
            Err(err) => {
                bump(&self.counters.persist_failures);
                self.halted.store(true, Ordering::SeqCst);
                error!(id = %record.id, error = %err, "listener/persist_failed_halting");
                return PassOutcome::PersistFailed(err);
            }
        }

        let subscriber = match self.subscriber.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        info!(
            id = %record.id,
            direction = record.direction.as_str(),
            ts = record.timestamp.epoch_ms(),
            "record/admitted"
        );
        deliver(subscriber.as_ref(), &record);

        match record.direction {
            Direction::Outbound => bump(&self.counters.dispatched_sent),
            Direction::Inbound => bump(&self.counters.dispatched_received),
        }

        PassOutcome::Dispatched {
            direction: record.direction,
            id: record.id,
        }
    }

    /// Swap the subscriber. Passes already past admit finish with the old one.
    pub fn replace_subscriber(&self, subscriber: Arc<dyn RecordSubscriber>) {
        match self.subscriber.write() {
            Ok(mut slot) => *slot = subscriber,
            Err(poisoned) => *poisoned.into_inner() = subscriber,
        }
        info!("listener/subscriber_replaced");
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn cursor(&self) -> Result<Cursor, CursorError> {
        self.dedup.cursor()
    }

    pub fn stats(&self) -> ListenerStats {
        let c = &self.counters;
        let get = |a: &AtomicU64| a.load(Ordering::Relaxed);
        ListenerStats {
            signals: get(&c.signals),
            no_data: get(&c.no_data),
            malformed: get(&c.malformed),
            stale: get(&c.stale),
            already_seen: get(&c.already_seen),
            dispatched_sent: get(&c.dispatched_sent),
            dispatched_received: get(&c.dispatched_received),
            persist_failures: get(&c.persist_failures),
            ignored_while_halted: get(&c.ignored_while_halted),
        }
    }
}

impl ChangeObserver for ChangeListener {
    fn on_change(&self, signal: ChangeSignal) {
        let _ = self.process(signal);
    }
}
