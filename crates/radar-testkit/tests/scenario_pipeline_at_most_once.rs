//! Scenario: change signals through the full pipeline.
//!
//! # Invariants under test
//!
//! 1. A new row is dispatched once, tagged by direction (outbound -> sent
//!    callback, inbound -> received callback).
//! 2. Repeated signals for the same row (re-notify, status transition,
//!    self echo) never dispatch it again.
//! 3. Self-change echoes still trigger a pass.
//! 4. A signal against an empty or unreachable store dispatches nothing and
//!    leaves the cursor alone.
//! 5. After every pass the store reports zero open row sets.
//! 6. Concurrent mutations never dispatch an id twice.

use std::sync::Arc;
use std::thread;

use radar_cursor::Cursor;
use radar_ingest::Row;
use radar_runtime::{InjectedFailure, Origin};
use radar_schemas::{ChangeSignal, Direction, Partition, RecordId};
use radar_testkit::{outbound_row, pipeline, Callback, RowBuilder};

const NOW: i64 = 1_700_000_000_000;

// ---------------------------------------------------------------------------
// 1: direction tagging
// ---------------------------------------------------------------------------

#[test]
fn new_rows_dispatch_to_matching_callback() {
    let p = pipeline(NOW).unwrap();

    let sent = p.insert_outbound(NOW - 100).unwrap();
    let received = p.insert_inbound(NOW - 50).unwrap();

    let d = p.subscriber.deliveries();
    assert_eq!(d.len(), 2);
    assert_eq!(d[0].callback, Callback::Sent);
    assert_eq!(d[0].record.id, sent);
    assert_eq!(d[0].record.direction, Direction::Outbound);
    assert_eq!(d[1].callback, Callback::Received);
    assert_eq!(d[1].record.id, received);
    assert_eq!(d[1].record.direction, Direction::Inbound);
    assert_eq!(d[1].record.origin_address, "+15550199");

    let stats = p.handle.stats();
    assert_eq!(stats.dispatched_sent, 1);
    assert_eq!(stats.dispatched_received, 1);
    assert_eq!(p.store.open_handles(), 0);
}

// ---------------------------------------------------------------------------
// 2 + 3: repeated signals
// ---------------------------------------------------------------------------

#[test]
fn repeated_signals_do_not_redeliver() {
    let p = pipeline(NOW).unwrap();
    let id = p.insert_outbound(NOW).unwrap();

    // pending -> sent transition on the same row
    let mut changes = Row::new();
    changes.insert("status".into(), "sent".into());
    p.store.update(id, changes, Origin::External).unwrap();
    p.store.touch(id, Origin::Local).unwrap();
    p.store.notify(ChangeSignal::external());
    p.store.notify(ChangeSignal::self_echo());

    assert_eq!(p.subscriber.ids(), vec![id]);
    let stats = p.handle.stats();
    assert_eq!(stats.signals, 5);
    assert_eq!(stats.already_seen, 4);
    assert_eq!(p.store.open_handles(), 0);
}

#[test]
fn self_echo_alone_drives_a_pass() {
    let p = pipeline(NOW).unwrap();
    let id = p
        .store
        .insert(Partition::Outbound, outbound_row(NOW), Origin::Local)
        .unwrap();
    assert_eq!(p.subscriber.ids(), vec![id]);
}

// ---------------------------------------------------------------------------
// 4 + 5: nothing to report
// ---------------------------------------------------------------------------

#[test]
fn empty_store_is_a_noop() {
    let p = pipeline(NOW).unwrap();
    p.store.notify(ChangeSignal::external());

    assert!(p.subscriber.is_empty());
    assert_eq!(p.handle.cursor().unwrap(), Cursor::Unset);
    assert_eq!(p.handle.stats().no_data, 1);
    assert_eq!(p.store.open_handles(), 0);
}

#[test]
fn failed_queries_are_silent_and_release_handles() {
    let p = pipeline(NOW).unwrap();

    p.store.inject_failure(Some(InjectedFailure::Unavailable));
    p.insert_outbound(NOW).unwrap();

    p.store
        .inject_failure(Some(InjectedFailure::Partition(Partition::Inbound)));
    p.insert_inbound(NOW).unwrap();

    p.store
        .inject_failure(Some(InjectedFailure::NoHandle(Partition::Inbound)));
    p.insert_inbound(NOW).unwrap();

    assert!(p.subscriber.is_empty());
    assert_eq!(p.handle.stats().no_data, 3);
    assert_eq!(p.handle.cursor().unwrap(), Cursor::Unset);
    assert_eq!(p.store.open_handles(), 0);

    // Recovery: the next signal sees the newest row.
    p.store.inject_failure(None);
    p.store.notify(ChangeSignal::external());
    assert_eq!(p.subscriber.ids(), vec![RecordId(3)]);
}

#[test]
fn malformed_rows_are_dropped_without_cursor_change() {
    let p = pipeline(NOW).unwrap();
    let row = RowBuilder::inbound().set("date", "abc").build();
    p.store
        .insert(Partition::Inbound, row, Origin::External)
        .unwrap();

    let bad_type = RowBuilder::outbound().date(NOW).set("type", "9").build();
    p.store
        .insert(Partition::Outbound, bad_type, Origin::External)
        .unwrap();

    assert!(p.subscriber.is_empty());
    assert_eq!(p.handle.cursor().unwrap(), Cursor::Unset);
    assert_eq!(p.handle.stats().malformed, 2);
    assert!(!p.handle.is_halted(), "malformed rows must not halt");
    assert_eq!(p.store.open_handles(), 0);
}

// ---------------------------------------------------------------------------
// 6: concurrency
// ---------------------------------------------------------------------------

#[test]
fn concurrent_mutations_never_double_dispatch() {
    let p = pipeline(NOW).unwrap();
    let store = Arc::clone(&p.store);

    let workers: Vec<_> = (0..6)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..25 {
                    let (partition, row) = if (t + i) % 2 == 0 {
                        (Partition::Outbound, outbound_row(NOW))
                    } else {
                        (Partition::Inbound, RowBuilder::inbound().date(NOW).build())
                    };
                    store.insert(partition, row, Origin::External).unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    let mut ids = p.subscriber.ids();
    let dispatched = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), dispatched, "an id was dispatched twice");
    assert!(dispatched >= 1);

    let max = ids.last().copied().unwrap();
    assert_eq!(p.handle.cursor().unwrap(), Cursor::At(max));
    assert_eq!(p.store.open_handles(), 0);
}

// ---------------------------------------------------------------------------
// stop
// ---------------------------------------------------------------------------

#[test]
fn stopped_watcher_dispatches_nothing() {
    let p = pipeline(NOW).unwrap();
    p.insert_outbound(NOW).unwrap();
    p.handle.stop().unwrap();

    p.insert_outbound(NOW).unwrap();
    p.insert_inbound(NOW).unwrap();

    assert_eq!(p.subscriber.ids(), vec![RecordId(1)]);
    assert_eq!(p.store.observer_count(), 0);
}
