use std::sync::Arc;

use radar_schemas::{ChangeSignal, Direction, Partition};
use tracing::{debug, trace};

use crate::store::{MessageStore, Query, RowSetGuard, COL_PROTOCOL};

/// The newest-first row set of one leaf partition, tagged with the direction
/// that partition implies.
#[derive(Debug)]
pub struct Snapshot {
    pub direction: Direction,
    pub rows: RowSetGuard,
}

/// Picks which partition a change signal refers to and re-reads it.
///
/// Read-only. Every row set it opens is either handed out inside the
/// returned [`Snapshot`] or dropped (and therefore closed) before `resolve`
/// returns.
pub struct SnapshotResolver {
    store: Arc<dyn MessageStore>,
}

impl SnapshotResolver {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// `None` means the signal carries nothing to report: the store was
    /// unreadable, empty, or the partition query produced no handle.
    pub fn resolve(&self, signal: &ChangeSignal) -> Option<Snapshot> {
        trace!(self_change = signal.self_change, "resolve/start");

        let direction = self.control_direction()?;
        let partition = Partition::for_direction(direction);

        match self.store.query(&Query::newest_first(partition)) {
            Ok(Some(rows)) => Some(Snapshot { direction, rows }),
            Ok(None) => {
                debug!(partition = partition.as_str(), "resolve/no_handle");
                None
            }
            Err(err) => {
                debug!(partition = partition.as_str(), error = %err, "resolve/query_failed");
                None
            }
        }
    }

    /// Read the most recently mutated row of the aggregate view and map its
    /// relay protocol to a direction: NULL means the device originated it.
    fn control_direction(&self) -> Option<Direction> {
        let mut control = match self.store.query(&Query::root()) {
            Ok(Some(rows)) => rows,
            Ok(None) => {
                debug!("resolve/no_control_handle");
                return None;
            }
            Err(err) => {
                debug!(error = %err, "resolve/control_query_failed");
                return None;
            }
        };

        if !control.move_to_next() {
            debug!("resolve/no_control_row");
            return None;
        }

        let direction = match control.column(COL_PROTOCOL) {
            None => Direction::Outbound,
            Some(_) => Direction::Inbound,
        };
        trace!(direction = direction.as_str(), "resolve/control");
        Some(direction)
    }
}
