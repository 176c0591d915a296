//! radar-ingest
//!
//! Read side of the pipeline: the contract the external message store must
//! satisfy, the resolver that picks which partition to re-read on a change
//! signal, and the parser that turns the newest row into a typed [`Record`].
//!
//! Nothing here writes to the store and nothing here touches the cursor.
//!
//! [`Record`]: radar_schemas::Record

mod parser;
mod resolver;
mod store;

pub use parser::{RecordParser, Rejected};
pub use resolver::{Snapshot, SnapshotResolver};
pub use store::{
    BufferedRows, ChangeObserver, MessageStore, ObserverId, ObserverOptions, Query, Row, RowSet,
    RowSetGuard, SortOrder, StoreError, COL_ADDRESS, COL_BODY, COL_DATE, COL_ID, COL_PROTOCOL,
    COL_TYPE, ROW_COLUMNS,
};
