//! radar-runtime
//!
//! The change listener and its lifecycle: start/stop, subscriber
//! re-registration, restart planning, and an in-process store.
//!
//! Per-signal pipeline:
//!
//! ```text
//! ChangeSignal -> SnapshotResolver -> RecordParser -> DedupFilter -> RecordSubscriber
//! ```

mod listener;
mod memory;
mod radar;
mod restart;
mod subscriber;

pub use listener::{ChangeListener, ListenerStats, PassOutcome};
pub use memory::{InjectedFailure, MemoryStore, Origin};
pub use radar::{Radar, RuntimeError, WatcherHandle};
pub use restart::RestartPlan;
pub use subscriber::{NullSubscriber, RecordSubscriber};
