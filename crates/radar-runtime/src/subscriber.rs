use radar_schemas::{Direction, Record};

/// Receives admitted records. Each callback runs on the thread that
/// processed the change signal, at most once per record id.
pub trait RecordSubscriber: Send + Sync {
    fn on_record_sent(&self, record: &Record);

    fn on_record_received(&self, record: &Record);
}

/// Route `record` to the callback matching its direction.
pub(crate) fn deliver(subscriber: &dyn RecordSubscriber, record: &Record) {
    match record.direction {
        Direction::Outbound => subscriber.on_record_sent(record),
        Direction::Inbound => subscriber.on_record_received(record),
    }
}

/// Drops everything. Useful as a placeholder before the real subscriber is
/// attached.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSubscriber;

impl RecordSubscriber for NullSubscriber {
    fn on_record_sent(&self, _record: &Record) {}

    fn on_record_received(&self, _record: &Record) {}
}
