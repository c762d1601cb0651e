use chrono::{DateTime, Utc};

/// A domain event emitted by an aggregate.
///
/// Events are facts: the dispatcher logs them and derives side effects
/// (stock adjustments) from them, but they are not stored as a stream.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "inventory.movimiento.anulado").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
