use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Projections transform events (write model) into queryable state (read
/// model). Read models are **disposable**: they can be deleted and rebuilt
/// from events at any time, which is how schema changes and projection bug
/// fixes are rolled out.
///
/// Projections must be **idempotent**: applying the same event twice must
/// produce the same result. Events can be delivered more than once
/// (at-least-once bus), and rebuilds replay the full history. Sequence-number
/// cursors are the usual guard.
///
/// The envelope carries `pharmacy_id`, which scopes every read-model update;
/// a projection must never mix state across pharmacies.
///
/// Storage is not defined here — in-memory maps for tests, SQL tables in a
/// future persistent deployment.
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
