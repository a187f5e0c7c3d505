use std::collections::HashMap;
use std::sync::RwLock;

use pharma_core::{AggregateId, PharmacyId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    pharmacy_id: PharmacyId,
    aggregate_id: AggregateId,
}

/// Outcome of a cursor check for an incoming sequence number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum CursorCheck {
    /// Next expected event; apply it.
    Apply,
    /// Already processed; skip silently (at-least-once delivery).
    Duplicate,
    /// Gap or zero sequence number; the stream is corrupt or out of order.
    NonMonotonic { last: u64 },
}

/// Per-stream sequence cursors: the idempotency guard shared by all
/// projections.
#[derive(Debug, Default)]
pub(crate) struct SequenceCursors {
    inner: RwLock<HashMap<CursorKey, u64>>,
}

impl SequenceCursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn check(
        &self,
        pharmacy_id: PharmacyId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) -> CursorCheck {
        let last = match self.inner.read() {
            Ok(map) => *map
                .get(&CursorKey {
                    pharmacy_id,
                    aggregate_id,
                })
                .unwrap_or(&0),
            Err(_) => 0,
        };

        if sequence_number == 0 {
            return CursorCheck::NonMonotonic { last };
        }
        if sequence_number <= last {
            return CursorCheck::Duplicate;
        }
        // First observed event may land mid-stream (fresh projection attached
        // to an old stream); otherwise require the exact successor.
        if last != 0 && sequence_number != last + 1 {
            return CursorCheck::NonMonotonic { last };
        }
        CursorCheck::Apply
    }

    pub(crate) fn advance(
        &self,
        pharmacy_id: PharmacyId,
        aggregate_id: AggregateId,
        sequence_number: u64,
    ) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(
                CursorKey {
                    pharmacy_id,
                    aggregate_id,
                },
                sequence_number,
            );
        }
    }

    pub(crate) fn clear_pharmacy(&self, pharmacy_id: PharmacyId) {
        if let Ok(mut map) = self.inner.write() {
            map.retain(|k, _| k.pharmacy_id != pharmacy_id);
        }
    }
}
