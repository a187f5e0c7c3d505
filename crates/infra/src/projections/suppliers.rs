use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;
use pharma_parties::{DebitStatus, SupplierContact, SupplierEvent, SupplierId, SupplierKind};

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

pub const AGGREGATE_TYPE: &str = "parties.supplier";

/// Read model: one supplier row.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplierReadModel {
    pub supplier_id: SupplierId,
    pub short: String,
    pub name: String,
    pub kind: SupplierKind,
    pub contact: SupplierContact,
    pub debit: f64,
    pub payment_period_months: u32,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupplierReadModel {
    /// Same derivation the aggregate uses; duplicated on the read side so
    /// queries never rehydrate the aggregate.
    pub fn debit_status(&self, today: NaiveDate) -> DebitStatus {
        if self.debit == 0.0 {
            DebitStatus::Paid
        } else if self.settlement_date.is_some_and(|d| d < today) {
            DebitStatus::Overdue
        } else {
            DebitStatus::Due
        }
    }
}

#[derive(Debug, Error)]
pub enum SuppliersProjectionError {
    #[error("failed to deserialize supplier event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: the supplier directory per pharmacy.
#[derive(Debug)]
pub struct SuppliersProjection<S>
where
    S: PharmacyStore<SupplierId, SupplierReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> SuppliersProjection<S>
where
    S: PharmacyStore<SupplierId, SupplierReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, pharmacy_id: PharmacyId, supplier_id: &SupplierId) -> Option<SupplierReadModel> {
        self.store.get(pharmacy_id, supplier_id)
    }

    pub fn list(&self, pharmacy_id: PharmacyId) -> Vec<SupplierReadModel> {
        let mut rows = self.store.list(pharmacy_id);
        rows.sort_by(|a, b| a.short.cmp(&b.short));
        rows
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SuppliersProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let pharmacy_id = envelope.pharmacy_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        match self.cursors.check(pharmacy_id, aggregate_id, seq) {
            CursorCheck::Apply => {}
            CursorCheck::Duplicate => return Ok(()),
            CursorCheck::NonMonotonic { last } => {
                return Err(SuppliersProjectionError::NonMonotonicSequence { last, found: seq });
            }
        }

        let ev: SupplierEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SuppliersProjectionError::Deserialize(e.to_string()))?;

        let (event_pharmacy, supplier_id) = match &ev {
            SupplierEvent::SupplierRegistered(e) => (e.pharmacy_id, e.supplier_id),
            SupplierEvent::SupplierUpdated(e) => (e.pharmacy_id, e.supplier_id),
            SupplierEvent::SupplierDebitAdjusted(e) => (e.pharmacy_id, e.supplier_id),
        };

        if event_pharmacy != pharmacy_id {
            return Err(SuppliersProjectionError::PharmacyIsolation(
                "event pharmacy_id does not match envelope pharmacy_id".to_string(),
            ));
        }
        if supplier_id.0 != aggregate_id {
            return Err(SuppliersProjectionError::PharmacyIsolation(
                "event supplier_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            SupplierEvent::SupplierRegistered(e) => {
                self.store.upsert(
                    pharmacy_id,
                    e.supplier_id,
                    SupplierReadModel {
                        supplier_id: e.supplier_id,
                        short: e.short,
                        name: e.name,
                        kind: e.kind,
                        contact: e.contact,
                        debit: 0.0,
                        payment_period_months: e.payment_period_months,
                        settlement_date: e.settlement_date,
                        checks_due_date: e.checks_due_date,
                        created_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            SupplierEvent::SupplierUpdated(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.supplier_id) {
                    rm.name = e.name;
                    rm.contact = e.contact;
                    rm.payment_period_months = e.payment_period_months;
                    rm.settlement_date = e.settlement_date;
                    rm.checks_due_date = e.checks_due_date;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(pharmacy_id, e.supplier_id, rm);
                }
            }
            SupplierEvent::SupplierDebitAdjusted(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.supplier_id) {
                    rm.debit = e.new_debit;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(pharmacy_id, e.supplier_id, rm);
                }
            }
        }

        self.cursors.advance(pharmacy_id, aggregate_id, seq);
        Ok(())
    }
}
