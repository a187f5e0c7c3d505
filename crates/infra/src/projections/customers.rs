use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;
use pharma_parties::{CustomerEvent, CustomerId, CustomerKind, CustomerTerms, Loyalty};

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

pub const AGGREGATE_TYPE: &str = "parties.customer";

/// Read model: one customer row.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerReadModel {
    pub customer_id: CustomerId,
    pub name: String,
    pub kind: CustomerKind,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: CustomerTerms,
    pub balance: f64,
    pub loyalty: Option<Loyalty>,
    pub last_transaction_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum CustomersProjectionError {
    #[error("failed to deserialize customer event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: the customer directory per pharmacy.
#[derive(Debug)]
pub struct CustomersProjection<S>
where
    S: PharmacyStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> CustomersProjection<S>
where
    S: PharmacyStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, pharmacy_id: PharmacyId, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(pharmacy_id, customer_id)
    }

    pub fn list(&self, pharmacy_id: PharmacyId) -> Vec<CustomerReadModel> {
        let mut rows = self.store.list(pharmacy_id);
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CustomersProjectionError> {
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
                return Err(CustomersProjectionError::NonMonotonicSequence { last, found: seq });
            }
        }

        let ev: CustomerEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CustomersProjectionError::Deserialize(e.to_string()))?;

        let (event_pharmacy, customer_id) = match &ev {
            CustomerEvent::CustomerRegistered(e) => (e.pharmacy_id, e.customer_id),
            CustomerEvent::CustomerUpdated(e) => (e.pharmacy_id, e.customer_id),
            CustomerEvent::CustomerBalanceAdjusted(e) => (e.pharmacy_id, e.customer_id),
        };

        if event_pharmacy != pharmacy_id {
            return Err(CustomersProjectionError::PharmacyIsolation(
                "event pharmacy_id does not match envelope pharmacy_id".to_string(),
            ));
        }
        if customer_id.0 != aggregate_id {
            return Err(CustomersProjectionError::PharmacyIsolation(
                "event customer_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            CustomerEvent::CustomerRegistered(e) => {
                self.store.upsert(
                    pharmacy_id,
                    e.customer_id,
                    CustomerReadModel {
                        customer_id: e.customer_id,
                        name: e.name,
                        kind: e.kind,
                        phone: e.phone,
                        address: e.address,
                        terms: e.terms,
                        balance: 0.0,
                        loyalty: e.loyalty,
                        last_transaction_at: None,
                    },
                );
            }
            CustomerEvent::CustomerUpdated(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.customer_id) {
                    rm.name = e.name;
                    rm.phone = e.phone;
                    rm.address = e.address;
                    rm.terms = e.terms;
                    self.store.upsert(pharmacy_id, e.customer_id, rm);
                }
            }
            CustomerEvent::CustomerBalanceAdjusted(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.customer_id) {
                    rm.balance = e.new_balance;
                    rm.last_transaction_at = Some(e.occurred_at);
                    self.store.upsert(pharmacy_id, e.customer_id, rm);
                }
            }
        }

        self.cursors.advance(pharmacy_id, aggregate_id, seq);
        Ok(())
    }
}
