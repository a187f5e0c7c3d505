use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_catalog::{MedicineEvent, MedicineId, MedicinePricing, MedicineStatus};
use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

pub const AGGREGATE_TYPE: &str = "catalog.medicine";

/// Read model: one catalog entry, as shown in the medicine selector.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicineReadModel {
    pub medicine_id: MedicineId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub units_per_package: u32,
    pub expirable: bool,
    pub pricing: MedicinePricing,
    pub status: MedicineStatus,
}

#[derive(Debug, Error)]
pub enum CatalogProjectionError {
    #[error("failed to deserialize medicine event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: the medicine directory per pharmacy.
#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: PharmacyStore<MedicineId, MedicineReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> CatalogProjection<S>
where
    S: PharmacyStore<MedicineId, MedicineReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, pharmacy_id: PharmacyId, medicine_id: &MedicineId) -> Option<MedicineReadModel> {
        self.store.get(pharmacy_id, medicine_id)
    }

    pub fn list(&self, pharmacy_id: PharmacyId) -> Vec<MedicineReadModel> {
        let mut rows = self.store.list(pharmacy_id);
        rows.sort_by(|a, b| a.code.cmp(&b.code));
        rows
    }

    /// Code lookup used to enforce per-pharmacy code uniqueness before dispatch.
    pub fn find_by_code(&self, pharmacy_id: PharmacyId, code: &str) -> Option<MedicineReadModel> {
        self.store
            .list(pharmacy_id)
            .into_iter()
            .find(|rm| rm.code == code)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), CatalogProjectionError> {
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
                return Err(CatalogProjectionError::NonMonotonicSequence { last, found: seq });
            }
        }

        let ev: MedicineEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| CatalogProjectionError::Deserialize(e.to_string()))?;

        let (event_pharmacy, medicine_id) = match &ev {
            MedicineEvent::MedicineRegistered(e) => (e.pharmacy_id, e.medicine_id),
            MedicineEvent::MedicineUpdated(e) => (e.pharmacy_id, e.medicine_id),
            MedicineEvent::MedicineDiscontinued(e) => (e.pharmacy_id, e.medicine_id),
        };

        if event_pharmacy != pharmacy_id {
            return Err(CatalogProjectionError::PharmacyIsolation(
                "event pharmacy_id does not match envelope pharmacy_id".to_string(),
            ));
        }
        if medicine_id.0 != aggregate_id {
            return Err(CatalogProjectionError::PharmacyIsolation(
                "event medicine_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            MedicineEvent::MedicineRegistered(e) => {
                self.store.upsert(
                    pharmacy_id,
                    e.medicine_id,
                    MedicineReadModel {
                        medicine_id: e.medicine_id,
                        code: e.code,
                        name: e.name,
                        unit: e.unit,
                        units_per_package: e.units_per_package,
                        expirable: e.expirable,
                        pricing: e.pricing,
                        status: MedicineStatus::Active,
                    },
                );
            }
            MedicineEvent::MedicineUpdated(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.medicine_id) {
                    rm.name = e.name;
                    rm.pricing = e.pricing;
                    self.store.upsert(pharmacy_id, e.medicine_id, rm);
                }
            }
            MedicineEvent::MedicineDiscontinued(e) => {
                if let Some(mut rm) = self.store.get(pharmacy_id, &e.medicine_id) {
                    rm.status = MedicineStatus::Discontinued;
                    self.store.upsert(pharmacy_id, e.medicine_id, rm);
                }
            }
        }

        self.cursors.advance(pharmacy_id, aggregate_id, seq);
        Ok(())
    }
}
