use chrono::{Days, NaiveDate};
use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_catalog::MedicineId;
use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;
use pharma_purchasing::PurchaseInvoiceEvent;
use pharma_sales::SaleEvent;

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

/// One expirable batch received on a purchase invoice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockBatch {
    pub expiry_date: NaiveDate,
    pub quantity: i64,
}

/// Read model: on-hand stock per medicine, in packages.
///
/// Derived data: received quantity (+ bonus packages) from saved purchase
/// invoices minus sold quantity, floored at zero. Expirable receipts are also
/// tracked as dated batches, depleted earliest-expiry-first on sale.
#[derive(Debug, Clone, PartialEq)]
pub struct StockReadModel {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub on_hand: i64,
    pub batches: Vec<StockBatch>,
}

#[derive(Debug, Error)]
pub enum StockProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: stock levels per pharmacy, fed by both the purchasing and the
/// sales streams.
#[derive(Debug)]
pub struct StockProjection<S>
where
    S: PharmacyStore<MedicineId, StockReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> StockProjection<S>
where
    S: PharmacyStore<MedicineId, StockReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(&self, pharmacy_id: PharmacyId, medicine_id: &MedicineId) -> Option<StockReadModel> {
        self.store.get(pharmacy_id, medicine_id)
    }

    pub fn list(&self, pharmacy_id: PharmacyId) -> Vec<StockReadModel> {
        let mut rows = self.store.list(pharmacy_id);
        rows.sort_by(|a, b| a.medicine_name.cmp(&b.medicine_name));
        rows
    }

    /// Total packages on hand across the whole pharmacy.
    pub fn total_stock(&self, pharmacy_id: PharmacyId) -> i64 {
        self.store.list(pharmacy_id).iter().map(|rm| rm.on_hand).sum()
    }

    /// Medicines at or below the reorder threshold.
    pub fn low_stock(&self, pharmacy_id: PharmacyId, threshold: i64) -> Vec<StockReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(pharmacy_id)
            .into_iter()
            .filter(|rm| rm.on_hand <= threshold)
            .collect();
        rows.sort_by(|a, b| a.on_hand.cmp(&b.on_hand));
        rows
    }

    /// Medicines with a batch expiring within `days` of `today`.
    pub fn expiring_within(
        &self,
        pharmacy_id: PharmacyId,
        today: NaiveDate,
        days: u64,
    ) -> Vec<StockReadModel> {
        let horizon = today.checked_add_days(Days::new(days)).unwrap_or(today);
        self.store
            .list(pharmacy_id)
            .into_iter()
            .filter(|rm| {
                rm.batches
                    .iter()
                    .any(|b| b.quantity > 0 && b.expiry_date <= horizon)
            })
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        match envelope.aggregate_type() {
            "purchasing.invoice" => self.apply_purchase(envelope),
            "sales.sale" => self.apply_sale(envelope),
            _ => Ok(()),
        }
    }

    fn guard(&self, envelope: &EventEnvelope<JsonValue>) -> Result<bool, StockProjectionError> {
        let seq = envelope.sequence_number();
        match self
            .cursors
            .check(envelope.pharmacy_id(), envelope.aggregate_id(), seq)
        {
            CursorCheck::Apply => Ok(true),
            CursorCheck::Duplicate => Ok(false),
            CursorCheck::NonMonotonic { last } => {
                Err(StockProjectionError::NonMonotonicSequence { last, found: seq })
            }
        }
    }

    fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        self.cursors.advance(
            envelope.pharmacy_id(),
            envelope.aggregate_id(),
            envelope.sequence_number(),
        );
    }

    fn apply_purchase(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), StockProjectionError> {
        if !self.guard(envelope)? {
            return Ok(());
        }

        let ev: PurchaseInvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        // Only a saved invoice moves stock; draft edits are invisible here.
        if let PurchaseInvoiceEvent::InvoiceSaved(e) = ev {
            if e.pharmacy_id != envelope.pharmacy_id() {
                return Err(StockProjectionError::PharmacyIsolation(
                    "event pharmacy_id does not match envelope pharmacy_id".to_string(),
                ));
            }

            let pharmacy_id = envelope.pharmacy_id();
            for item in &e.items {
                let mut rm = self
                    .store
                    .get(pharmacy_id, &item.medicine_id)
                    .unwrap_or_else(|| StockReadModel {
                        medicine_id: item.medicine_id,
                        medicine_name: item.medicine_name.clone(),
                        on_hand: 0,
                        batches: Vec::new(),
                    });

                let received = i64::from(item.quantity) + i64::from(item.bonus);
                rm.on_hand += received;
                rm.medicine_name = item.medicine_name.clone();

                if item.expirable {
                    if let Some(expiry_date) = item.expiry_date {
                        match rm.batches.iter_mut().find(|b| b.expiry_date == expiry_date) {
                            Some(batch) => batch.quantity += received,
                            None => rm.batches.push(StockBatch {
                                expiry_date,
                                quantity: received,
                            }),
                        }
                        rm.batches.sort_by_key(|b| b.expiry_date);
                    }
                }

                self.store.upsert(pharmacy_id, item.medicine_id, rm);
            }
        }

        self.advance(envelope);
        Ok(())
    }

    fn apply_sale(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), StockProjectionError> {
        if !self.guard(envelope)? {
            return Ok(());
        }

        let ev: SaleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| StockProjectionError::Deserialize(e.to_string()))?;

        let pharmacy_id = envelope.pharmacy_id();
        match ev {
            SaleEvent::SaleRecorded(e) => {
                if e.pharmacy_id != pharmacy_id {
                    return Err(StockProjectionError::PharmacyIsolation(
                        "event pharmacy_id does not match envelope pharmacy_id".to_string(),
                    ));
                }
                for line in &e.lines {
                    let mut rm = self
                        .store
                        .get(pharmacy_id, &line.medicine_id)
                        .unwrap_or_else(|| StockReadModel {
                            medicine_id: line.medicine_id,
                            medicine_name: line.medicine_name.clone(),
                            on_hand: 0,
                            batches: Vec::new(),
                        });

                    let sold = i64::from(line.quantity);
                    rm.on_hand = (rm.on_hand - sold).max(0);
                    deplete_batches(&mut rm.batches, sold);
                    self.store.upsert(pharmacy_id, line.medicine_id, rm);
                }
            }
            SaleEvent::SaleVoided(e) => {
                for line in &e.lines {
                    if let Some(mut rm) = self.store.get(pharmacy_id, &line.medicine_id) {
                        rm.on_hand += i64::from(line.quantity);
                        self.store.upsert(pharmacy_id, line.medicine_id, rm);
                    }
                }
            }
        }

        self.advance(envelope);
        Ok(())
    }
}

/// Deplete batches earliest expiry first (FEFO), dropping emptied batches.
fn deplete_batches(batches: &mut Vec<StockBatch>, mut sold: i64) {
    for batch in batches.iter_mut() {
        if sold == 0 {
            break;
        }
        let take = batch.quantity.min(sold);
        batch.quantity -= take;
        sold -= take;
    }
    batches.retain(|b| b.quantity > 0);
}
