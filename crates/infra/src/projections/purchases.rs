use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;
use pharma_parties::SupplierId;
use pharma_purchasing::{
    Adjustments, InvoiceStatus, InvoiceTotals, LineItem, PurchaseInvoiceEvent, PurchaseInvoiceId,
    Settlement, compute_totals,
};

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

pub const AGGREGATE_TYPE: &str = "purchasing.invoice";

/// Settlement classification shown in the purchases table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SettlementDisplay {
    Paid,
    Pending,
    Overdue,
}

/// Read model: one purchase invoice, covering both the table row and the
/// detail view (items + totals).
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseInvoiceReadModel {
    pub invoice_id: PurchaseInvoiceId,
    pub invoice_number: String,
    pub invoice_date: Option<NaiveDate>,
    pub supplier_id: Option<SupplierId>,
    pub supplier_name: String,
    pub notes: Option<String>,
    pub items: Vec<LineItem>,
    pub adjustments: Adjustments,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub settlement: Settlement,
    pub due_date: Option<NaiveDate>,
}

impl PurchaseInvoiceReadModel {
    fn empty(invoice_id: PurchaseInvoiceId) -> Self {
        Self {
            invoice_id,
            invoice_number: String::new(),
            invoice_date: None,
            supplier_id: None,
            supplier_name: String::new(),
            notes: None,
            items: Vec::new(),
            adjustments: Adjustments::default(),
            totals: InvoiceTotals::zero(),
            status: InvoiceStatus::Draft,
            settlement: Settlement::Pending,
            due_date: None,
        }
    }

    fn recompute_totals(&mut self) {
        self.totals = compute_totals(&self.items, &self.adjustments);
    }

    /// Derive the three-state settlement shown in the table. Overdue is
    /// never stored; it is a function of `due_date` and the query date.
    pub fn settlement_display(&self, today: NaiveDate) -> SettlementDisplay {
        match self.settlement {
            Settlement::Paid => SettlementDisplay::Paid,
            Settlement::Pending => {
                if self.due_date.is_some_and(|d| d < today) {
                    SettlementDisplay::Overdue
                } else {
                    SettlementDisplay::Pending
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PurchasesProjectionError {
    #[error("failed to deserialize purchase invoice event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: purchase invoices per pharmacy.
#[derive(Debug)]
pub struct PurchasesProjection<S>
where
    S: PharmacyStore<PurchaseInvoiceId, PurchaseInvoiceReadModel>,
{
    store: S,
    cursors: SequenceCursors,
}

impl<S> PurchasesProjection<S>
where
    S: PharmacyStore<PurchaseInvoiceId, PurchaseInvoiceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn get(
        &self,
        pharmacy_id: PharmacyId,
        invoice_id: &PurchaseInvoiceId,
    ) -> Option<PurchaseInvoiceReadModel> {
        self.store.get(pharmacy_id, invoice_id)
    }

    pub fn list(&self, pharmacy_id: PharmacyId) -> Vec<PurchaseInvoiceReadModel> {
        self.store.list(pharmacy_id)
    }

    /// Saved (non-draft, non-void) invoices, newest invoice number first —
    /// the purchases table.
    pub fn list_saved(&self, pharmacy_id: PharmacyId) -> Vec<PurchaseInvoiceReadModel> {
        let mut rows: Vec<_> = self
            .store
            .list(pharmacy_id)
            .into_iter()
            .filter(|rm| rm.status == InvoiceStatus::Saved)
            .collect();
        rows.sort_by(|a, b| a.invoice_number.cmp(&b.invoice_number));
        rows
    }

    /// Saved invoices for one supplier (the supplier-purchases page).
    pub fn list_for_supplier(
        &self,
        pharmacy_id: PharmacyId,
        supplier_id: SupplierId,
    ) -> Vec<PurchaseInvoiceReadModel> {
        self.list_saved(pharmacy_id)
            .into_iter()
            .filter(|rm| rm.supplier_id == Some(supplier_id))
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), PurchasesProjectionError> {
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
                return Err(PurchasesProjectionError::NonMonotonicSequence { last, found: seq });
            }
        }

        let ev: PurchaseInvoiceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| PurchasesProjectionError::Deserialize(e.to_string()))?;

        let (event_pharmacy, invoice_id) = match &ev {
            PurchaseInvoiceEvent::InvoiceOpened(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::ItemAdded(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::ItemUpdated(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::ItemRemoved(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::AdjustmentsSet(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::InvoiceSaved(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::InvoicePaid(e) => (e.pharmacy_id, e.invoice_id),
            PurchaseInvoiceEvent::InvoiceVoided(e) => (e.pharmacy_id, e.invoice_id),
        };

        if event_pharmacy != pharmacy_id {
            return Err(PurchasesProjectionError::PharmacyIsolation(
                "event pharmacy_id does not match envelope pharmacy_id".to_string(),
            ));
        }
        if invoice_id.0 != aggregate_id {
            return Err(PurchasesProjectionError::PharmacyIsolation(
                "event invoice_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut rm = self
            .store
            .get(pharmacy_id, &invoice_id)
            .unwrap_or_else(|| PurchaseInvoiceReadModel::empty(invoice_id));

        match ev {
            PurchaseInvoiceEvent::InvoiceOpened(e) => {
                rm = PurchaseInvoiceReadModel::empty(e.invoice_id);
                rm.invoice_number = e.invoice_number;
                rm.invoice_date = Some(e.invoice_date);
                rm.supplier_id = Some(e.supplier_id);
                rm.supplier_name = e.supplier_name;
                rm.notes = e.notes;
                rm.due_date = e.due_date;
            }
            PurchaseInvoiceEvent::ItemAdded(e) => {
                rm.items.push(e.item);
                rm.recompute_totals();
            }
            PurchaseInvoiceEvent::ItemUpdated(e) => {
                if let Some(line) = rm.items.iter_mut().find(|l| l.line_no == e.item.line_no) {
                    *line = e.item;
                }
                rm.recompute_totals();
            }
            PurchaseInvoiceEvent::ItemRemoved(e) => {
                rm.items.retain(|l| l.line_no != e.line_no);
                rm.recompute_totals();
            }
            PurchaseInvoiceEvent::AdjustmentsSet(e) => {
                rm.adjustments = e.adjustments;
                rm.recompute_totals();
            }
            PurchaseInvoiceEvent::InvoiceSaved(e) => {
                rm.items = e.items;
                rm.totals = e.totals;
                rm.status = InvoiceStatus::Saved;
            }
            PurchaseInvoiceEvent::InvoicePaid(_) => {
                rm.settlement = Settlement::Paid;
            }
            PurchaseInvoiceEvent::InvoiceVoided(_) => {
                rm.status = InvoiceStatus::Voided;
            }
        }

        self.store.upsert(pharmacy_id, invoice_id, rm);
        self.cursors.advance(pharmacy_id, aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model for the given pharmacies from scratch.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), PurchasesProjectionError> {
        let mut envs: Vec<_> = envelopes.into_iter().collect();

        {
            let mut pharmacies = envs.iter().map(|e| e.pharmacy_id()).collect::<Vec<_>>();
            pharmacies.sort_by_key(|p| *p.as_uuid().as_bytes());
            pharmacies.dedup();
            for p in pharmacies {
                self.store.clear_pharmacy(p);
                self.cursors.clear_pharmacy(p);
            }
        }

        envs.sort_by_key(|e| {
            (
                *e.pharmacy_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
