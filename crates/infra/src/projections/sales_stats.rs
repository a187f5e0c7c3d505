use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use thiserror::Error;

use pharma_catalog::MedicineId;
use pharma_core::PharmacyId;
use pharma_events::EventEnvelope;
use pharma_sales::SaleEvent;

use super::cursors::{CursorCheck, SequenceCursors};
use crate::read_model::PharmacyStore;

pub const AGGREGATE_TYPE: &str = "sales.sale";

/// Read model: one day of sales activity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySalesReadModel {
    pub date: NaiveDate,
    pub sales_total: f64,
    pub profit_total: f64,
    pub sale_count: u64,
}

/// Read model: cumulative sold packages per medicine (best-seller ranking).
#[derive(Debug, Clone, PartialEq)]
pub struct MedicineSalesReadModel {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub unit: String,
    pub sold: u64,
}

#[derive(Debug, Error)]
pub enum SalesStatsProjectionError {
    #[error("failed to deserialize sale event: {0}")]
    Deserialize(String),
    #[error("pharmacy isolation violation: {0}")]
    PharmacyIsolation(String),
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Projection: per-day totals and per-medicine counters for the sales
/// overview page.
#[derive(Debug)]
pub struct SalesStatsProjection<D, M>
where
    D: PharmacyStore<NaiveDate, DailySalesReadModel>,
    M: PharmacyStore<MedicineId, MedicineSalesReadModel>,
{
    daily: D,
    medicines: M,
    cursors: SequenceCursors,
}

impl<D, M> SalesStatsProjection<D, M>
where
    D: PharmacyStore<NaiveDate, DailySalesReadModel>,
    M: PharmacyStore<MedicineId, MedicineSalesReadModel>,
{
    pub fn new(daily: D, medicines: M) -> Self {
        Self {
            daily,
            medicines,
            cursors: SequenceCursors::new(),
        }
    }

    pub fn daily(&self, pharmacy_id: PharmacyId, date: NaiveDate) -> DailySalesReadModel {
        self.daily
            .get(pharmacy_id, &date)
            .unwrap_or(DailySalesReadModel {
                date,
                sales_total: 0.0,
                profit_total: 0.0,
                sale_count: 0,
            })
    }

    /// The medicine with the most packages sold, if any sales were recorded.
    pub fn best_seller(&self, pharmacy_id: PharmacyId) -> Option<MedicineSalesReadModel> {
        self.medicines
            .list(pharmacy_id)
            .into_iter()
            .filter(|rm| rm.sold > 0)
            .max_by_key(|rm| rm.sold)
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SalesStatsProjectionError> {
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
                return Err(SalesStatsProjectionError::NonMonotonicSequence { last, found: seq });
            }
        }

        let ev: SaleEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| SalesStatsProjectionError::Deserialize(e.to_string()))?;

        match ev {
            SaleEvent::SaleRecorded(e) => {
                if e.pharmacy_id != pharmacy_id {
                    return Err(SalesStatsProjectionError::PharmacyIsolation(
                        "event pharmacy_id does not match envelope pharmacy_id".to_string(),
                    ));
                }

                let date = e.occurred_at.date_naive();
                let mut day = self.daily(pharmacy_id, date);
                day.sales_total += e.total;
                day.profit_total += e.profit;
                day.sale_count += 1;
                self.daily.upsert(pharmacy_id, date, day);

                for line in &e.lines {
                    let mut rm = self
                        .medicines
                        .get(pharmacy_id, &line.medicine_id)
                        .unwrap_or_else(|| MedicineSalesReadModel {
                            medicine_id: line.medicine_id,
                            medicine_name: line.medicine_name.clone(),
                            unit: line.unit.clone(),
                            sold: 0,
                        });
                    rm.sold += u64::from(line.quantity);
                    rm.medicine_name = line.medicine_name.clone();
                    rm.unit = line.unit.clone();
                    self.medicines.upsert(pharmacy_id, line.medicine_id, rm);
                }
            }
            SaleEvent::SaleVoided(e) => {
                // Reverse the day the sale was recorded, not the void day.
                let date = e.recorded_at.date_naive();
                let mut day = self.daily(pharmacy_id, date);
                day.sales_total -= e.total;
                day.profit_total -= e.profit;
                day.sale_count = day.sale_count.saturating_sub(1);
                self.daily.upsert(pharmacy_id, date, day);

                for line in &e.lines {
                    if let Some(mut rm) = self.medicines.get(pharmacy_id, &line.medicine_id) {
                        rm.sold = rm.sold.saturating_sub(u64::from(line.quantity));
                        self.medicines.upsert(pharmacy_id, line.medicine_id, rm);
                    }
                }
            }
        }

        self.cursors.advance(pharmacy_id, aggregate_id, seq);
        Ok(())
    }
}
