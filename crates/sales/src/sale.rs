use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pharma_catalog::MedicineId;
use pharma_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharma_events::Event;

/// Sale identifier (pharmacy-scoped via `pharmacy_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaleId(pub AggregateId);

impl SaleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SaleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Sale line input, before the aggregate assigns a line number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLineInput {
    pub medicine_id: MedicineId,
    /// Snapshot at sale time.
    pub medicine_name: String,
    /// Snapshot of the package unit, for the best-seller display.
    pub unit: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub cost: f64,
}

impl SaleLineInput {
    fn validate(&self) -> Result<(), DomainError> {
        if self.medicine_name.trim().is_empty() {
            return Err(DomainError::validation("medicine name cannot be empty"));
        }
        if self.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if !self.unit_price.is_finite() || !self.cost.is_finite() {
            return Err(DomainError::validation("prices must be finite numbers"));
        }
        if self.unit_price < 0.0 || self.cost < 0.0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }
        Ok(())
    }
}

/// One sold row within a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleLine {
    pub line_no: u32,
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub cost: f64,
}

/// Aggregate root: Sale.
///
/// A sale is recorded whole (the counter flow has no draft phase) and can
/// only be voided afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Sale {
    id: SaleId,
    pharmacy_id: Option<PharmacyId>,
    lines: Vec<SaleLine>,
    voided: bool,
    recorded_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Sale {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SaleId) -> Self {
        Self {
            id,
            pharmacy_id: None,
            lines: Vec::new(),
            voided: false,
            recorded_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SaleId {
        self.id
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }

    pub fn lines(&self) -> &[SaleLine] {
        &self.lines
    }

    pub fn is_voided(&self) -> bool {
        self.voided
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.recorded_at
    }

    /// Σ unit_price × quantity, left-to-right in line order.
    pub fn total(&self) -> f64 {
        let mut total = 0.0;
        for line in &self.lines {
            total += line.unit_price * f64::from(line.quantity);
        }
        total
    }

    /// Σ (unit_price − cost) × quantity, left-to-right in line order.
    pub fn profit(&self) -> f64 {
        let mut profit = 0.0;
        for line in &self.lines {
            profit += (line.unit_price - line.cost) * f64::from(line.quantity);
        }
        profit
    }
}

impl AggregateRoot for Sale {
    type Id = SaleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordSale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordSale {
    pub pharmacy_id: PharmacyId,
    pub sale_id: SaleId,
    pub lines: Vec<SaleLineInput>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidSale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidSale {
    pub pharmacy_id: PharmacyId,
    pub sale_id: SaleId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaleCommand {
    RecordSale(RecordSale),
    VoidSale(VoidSale),
}

/// Event: SaleRecorded.
///
/// Carries the total and profit so downstream consumers (sales stats, stock)
/// never recompute them differently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecorded {
    pub pharmacy_id: PharmacyId,
    pub sale_id: SaleId,
    pub lines: Vec<SaleLine>,
    pub total: f64,
    pub profit: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SaleVoided.
///
/// Carries the amounts and the original recording time so consumers can
/// reverse the stats of the day the sale was made, not the day it was voided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleVoided {
    pub pharmacy_id: PharmacyId,
    pub sale_id: SaleId,
    pub lines: Vec<SaleLine>,
    pub total: f64,
    pub profit: f64,
    pub recorded_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SaleEvent {
    SaleRecorded(SaleRecorded),
    SaleVoided(SaleVoided),
}

impl Event for SaleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleRecorded(_) => "sales.sale.recorded",
            SaleEvent::SaleVoided(_) => "sales.sale.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SaleEvent::SaleRecorded(e) => e.occurred_at,
            SaleEvent::SaleVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Sale {
    type Command = SaleCommand;
    type Event = SaleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SaleEvent::SaleRecorded(e) => {
                self.id = e.sale_id;
                self.pharmacy_id = Some(e.pharmacy_id);
                self.lines = e.lines.clone();
                self.voided = false;
                self.recorded_at = Some(e.occurred_at);
                self.created = true;
            }
            SaleEvent::SaleVoided(_) => {
                self.voided = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SaleCommand::RecordSale(cmd) => self.handle_record(cmd),
            SaleCommand::VoidSale(cmd) => self.handle_void(cmd),
        }
    }
}

impl Sale {
    fn ensure_pharmacy(&self, pharmacy_id: PharmacyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.pharmacy_id != Some(pharmacy_id) {
            return Err(DomainError::invariant("pharmacy mismatch"));
        }
        Ok(())
    }

    fn ensure_sale_id(&self, sale_id: SaleId) -> Result<(), DomainError> {
        if self.id != sale_id {
            return Err(DomainError::invariant("sale_id mismatch"));
        }
        Ok(())
    }

    fn handle_record(&self, cmd: &RecordSale) -> Result<Vec<SaleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("sale already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("cannot record sale without lines"));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, input) in cmd.lines.iter().enumerate() {
            input.validate()?;
            lines.push(SaleLine {
                line_no: (idx + 1) as u32,
                medicine_id: input.medicine_id,
                medicine_name: input.medicine_name.clone(),
                unit: input.unit.clone(),
                quantity: input.quantity,
                unit_price: input.unit_price,
                cost: input.cost,
            });
        }

        let mut total = 0.0;
        let mut profit = 0.0;
        for line in &lines {
            total += line.unit_price * f64::from(line.quantity);
            profit += (line.unit_price - line.cost) * f64::from(line.quantity);
        }

        Ok(vec![SaleEvent::SaleRecorded(SaleRecorded {
            pharmacy_id: cmd.pharmacy_id,
            sale_id: cmd.sale_id,
            lines,
            total,
            profit,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidSale) -> Result<Vec<SaleEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_sale_id(cmd.sale_id)?;

        if self.voided {
            return Err(DomainError::conflict("sale is already void"));
        }

        let recorded_at = self
            .recorded_at
            .ok_or_else(|| DomainError::invariant("recorded sale has no recorded_at"))?;

        Ok(vec![SaleEvent::SaleVoided(SaleVoided {
            pharmacy_id: cmd.pharmacy_id,
            sale_id: cmd.sale_id,
            lines: self.lines.clone(),
            total: self.total(),
            profit: self.profit(),
            recorded_at,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
