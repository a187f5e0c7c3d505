use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharma_catalog::MedicineId;
use pharma_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharma_events::Event;
use pharma_parties::SupplierId;

use crate::totals::{Adjustments, InvoiceTotals, LineItem, compute_totals};

/// Purchase invoice identifier (pharmacy-scoped via `pharmacy_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseInvoiceId(pub AggregateId);

impl PurchaseInvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseInvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice lifecycle.
///
/// Draft while the entry form is open (items mutable, totals recomputed on
/// every change), Saved once submitted (frozen), Voided when deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Saved,
    Voided,
}

/// Settlement state of a saved invoice. Overdue is derived at query time
/// from `due_date`, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Settlement {
    Pending,
    Paid,
}

/// Line item fields as entered in the form, before the aggregate assigns a
/// line number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInput {
    pub medicine_id: MedicineId,
    pub medicine_name: String,
    pub medicine_code: String,
    pub quantity: u32,
    pub units_per_package: u32,
    pub sale_price: f64,
    pub cost: f64,
    pub tax_rate: f64,
    pub main_discount: f64,
    pub extra_discount: f64,
    pub bonus: u32,
    pub expirable: bool,
    pub expiry_date: Option<NaiveDate>,
}

impl ItemInput {
    fn validate(&self) -> Result<(), DomainError> {
        if self.medicine_name.trim().is_empty() {
            return Err(DomainError::validation("medicine name cannot be empty"));
        }
        if self.medicine_code.trim().is_empty() {
            return Err(DomainError::validation("medicine code cannot be empty"));
        }
        if self.quantity < 1 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if self.units_per_package < 1 {
            return Err(DomainError::validation("units_per_package must be at least 1"));
        }
        for (field, value) in [
            ("sale_price", self.sale_price),
            ("cost", self.cost),
            ("tax_rate", self.tax_rate),
            ("main_discount", self.main_discount),
            ("extra_discount", self.extra_discount),
        ] {
            if !value.is_finite() {
                return Err(DomainError::validation(format!("{field} must be a finite number")));
            }
        }
        if self.sale_price < 0.0 {
            return Err(DomainError::validation("sale_price cannot be negative"));
        }
        if self.cost < 0.0 {
            return Err(DomainError::validation("cost cannot be negative"));
        }
        if !(0.0..=100.0).contains(&self.tax_rate) {
            return Err(DomainError::validation("tax_rate must be between 0 and 100"));
        }
        if !(0.0..=100.0).contains(&self.main_discount)
            || !(0.0..=100.0).contains(&self.extra_discount)
        {
            return Err(DomainError::validation("discounts must be between 0 and 100"));
        }
        if self.expirable && self.expiry_date.is_none() {
            return Err(DomainError::validation(
                "expirable items require an expiry date",
            ));
        }
        Ok(())
    }

    /// Build the line, normalizing the expiry date: a date on a
    /// non-expirable line is dropped rather than stored.
    fn into_line(self, line_no: u32) -> LineItem {
        let expiry_date = if self.expirable { self.expiry_date } else { None };
        LineItem {
            line_no,
            medicine_id: self.medicine_id,
            medicine_name: self.medicine_name,
            medicine_code: self.medicine_code,
            quantity: self.quantity,
            units_per_package: self.units_per_package,
            sale_price: self.sale_price,
            cost: self.cost,
            tax_rate: self.tax_rate,
            main_discount: self.main_discount,
            extra_discount: self.extra_discount,
            bonus: self.bonus,
            expirable: self.expirable,
            expiry_date,
        }
    }
}

/// Aggregate root: PurchaseInvoice.
///
/// Owns its line items exclusively; lines hold only id/name/code snapshots of
/// the medicine they came from, never a live link. Totals are fully
/// re-derived from the items after every applied event, so `totals()` is
/// always consistent with `compute_totals(items(), adjustments())`.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseInvoice {
    id: PurchaseInvoiceId,
    pharmacy_id: Option<PharmacyId>,
    invoice_number: String,
    invoice_date: Option<NaiveDate>,
    supplier_id: Option<SupplierId>,
    supplier_name: String,
    notes: Option<String>,
    items: Vec<LineItem>,
    adjustments: Adjustments,
    totals: InvoiceTotals,
    status: InvoiceStatus,
    settlement: Settlement,
    due_date: Option<NaiveDate>,
    /// Highest line number ever assigned; removals never free a number.
    last_line_no: u32,
    version: u64,
    created: bool,
}

impl PurchaseInvoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseInvoiceId) -> Self {
        Self {
            id,
            pharmacy_id: None,
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
            last_line_no: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseInvoiceId {
        self.id
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn invoice_date(&self) -> Option<NaiveDate> {
        self.invoice_date
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn supplier_name(&self) -> &str {
        &self.supplier_name
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn adjustments(&self) -> Adjustments {
        self.adjustments
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn settlement(&self) -> Settlement {
        self.settlement
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    fn recompute_totals(&mut self) {
        self.totals = compute_totals(&self.items, &self.adjustments);
    }

    fn next_line_no(&self) -> u32 {
        // Line numbers are never reused, even after removals.
        self.last_line_no + 1
    }
}

impl AggregateRoot for PurchaseInvoice {
    type Id = PurchaseInvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenInvoice (start a draft from the add-purchase form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub supplier_id: SupplierId,
    /// Snapshot of the supplier's name at entry time.
    pub supplier_name: String,
    pub notes: Option<String>,
    /// Invoice date plus the supplier's payment period; used to derive
    /// overdue state on the read side.
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem (draft only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddItem {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub item: ItemInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateItem (draft only; replaces the line wholesale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateItem {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub line_no: u32,
    pub item: ItemInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem (draft only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetAdjustments (draft only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetAdjustments {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub adjustments: Adjustments,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SaveInvoice (freeze the draft).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveInvoice {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPaid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPaid {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice (the delete-purchase dialog).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseInvoiceCommand {
    OpenInvoice(OpenInvoice),
    AddItem(AddItem),
    UpdateItem(UpdateItem),
    RemoveItem(RemoveItem),
    SetAdjustments(SetAdjustments),
    SaveInvoice(SaveInvoice),
    MarkPaid(MarkPaid),
    VoidInvoice(VoidInvoice),
}

/// Event: InvoiceOpened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceOpened {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub supplier_id: SupplierId,
    pub supplier_name: String,
    pub notes: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub item: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemUpdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemUpdated {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub item: LineItem,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AdjustmentsSet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentsSet {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub adjustments: Adjustments,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceSaved.
///
/// Carries the final line items and the frozen totals snapshot so downstream
/// consumers (stock, read models) never replay the draft edit history or
/// re-run the pricing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSaved {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub items: Vec<LineItem>,
    pub totals: InvoiceTotals,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoicePaid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePaid {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub pharmacy_id: PharmacyId,
    pub invoice_id: PurchaseInvoiceId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PurchaseInvoiceEvent {
    InvoiceOpened(InvoiceOpened),
    ItemAdded(ItemAdded),
    ItemUpdated(ItemUpdated),
    ItemRemoved(ItemRemoved),
    AdjustmentsSet(AdjustmentsSet),
    InvoiceSaved(InvoiceSaved),
    InvoicePaid(InvoicePaid),
    InvoiceVoided(InvoiceVoided),
}

impl Event for PurchaseInvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseInvoiceEvent::InvoiceOpened(_) => "purchasing.invoice.opened",
            PurchaseInvoiceEvent::ItemAdded(_) => "purchasing.invoice.item_added",
            PurchaseInvoiceEvent::ItemUpdated(_) => "purchasing.invoice.item_updated",
            PurchaseInvoiceEvent::ItemRemoved(_) => "purchasing.invoice.item_removed",
            PurchaseInvoiceEvent::AdjustmentsSet(_) => "purchasing.invoice.adjustments_set",
            PurchaseInvoiceEvent::InvoiceSaved(_) => "purchasing.invoice.saved",
            PurchaseInvoiceEvent::InvoicePaid(_) => "purchasing.invoice.paid",
            PurchaseInvoiceEvent::InvoiceVoided(_) => "purchasing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseInvoiceEvent::InvoiceOpened(e) => e.occurred_at,
            PurchaseInvoiceEvent::ItemAdded(e) => e.occurred_at,
            PurchaseInvoiceEvent::ItemUpdated(e) => e.occurred_at,
            PurchaseInvoiceEvent::ItemRemoved(e) => e.occurred_at,
            PurchaseInvoiceEvent::AdjustmentsSet(e) => e.occurred_at,
            PurchaseInvoiceEvent::InvoiceSaved(e) => e.occurred_at,
            PurchaseInvoiceEvent::InvoicePaid(e) => e.occurred_at,
            PurchaseInvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseInvoice {
    type Command = PurchaseInvoiceCommand;
    type Event = PurchaseInvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseInvoiceEvent::InvoiceOpened(e) => {
                self.id = e.invoice_id;
                self.pharmacy_id = Some(e.pharmacy_id);
                self.invoice_number = e.invoice_number.clone();
                self.invoice_date = Some(e.invoice_date);
                self.supplier_id = Some(e.supplier_id);
                self.supplier_name = e.supplier_name.clone();
                self.notes = e.notes.clone();
                self.items.clear();
                self.adjustments = Adjustments::default();
                self.status = InvoiceStatus::Draft;
                self.settlement = Settlement::Pending;
                self.due_date = e.due_date;
                self.created = true;
                self.recompute_totals();
            }
            PurchaseInvoiceEvent::ItemAdded(e) => {
                self.last_line_no = self.last_line_no.max(e.item.line_no);
                self.items.push(e.item.clone());
                self.recompute_totals();
            }
            PurchaseInvoiceEvent::ItemUpdated(e) => {
                if let Some(line) = self.items.iter_mut().find(|l| l.line_no == e.item.line_no) {
                    *line = e.item.clone();
                }
                self.recompute_totals();
            }
            PurchaseInvoiceEvent::ItemRemoved(e) => {
                self.items.retain(|l| l.line_no != e.line_no);
                self.recompute_totals();
            }
            PurchaseInvoiceEvent::AdjustmentsSet(e) => {
                self.adjustments = e.adjustments;
                self.recompute_totals();
            }
            PurchaseInvoiceEvent::InvoiceSaved(e) => {
                self.status = InvoiceStatus::Saved;
                self.totals = e.totals;
            }
            PurchaseInvoiceEvent::InvoicePaid(_) => {
                self.settlement = Settlement::Paid;
            }
            PurchaseInvoiceEvent::InvoiceVoided(_) => {
                self.status = InvoiceStatus::Voided;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseInvoiceCommand::OpenInvoice(cmd) => self.handle_open(cmd),
            PurchaseInvoiceCommand::AddItem(cmd) => self.handle_add_item(cmd),
            PurchaseInvoiceCommand::UpdateItem(cmd) => self.handle_update_item(cmd),
            PurchaseInvoiceCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            PurchaseInvoiceCommand::SetAdjustments(cmd) => self.handle_set_adjustments(cmd),
            PurchaseInvoiceCommand::SaveInvoice(cmd) => self.handle_save(cmd),
            PurchaseInvoiceCommand::MarkPaid(cmd) => self.handle_mark_paid(cmd),
            PurchaseInvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl PurchaseInvoice {
    fn ensure_pharmacy(&self, pharmacy_id: PharmacyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.pharmacy_id != Some(pharmacy_id) {
            return Err(DomainError::invariant("pharmacy mismatch"));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: PurchaseInvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn ensure_draft(&self) -> Result<(), DomainError> {
        match self.status {
            InvoiceStatus::Draft => Ok(()),
            InvoiceStatus::Saved => Err(DomainError::invariant(
                "saved invoices are frozen and cannot be modified",
            )),
            InvoiceStatus::Voided => Err(DomainError::invariant(
                "voided invoices cannot be modified",
            )),
        }
    }

    fn handle_open(&self, cmd: &OpenInvoice) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }

        if cmd.invoice_number.trim().is_empty() {
            return Err(DomainError::validation("invoice number cannot be empty"));
        }
        if cmd.supplier_name.trim().is_empty() {
            return Err(DomainError::validation("supplier name cannot be empty"));
        }

        Ok(vec![PurchaseInvoiceEvent::InvoiceOpened(InvoiceOpened {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            invoice_date: cmd.invoice_date,
            supplier_id: cmd.supplier_id,
            supplier_name: cmd.supplier_name.clone(),
            notes: cmd.notes.clone(),
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        self.ensure_draft()?;

        cmd.item.validate()?;

        let item = cmd.item.clone().into_line(self.next_line_no());
        Ok(vec![PurchaseInvoiceEvent::ItemAdded(ItemAdded {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            item,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_item(
        &self,
        cmd: &UpdateItem,
    ) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        self.ensure_draft()?;

        if !self.items.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::not_found());
        }
        cmd.item.validate()?;

        let item = cmd.item.clone().into_line(cmd.line_no);
        Ok(vec![PurchaseInvoiceEvent::ItemUpdated(ItemUpdated {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            item,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(
        &self,
        cmd: &RemoveItem,
    ) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        self.ensure_draft()?;

        if !self.items.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::not_found());
        }

        Ok(vec![PurchaseInvoiceEvent::ItemRemoved(ItemRemoved {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_adjustments(
        &self,
        cmd: &SetAdjustments,
    ) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        self.ensure_draft()?;

        let adj = cmd.adjustments;
        if !adj.extra_costs.is_finite() || !adj.extra_discount.is_finite() {
            return Err(DomainError::validation("adjustments must be finite numbers"));
        }
        if adj.extra_costs < 0.0 || adj.extra_discount < 0.0 {
            return Err(DomainError::validation("adjustments cannot be negative"));
        }

        Ok(vec![PurchaseInvoiceEvent::AdjustmentsSet(AdjustmentsSet {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            adjustments: adj,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_save(&self, cmd: &SaveInvoice) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;
        self.ensure_draft()?;

        if self.items.is_empty() {
            return Err(DomainError::validation(
                "cannot save invoice without line items",
            ));
        }

        Ok(vec![PurchaseInvoiceEvent::InvoiceSaved(InvoiceSaved {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            items: self.items.clone(),
            totals: compute_totals(&self.items, &self.adjustments),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_paid(&self, cmd: &MarkPaid) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        match self.status {
            InvoiceStatus::Draft => {
                return Err(DomainError::invariant(
                    "only saved invoices can be marked paid",
                ));
            }
            InvoiceStatus::Voided => {
                return Err(DomainError::invariant("voided invoices cannot be paid"));
            }
            InvoiceStatus::Saved => {}
        }
        if self.settlement == Settlement::Paid {
            return Err(DomainError::conflict("invoice is already paid"));
        }

        Ok(vec![PurchaseInvoiceEvent::InvoicePaid(InvoicePaid {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<PurchaseInvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status == InvoiceStatus::Voided {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if self.settlement == Settlement::Paid {
            return Err(DomainError::invariant("paid invoices cannot be voided"));
        }

        Ok(vec![PurchaseInvoiceEvent::InvoiceVoided(InvoiceVoided {
            pharmacy_id: cmd.pharmacy_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharma_core::AggregateId;

    fn test_pharmacy_id() -> PharmacyId {
        PharmacyId::new()
    }

    fn test_invoice_id() -> PurchaseInvoiceId {
        PurchaseInvoiceId::new(AggregateId::new())
    }

    fn test_supplier_id() -> SupplierId {
        SupplierId::new(AggregateId::new())
    }

    fn test_medicine_id() -> MedicineId {
        MedicineId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
    }

    fn item_input(sale_price: f64, quantity: u32, cost: f64, tax_rate: f64) -> ItemInput {
        ItemInput {
            medicine_id: test_medicine_id(),
            medicine_name: "Panadol Extra".to_string(),
            medicine_code: "MED001".to_string(),
            quantity,
            units_per_package: 24,
            sale_price,
            cost,
            tax_rate,
            main_discount: 5.0,
            extra_discount: 2.0,
            bonus: 5,
            expirable: true,
            expiry_date: NaiveDate::from_ymd_opt(2028, 12, 31),
        }
    }

    fn open_cmd(pharmacy_id: PharmacyId, invoice_id: PurchaseInvoiceId) -> OpenInvoice {
        OpenInvoice {
            pharmacy_id,
            invoice_id,
            invoice_number: "INV-001".to_string(),
            invoice_date: test_date(),
            supplier_id: test_supplier_id(),
            supplier_name: "United Drug House".to_string(),
            notes: Some("Monthly essentials order".to_string()),
            due_date: NaiveDate::from_ymd_opt(2026, 4, 1),
            occurred_at: test_time(),
        }
    }

    fn draft_invoice(pharmacy_id: PharmacyId, invoice_id: PurchaseInvoiceId) -> PurchaseInvoice {
        let mut invoice = PurchaseInvoice::empty(invoice_id);
        let events = invoice
            .handle(&PurchaseInvoiceCommand::OpenInvoice(open_cmd(
                pharmacy_id,
                invoice_id,
            )))
            .unwrap();
        invoice.apply(&events[0]);
        invoice
    }

    fn add_item(
        invoice: &mut PurchaseInvoice,
        pharmacy_id: PharmacyId,
        invoice_id: PurchaseInvoiceId,
        input: ItemInput,
    ) {
        let events = invoice
            .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                pharmacy_id,
                invoice_id,
                item: input,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
    }

    #[test]
    fn open_invoice_starts_an_empty_draft() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let invoice = draft_invoice(pharmacy_id, invoice_id);

        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.settlement(), Settlement::Pending);
        assert!(invoice.items().is_empty());
        assert_eq!(invoice.totals().total, 0.0);
        assert_eq!(invoice.invoice_number(), "INV-001");
        assert_eq!(invoice.supplier_name(), "United Drug House");
    }

    #[test]
    fn totals_recompute_after_every_item_change() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);

        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));
        assert_eq!(invoice.totals().items_value, 4550.0);
        assert!((invoice.totals().tax_total - 492.8).abs() < 1e-9);
        assert!((invoice.totals().base_total - 5042.8).abs() < 1e-9);

        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(85.0, 50, 72.5, 14.0));
        assert_eq!(invoice.totals().items_value, 4550.0 + 4250.0);

        // State totals always agree with a fresh engine run.
        let expected = compute_totals(invoice.items(), &invoice.adjustments());
        assert_eq!(invoice.totals(), expected);
    }

    #[test]
    fn update_item_replaces_the_line_and_recomputes() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        let events = invoice
            .handle(&PurchaseInvoiceCommand::UpdateItem(UpdateItem {
                pharmacy_id,
                invoice_id,
                line_no: 1,
                item: item_input(45.5, 200, 35.2, 14.0),
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);

        assert_eq!(invoice.items().len(), 1);
        assert_eq!(invoice.items()[0].quantity, 200);
        assert_eq!(invoice.totals().items_value, 9100.0);
    }

    #[test]
    fn remove_item_recomputes_and_line_numbers_are_never_reused() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(85.0, 50, 72.5, 14.0));

        let events = invoice
            .handle(&PurchaseInvoiceCommand::RemoveItem(RemoveItem {
                pharmacy_id,
                invoice_id,
                line_no: 2,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);

        assert_eq!(invoice.items().len(), 1);
        assert_eq!(invoice.totals().items_value, 4550.0);

        // The freed number is not handed out again.
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(28.75, 75, 22.3, 14.0));
        assert_eq!(invoice.items()[1].line_no, 3);
    }

    #[test]
    fn adjustments_flow_into_the_grand_total() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.0, 100, 0.0, 0.0));

        let events = invoice
            .handle(&PurchaseInvoiceCommand::SetAdjustments(SetAdjustments {
                pharmacy_id,
                invoice_id,
                adjustments: Adjustments {
                    extra_costs: 200.0,
                    extra_discount: 100.0,
                },
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);

        assert_eq!(invoice.totals().base_total, 4500.0);
        assert_eq!(invoice.totals().total, 4600.0);
    }

    #[test]
    fn save_freezes_the_invoice() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        let events = invoice
            .handle(&PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        match &events[0] {
            PurchaseInvoiceEvent::InvoiceSaved(e) => {
                assert_eq!(e.totals.items_value, 4550.0);
            }
            _ => panic!("Expected InvoiceSaved event"),
        }
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Saved);

        // Frozen: every mutation is rejected.
        let err = invoice
            .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                pharmacy_id,
                invoice_id,
                item: item_input(10.0, 1, 5.0, 0.0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("frozen") => {}
            _ => panic!("Expected InvariantViolation for modifying saved invoice"),
        }

        let err = invoice
            .handle(&PurchaseInvoiceCommand::SetAdjustments(SetAdjustments {
                pharmacy_id,
                invoice_id,
                adjustments: Adjustments::default(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected InvariantViolation for adjusting saved invoice"),
        }
    }

    #[test]
    fn cannot_save_empty_invoice() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let invoice = draft_invoice(pharmacy_id, invoice_id);

        let err = invoice
            .handle(&PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("without line items") => {}
            _ => panic!("Expected Validation error for saving empty invoice"),
        }
    }

    #[test]
    fn mark_paid_requires_saved_invoice() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        let err = invoice
            .handle(&PurchaseInvoiceCommand::MarkPaid(MarkPaid {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("only saved") => {}
            _ => panic!("Expected InvariantViolation for paying a draft"),
        }

        let events = invoice
            .handle(&PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);

        let events = invoice
            .handle(&PurchaseInvoiceCommand::MarkPaid(MarkPaid {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.settlement(), Settlement::Paid);
    }

    #[test]
    fn paid_invoices_cannot_be_voided() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        for cmd in [
            PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }),
            PurchaseInvoiceCommand::MarkPaid(MarkPaid {
                pharmacy_id,
                invoice_id,
                occurred_at: test_time(),
            }),
        ] {
            let events = invoice.handle(&cmd).unwrap();
            invoice.apply(&events[0]);
        }

        let err = invoice
            .handle(&PurchaseInvoiceCommand::VoidInvoice(VoidInvoice {
                pharmacy_id,
                invoice_id,
                reason: Some("Entry mistake".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("paid") => {}
            _ => panic!("Expected InvariantViolation for voiding paid invoice"),
        }
    }

    #[test]
    fn voided_invoices_reject_everything_else() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        let events = invoice
            .handle(&PurchaseInvoiceCommand::VoidInvoice(VoidInvoice {
                pharmacy_id,
                invoice_id,
                reason: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Voided);

        let err = invoice
            .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                pharmacy_id,
                invoice_id,
                item: item_input(10.0, 1, 5.0, 0.0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("voided") => {}
            _ => panic!("Expected InvariantViolation for modifying voided invoice"),
        }
    }

    #[test]
    fn add_item_rejects_out_of_range_fields() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let invoice = draft_invoice(pharmacy_id, invoice_id);

        let cases = [
            {
                let mut i = item_input(45.5, 100, 35.2, 14.0);
                i.quantity = 0;
                i
            },
            {
                let mut i = item_input(45.5, 100, 35.2, 14.0);
                i.units_per_package = 0;
                i
            },
            item_input(-1.0, 100, 35.2, 14.0),
            item_input(45.5, 100, -0.5, 14.0),
            item_input(45.5, 100, 35.2, 120.0),
            {
                let mut i = item_input(45.5, 100, 35.2, 14.0);
                i.main_discount = 101.0;
                i
            },
            {
                let mut i = item_input(45.5, 100, 35.2, 14.0);
                i.sale_price = f64::NAN;
                i
            },
        ];

        for input in cases {
            let err = invoice
                .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                    pharmacy_id,
                    invoice_id,
                    item: input,
                    occurred_at: test_time(),
                }))
                .unwrap_err();
            match err {
                DomainError::Validation(_) => {}
                other => panic!("Expected Validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn expirable_items_require_expiry_date() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let invoice = draft_invoice(pharmacy_id, invoice_id);

        let mut input = item_input(45.5, 100, 35.2, 14.0);
        input.expiry_date = None;

        let err = invoice
            .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                pharmacy_id,
                invoice_id,
                item: input,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("expiry") => {}
            _ => panic!("Expected Validation error for missing expiry date"),
        }
    }

    #[test]
    fn expiry_date_is_dropped_on_non_expirable_items() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);

        let mut input = item_input(45.5, 100, 35.2, 14.0);
        input.expirable = false;
        // Stray date from the form; must be absent in stored state.
        input.expiry_date = NaiveDate::from_ymd_opt(2028, 12, 31);

        add_item(&mut invoice, pharmacy_id, invoice_id, input);
        assert!(!invoice.items()[0].expirable);
        assert!(invoice.items()[0].expiry_date.is_none());
    }

    #[test]
    fn update_unknown_line_is_not_found() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));

        let err = invoice
            .handle(&PurchaseInvoiceCommand::UpdateItem(UpdateItem {
                pharmacy_id,
                invoice_id,
                line_no: 42,
                item: item_input(45.5, 100, 35.2, 14.0),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound for unknown line_no"),
        }
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();
        let mut invoice = draft_invoice(pharmacy_id, invoice_id);
        add_item(&mut invoice, pharmacy_id, invoice_id, item_input(45.5, 100, 35.2, 14.0));
        let before = invoice.clone();

        let cmd = PurchaseInvoiceCommand::SaveInvoice(SaveInvoice {
            pharmacy_id,
            invoice_id,
            occurred_at: test_time(),
        });
        let events1 = invoice.handle(&cmd).unwrap();
        let events2 = invoice.handle(&cmd).unwrap();

        assert_eq!(invoice, before);
        assert_eq!(events1, events2);
    }

    #[test]
    fn apply_is_deterministic() {
        let pharmacy_id = test_pharmacy_id();
        let invoice_id = test_invoice_id();

        let mut source = draft_invoice(pharmacy_id, invoice_id);
        let mut events = Vec::new();
        for input in [
            item_input(45.5, 100, 35.2, 14.0),
            item_input(85.0, 50, 72.5, 14.0),
        ] {
            let evs = source
                .handle(&PurchaseInvoiceCommand::AddItem(AddItem {
                    pharmacy_id,
                    invoice_id,
                    item: input,
                    occurred_at: test_time(),
                }))
                .unwrap();
            source.apply(&evs[0]);
            events.push(evs.into_iter().next().unwrap());
        }

        let mut a = draft_invoice(pharmacy_id, invoice_id);
        let mut b = draft_invoice(pharmacy_id, invoice_id);
        for ev in &events {
            a.apply(ev);
            b.apply(ev);
        }

        assert_eq!(a.version(), b.version());
        assert_eq!(a.totals(), b.totals());
        assert_eq!(a.items(), b.items());
    }
}
