use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use pharma_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharma_events::Event;

/// Supplier identifier (pharmacy-scoped via `pharmacy_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Supplier kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupplierKind {
    Warehouse,
    Company,
    Person,
}

/// Debit settlement classification, derived from state — never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DebitStatus {
    Paid,
    Due,
    Overdue,
}

/// Contact phone numbers; the mobile number is mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierContact {
    pub mobile_phone: String,
    pub landline_phone: Option<String>,
}

/// Aggregate root: Supplier.
///
/// The supplier's debit history (old/new/change/reason) is the
/// `SupplierDebitAdjusted` event stream — no separate log structure exists.
#[derive(Debug, Clone, PartialEq)]
pub struct Supplier {
    id: SupplierId,
    pharmacy_id: Option<PharmacyId>,
    /// Short display code, e.g. "ACD".
    short: String,
    name: String,
    kind: SupplierKind,
    contact: Option<SupplierContact>,
    /// Amount the pharmacy currently owes this supplier. Never negative.
    debit: f64,
    payment_period_months: u32,
    settlement_date: Option<NaiveDate>,
    checks_due_date: Option<NaiveDate>,
    version: u64,
    created: bool,
}

impl Supplier {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: SupplierId) -> Self {
        Self {
            id,
            pharmacy_id: None,
            short: String::new(),
            name: String::new(),
            kind: SupplierKind::Company,
            contact: None,
            debit: 0.0,
            payment_period_months: 0,
            settlement_date: None,
            checks_due_date: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> SupplierId {
        self.id
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }

    pub fn short(&self) -> &str {
        &self.short
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SupplierKind {
        self.kind
    }

    pub fn contact(&self) -> Option<&SupplierContact> {
        self.contact.as_ref()
    }

    pub fn debit(&self) -> f64 {
        self.debit
    }

    pub fn payment_period_months(&self) -> u32 {
        self.payment_period_months
    }

    pub fn settlement_date(&self) -> Option<NaiveDate> {
        self.settlement_date
    }

    pub fn checks_due_date(&self) -> Option<NaiveDate> {
        self.checks_due_date
    }

    /// Classify the current debit relative to `today`.
    ///
    /// Paid when nothing is owed; Overdue when money is owed past the
    /// settlement date; Due otherwise.
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

impl AggregateRoot for Supplier {
    type Id = SupplierId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterSupplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSupplier {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    pub short: String,
    pub name: String,
    pub kind: SupplierKind,
    pub contact: SupplierContact,
    pub payment_period_months: u32,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateSupplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSupplier {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new contact (if None, keep existing).
    pub contact: Option<SupplierContact>,
    pub payment_period_months: Option<u32>,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustDebit (positive delta = pharmacy owes more).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustDebit {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    pub delta: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupplierCommand {
    RegisterSupplier(RegisterSupplier),
    UpdateSupplier(UpdateSupplier),
    AdjustDebit(AdjustDebit),
}

/// Event: SupplierRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierRegistered {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    pub short: String,
    pub name: String,
    pub kind: SupplierKind,
    pub contact: SupplierContact,
    pub payment_period_months: u32,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierUpdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierUpdated {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    pub name: String,
    pub contact: SupplierContact,
    pub payment_period_months: u32,
    pub settlement_date: Option<NaiveDate>,
    pub checks_due_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SupplierDebitAdjusted.
///
/// Carries the before/after pair so the event stream doubles as the debit
/// change log shown in the supplier detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplierDebitAdjusted {
    pub pharmacy_id: PharmacyId,
    pub supplier_id: SupplierId,
    pub old_debit: f64,
    pub new_debit: f64,
    pub delta: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SupplierEvent {
    SupplierRegistered(SupplierRegistered),
    SupplierUpdated(SupplierUpdated),
    SupplierDebitAdjusted(SupplierDebitAdjusted),
}

impl Event for SupplierEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SupplierEvent::SupplierRegistered(_) => "parties.supplier.registered",
            SupplierEvent::SupplierUpdated(_) => "parties.supplier.updated",
            SupplierEvent::SupplierDebitAdjusted(_) => "parties.supplier.debit_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SupplierEvent::SupplierRegistered(e) => e.occurred_at,
            SupplierEvent::SupplierUpdated(e) => e.occurred_at,
            SupplierEvent::SupplierDebitAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Supplier {
    type Command = SupplierCommand;
    type Event = SupplierEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SupplierEvent::SupplierRegistered(e) => {
                self.id = e.supplier_id;
                self.pharmacy_id = Some(e.pharmacy_id);
                self.short = e.short.clone();
                self.name = e.name.clone();
                self.kind = e.kind;
                self.contact = Some(e.contact.clone());
                self.debit = 0.0;
                self.payment_period_months = e.payment_period_months;
                self.settlement_date = e.settlement_date;
                self.checks_due_date = e.checks_due_date;
                self.created = true;
            }
            SupplierEvent::SupplierUpdated(e) => {
                self.name = e.name.clone();
                self.contact = Some(e.contact.clone());
                self.payment_period_months = e.payment_period_months;
                self.settlement_date = e.settlement_date;
                self.checks_due_date = e.checks_due_date;
            }
            SupplierEvent::SupplierDebitAdjusted(e) => {
                self.debit = e.new_debit;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SupplierCommand::RegisterSupplier(cmd) => self.handle_register(cmd),
            SupplierCommand::UpdateSupplier(cmd) => self.handle_update(cmd),
            SupplierCommand::AdjustDebit(cmd) => self.handle_adjust_debit(cmd),
        }
    }
}

impl Supplier {
    fn ensure_pharmacy(&self, pharmacy_id: PharmacyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.pharmacy_id != Some(pharmacy_id) {
            return Err(DomainError::invariant("pharmacy mismatch"));
        }
        Ok(())
    }

    fn ensure_supplier_id(&self, supplier_id: SupplierId) -> Result<(), DomainError> {
        if self.id != supplier_id {
            return Err(DomainError::invariant("supplier_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("supplier already exists"));
        }

        if cmd.short.trim().is_empty() {
            return Err(DomainError::validation("short code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.contact.mobile_phone.trim().is_empty() {
            return Err(DomainError::validation("mobile phone cannot be empty"));
        }

        Ok(vec![SupplierEvent::SupplierRegistered(SupplierRegistered {
            pharmacy_id: cmd.pharmacy_id,
            supplier_id: cmd.supplier_id,
            short: cmd.short.clone(),
            name: cmd.name.clone(),
            kind: cmd.kind,
            contact: cmd.contact.clone(),
            payment_period_months: cmd.payment_period_months,
            settlement_date: cmd.settlement_date,
            checks_due_date: cmd.checks_due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateSupplier) -> Result<Vec<SupplierEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_supplier_id(cmd.supplier_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let new_contact = match &cmd.contact {
            Some(c) => {
                if c.mobile_phone.trim().is_empty() {
                    return Err(DomainError::validation("mobile phone cannot be empty"));
                }
                c.clone()
            }
            None => self
                .contact
                .clone()
                .ok_or_else(|| DomainError::invariant("registered supplier has no contact"))?,
        };

        Ok(vec![SupplierEvent::SupplierUpdated(SupplierUpdated {
            pharmacy_id: cmd.pharmacy_id,
            supplier_id: cmd.supplier_id,
            name: new_name,
            contact: new_contact,
            payment_period_months: cmd
                .payment_period_months
                .unwrap_or(self.payment_period_months),
            settlement_date: cmd.settlement_date.or(self.settlement_date),
            checks_due_date: cmd.checks_due_date.or(self.checks_due_date),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust_debit(&self, cmd: &AdjustDebit) -> Result<Vec<SupplierEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_supplier_id(cmd.supplier_id)?;

        if !cmd.delta.is_finite() || cmd.delta == 0.0 {
            return Err(DomainError::validation("delta must be a non-zero number"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }

        let new_debit = self.debit + cmd.delta;
        if new_debit < 0.0 {
            return Err(DomainError::invariant("debit cannot go negative"));
        }

        Ok(vec![SupplierEvent::SupplierDebitAdjusted(
            SupplierDebitAdjusted {
                pharmacy_id: cmd.pharmacy_id,
                supplier_id: cmd.supplier_id,
                old_debit: self.debit,
                new_debit,
                delta: cmd.delta,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharma_core::AggregateId;

    fn test_pharmacy_id() -> PharmacyId {
        PharmacyId::new()
    }

    fn test_supplier_id() -> SupplierId {
        SupplierId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_contact() -> SupplierContact {
        SupplierContact {
            mobile_phone: "+201112223334".to_string(),
            landline_phone: Some("0223456789".to_string()),
        }
    }

    fn registered_supplier(pharmacy_id: PharmacyId, supplier_id: SupplierId) -> Supplier {
        let mut supplier = Supplier::empty(supplier_id);
        let cmd = RegisterSupplier {
            pharmacy_id,
            supplier_id,
            short: "ACD".to_string(),
            name: "United Drug House".to_string(),
            kind: SupplierKind::Warehouse,
            contact: test_contact(),
            payment_period_months: 2,
            settlement_date: None,
            checks_due_date: None,
            occurred_at: test_time(),
        };
        let events = supplier
            .handle(&SupplierCommand::RegisterSupplier(cmd))
            .unwrap();
        supplier.apply(&events[0]);
        supplier
    }

    #[test]
    fn register_supplier_emits_supplier_registered_event() {
        let supplier = Supplier::empty(test_supplier_id());
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();

        let cmd = RegisterSupplier {
            pharmacy_id,
            supplier_id,
            short: "GLX".to_string(),
            name: "Glaxo Egypt".to_string(),
            kind: SupplierKind::Company,
            contact: test_contact(),
            payment_period_months: 3,
            settlement_date: None,
            checks_due_date: None,
            occurred_at: test_time(),
        };

        let events = supplier
            .handle(&SupplierCommand::RegisterSupplier(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            SupplierEvent::SupplierRegistered(e) => {
                assert_eq!(e.pharmacy_id, pharmacy_id);
                assert_eq!(e.supplier_id, supplier_id);
                assert_eq!(e.short, "GLX");
                assert_eq!(e.kind, SupplierKind::Company);
                assert_eq!(e.payment_period_months, 3);
            }
            _ => panic!("Expected SupplierRegistered event"),
        }
    }

    #[test]
    fn register_supplier_rejects_empty_short_code() {
        let supplier = Supplier::empty(test_supplier_id());
        let cmd = RegisterSupplier {
            pharmacy_id: test_pharmacy_id(),
            supplier_id: test_supplier_id(),
            short: "  ".to_string(),
            name: "Glaxo Egypt".to_string(),
            kind: SupplierKind::Company,
            contact: test_contact(),
            payment_period_months: 0,
            settlement_date: None,
            checks_due_date: None,
            occurred_at: test_time(),
        };

        let err = supplier
            .handle(&SupplierCommand::RegisterSupplier(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty short code"),
        }
    }

    #[test]
    fn adjust_debit_records_old_and_new_values() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let mut supplier = registered_supplier(pharmacy_id, supplier_id);

        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: 5000.0,
            reason: "Invoice INV-001".to_string(),
            occurred_at: test_time(),
        };
        let events = supplier.handle(&SupplierCommand::AdjustDebit(cmd)).unwrap();
        match &events[0] {
            SupplierEvent::SupplierDebitAdjusted(e) => {
                assert_eq!(e.old_debit, 0.0);
                assert_eq!(e.new_debit, 5000.0);
                assert_eq!(e.delta, 5000.0);
                assert_eq!(e.reason, "Invoice INV-001");
            }
            _ => panic!("Expected SupplierDebitAdjusted event"),
        }
        supplier.apply(&events[0]);
        assert_eq!(supplier.debit(), 5000.0);

        // Partial repayment keeps the log chain intact.
        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: -2000.0,
            reason: "Bank transfer".to_string(),
            occurred_at: test_time(),
        };
        let events = supplier.handle(&SupplierCommand::AdjustDebit(cmd)).unwrap();
        match &events[0] {
            SupplierEvent::SupplierDebitAdjusted(e) => {
                assert_eq!(e.old_debit, 5000.0);
                assert_eq!(e.new_debit, 3000.0);
            }
            _ => panic!("Expected SupplierDebitAdjusted event"),
        }
    }

    #[test]
    fn debit_cannot_go_negative() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let supplier = registered_supplier(pharmacy_id, supplier_id);

        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: -1.0,
            reason: "Overpayment".to_string(),
            occurred_at: test_time(),
        };
        let err = supplier
            .handle(&SupplierCommand::AdjustDebit(cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("negative") => {}
            _ => panic!("Expected InvariantViolation for negative debit"),
        }
    }

    #[test]
    fn adjust_debit_requires_reason() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let supplier = registered_supplier(pharmacy_id, supplier_id);

        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: 100.0,
            reason: "  ".to_string(),
            occurred_at: test_time(),
        };
        let err = supplier
            .handle(&SupplierCommand::AdjustDebit(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("reason") => {}
            _ => panic!("Expected Validation error for empty reason"),
        }
    }

    #[test]
    fn debit_status_classification() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let mut supplier = registered_supplier(pharmacy_id, supplier_id);

        let today = NaiveDate::from_ymd_opt(2026, 2, 15).unwrap();

        // Nothing owed: Paid, regardless of settlement date.
        assert_eq!(supplier.debit_status(today), DebitStatus::Paid);

        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: 1200.0,
            reason: "Invoice INV-003".to_string(),
            occurred_at: test_time(),
        };
        let events = supplier.handle(&SupplierCommand::AdjustDebit(cmd)).unwrap();
        supplier.apply(&events[0]);

        // Owed, no settlement date: Due.
        assert_eq!(supplier.debit_status(today), DebitStatus::Due);

        let update = UpdateSupplier {
            pharmacy_id,
            supplier_id,
            name: None,
            contact: None,
            payment_period_months: None,
            settlement_date: NaiveDate::from_ymd_opt(2026, 2, 1),
            checks_due_date: None,
            occurred_at: test_time(),
        };
        let events = supplier
            .handle(&SupplierCommand::UpdateSupplier(update))
            .unwrap();
        supplier.apply(&events[0]);

        // Owed past the settlement date: Overdue.
        assert_eq!(supplier.debit_status(today), DebitStatus::Overdue);
    }

    #[test]
    fn update_supplier_keeps_existing_fields_when_none() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let mut supplier = registered_supplier(pharmacy_id, supplier_id);

        let update = UpdateSupplier {
            pharmacy_id,
            supplier_id,
            name: Some("United Drug House Co.".to_string()),
            contact: None,
            payment_period_months: None,
            settlement_date: None,
            checks_due_date: None,
            occurred_at: test_time(),
        };
        let events = supplier
            .handle(&SupplierCommand::UpdateSupplier(update))
            .unwrap();
        supplier.apply(&events[0]);

        assert_eq!(supplier.name(), "United Drug House Co.");
        assert_eq!(supplier.short(), "ACD");
        assert_eq!(supplier.payment_period_months(), 2);
        assert!(supplier.contact().is_some());
    }

    #[test]
    fn version_increments_on_apply() {
        let pharmacy_id = test_pharmacy_id();
        let supplier_id = test_supplier_id();
        let mut supplier = registered_supplier(pharmacy_id, supplier_id);
        assert_eq!(supplier.version(), 1);

        let cmd = AdjustDebit {
            pharmacy_id,
            supplier_id,
            delta: 100.0,
            reason: "Invoice".to_string(),
            occurred_at: test_time(),
        };
        let events = supplier.handle(&SupplierCommand::AdjustDebit(cmd)).unwrap();
        supplier.apply(&events[0]);
        assert_eq!(supplier.version(), 2);
    }
}
