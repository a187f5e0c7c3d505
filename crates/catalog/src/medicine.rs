use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pharma_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharma_events::Event;

/// Medicine identifier (pharmacy-scoped via `pharmacy_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicineId(pub AggregateId);

impl MedicineId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MedicineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Medicine status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MedicineStatus {
    Active,
    Discontinued,
}

/// Default pricing hints used to prefill purchase lines.
///
/// These are hints, not authority: the purchase line snapshots its own
/// prices at entry time, so later catalog edits never rewrite history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MedicinePricing {
    pub sale_price: f64,
    pub cost: f64,
}

impl Default for MedicinePricing {
    fn default() -> Self {
        Self {
            sale_price: 0.0,
            cost: 0.0,
        }
    }
}

/// Aggregate root: Medicine.
#[derive(Debug, Clone, PartialEq)]
pub struct Medicine {
    id: MedicineId,
    pharmacy_id: Option<PharmacyId>,
    code: String,
    name: String,
    /// Package description shown in the UI (e.g. "box", "strip").
    unit: String,
    units_per_package: u32,
    expirable: bool,
    pricing: MedicinePricing,
    status: MedicineStatus,
    version: u64,
    created: bool,
}

impl Medicine {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: MedicineId) -> Self {
        Self {
            id,
            pharmacy_id: None,
            code: String::new(),
            name: String::new(),
            unit: String::new(),
            units_per_package: 1,
            expirable: false,
            pricing: MedicinePricing::default(),
            status: MedicineStatus::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> MedicineId {
        self.id
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn units_per_package(&self) -> u32 {
        self.units_per_package
    }

    pub fn expirable(&self) -> bool {
        self.expirable
    }

    pub fn pricing(&self) -> MedicinePricing {
        self.pricing
    }

    pub fn status(&self) -> MedicineStatus {
        self.status
    }

    /// Invariant helper: discontinued medicines cannot appear on new purchase lines.
    pub fn can_be_purchased(&self) -> bool {
        self.status == MedicineStatus::Active
    }
}

impl AggregateRoot for Medicine {
    type Id = MedicineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterMedicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMedicine {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub units_per_package: u32,
    pub expirable: bool,
    pub pricing: Option<MedicinePricing>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateMedicine (name and pricing hints only; code is stable).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateMedicine {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    /// Optional new pricing hints (if None, keep existing).
    pub pricing: Option<MedicinePricing>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DiscontinueMedicine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscontinueMedicine {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MedicineCommand {
    RegisterMedicine(RegisterMedicine),
    UpdateMedicine(UpdateMedicine),
    DiscontinueMedicine(DiscontinueMedicine),
}

/// Event: MedicineRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineRegistered {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub units_per_package: u32,
    pub expirable: bool,
    pub pricing: MedicinePricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MedicineUpdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineUpdated {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    pub name: String,
    pub pricing: MedicinePricing,
    pub occurred_at: DateTime<Utc>,
}

/// Event: MedicineDiscontinued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicineDiscontinued {
    pub pharmacy_id: PharmacyId,
    pub medicine_id: MedicineId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MedicineEvent {
    MedicineRegistered(MedicineRegistered),
    MedicineUpdated(MedicineUpdated),
    MedicineDiscontinued(MedicineDiscontinued),
}

impl Event for MedicineEvent {
    fn event_type(&self) -> &'static str {
        match self {
            MedicineEvent::MedicineRegistered(_) => "catalog.medicine.registered",
            MedicineEvent::MedicineUpdated(_) => "catalog.medicine.updated",
            MedicineEvent::MedicineDiscontinued(_) => "catalog.medicine.discontinued",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            MedicineEvent::MedicineRegistered(e) => e.occurred_at,
            MedicineEvent::MedicineUpdated(e) => e.occurred_at,
            MedicineEvent::MedicineDiscontinued(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Medicine {
    type Command = MedicineCommand;
    type Event = MedicineEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MedicineEvent::MedicineRegistered(e) => {
                self.id = e.medicine_id;
                self.pharmacy_id = Some(e.pharmacy_id);
                self.code = e.code.clone();
                self.name = e.name.clone();
                self.unit = e.unit.clone();
                self.units_per_package = e.units_per_package;
                self.expirable = e.expirable;
                self.pricing = e.pricing;
                self.status = MedicineStatus::Active;
                self.created = true;
            }
            MedicineEvent::MedicineUpdated(e) => {
                self.name = e.name.clone();
                self.pricing = e.pricing;
            }
            MedicineEvent::MedicineDiscontinued(_) => {
                self.status = MedicineStatus::Discontinued;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MedicineCommand::RegisterMedicine(cmd) => self.handle_register(cmd),
            MedicineCommand::UpdateMedicine(cmd) => self.handle_update(cmd),
            MedicineCommand::DiscontinueMedicine(cmd) => self.handle_discontinue(cmd),
        }
    }
}

impl Medicine {
    fn ensure_pharmacy(&self, pharmacy_id: PharmacyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.pharmacy_id != Some(pharmacy_id) {
            return Err(DomainError::invariant("pharmacy mismatch"));
        }
        Ok(())
    }

    fn ensure_medicine_id(&self, medicine_id: MedicineId) -> Result<(), DomainError> {
        if self.id != medicine_id {
            return Err(DomainError::invariant("medicine_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterMedicine) -> Result<Vec<MedicineEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("medicine already exists"));
        }

        if cmd.code.trim().is_empty() {
            return Err(DomainError::validation("code cannot be empty"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if cmd.units_per_package == 0 {
            return Err(DomainError::validation("units_per_package must be at least 1"));
        }

        let pricing = cmd.pricing.unwrap_or_default();
        if pricing.sale_price < 0.0 || pricing.cost < 0.0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }

        // Note: code uniqueness per pharmacy is enforced by the catalog read
        // model before dispatch; the aggregate can only require a non-empty code.

        Ok(vec![MedicineEvent::MedicineRegistered(MedicineRegistered {
            pharmacy_id: cmd.pharmacy_id,
            medicine_id: cmd.medicine_id,
            code: cmd.code.clone(),
            name: cmd.name.clone(),
            unit: cmd.unit.clone(),
            units_per_package: cmd.units_per_package,
            expirable: cmd.expirable,
            pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateMedicine) -> Result<Vec<MedicineEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_medicine_id(cmd.medicine_id)?;

        if self.status == MedicineStatus::Discontinued {
            return Err(DomainError::invariant(
                "discontinued medicines cannot be updated",
            ));
        }

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        let new_pricing = cmd.pricing.unwrap_or(self.pricing);
        if new_pricing.sale_price < 0.0 || new_pricing.cost < 0.0 {
            return Err(DomainError::validation("prices cannot be negative"));
        }

        Ok(vec![MedicineEvent::MedicineUpdated(MedicineUpdated {
            pharmacy_id: cmd.pharmacy_id,
            medicine_id: cmd.medicine_id,
            name: new_name,
            pricing: new_pricing,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_discontinue(
        &self,
        cmd: &DiscontinueMedicine,
    ) -> Result<Vec<MedicineEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_medicine_id(cmd.medicine_id)?;

        if self.status == MedicineStatus::Discontinued {
            return Err(DomainError::conflict("medicine is already discontinued"));
        }

        Ok(vec![MedicineEvent::MedicineDiscontinued(
            MedicineDiscontinued {
                pharmacy_id: cmd.pharmacy_id,
                medicine_id: cmd.medicine_id,
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

    fn test_medicine_id() -> MedicineId {
        MedicineId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn register_cmd(pharmacy_id: PharmacyId, medicine_id: MedicineId) -> RegisterMedicine {
        RegisterMedicine {
            pharmacy_id,
            medicine_id,
            code: "MED001".to_string(),
            name: "Panadol Extra".to_string(),
            unit: "box".to_string(),
            units_per_package: 24,
            expirable: true,
            pricing: Some(MedicinePricing {
                sale_price: 45.5,
                cost: 35.2,
            }),
            occurred_at: test_time(),
        }
    }

    #[test]
    fn register_medicine_emits_medicine_registered_event() {
        let medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let cmd = register_cmd(pharmacy_id, medicine_id);
        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            MedicineEvent::MedicineRegistered(e) => {
                assert_eq!(e.pharmacy_id, pharmacy_id);
                assert_eq!(e.medicine_id, medicine_id);
                assert_eq!(e.code, "MED001");
                assert_eq!(e.name, "Panadol Extra");
                assert_eq!(e.units_per_package, 24);
                assert!(e.expirable);
            }
            _ => panic!("Expected MedicineRegistered event"),
        }
    }

    #[test]
    fn register_medicine_rejects_empty_code() {
        let medicine = Medicine::empty(test_medicine_id());
        let mut cmd = register_cmd(test_pharmacy_id(), test_medicine_id());
        cmd.code = "   ".to_string();

        let err = medicine
            .handle(&MedicineCommand::RegisterMedicine(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for empty code"),
        }
    }

    #[test]
    fn register_medicine_rejects_zero_units_per_package() {
        let medicine = Medicine::empty(test_medicine_id());
        let mut cmd = register_cmd(test_pharmacy_id(), test_medicine_id());
        cmd.units_per_package = 0;

        let err = medicine
            .handle(&MedicineCommand::RegisterMedicine(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for zero units_per_package"),
        }
    }

    #[test]
    fn register_medicine_rejects_duplicate_creation() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let cmd = register_cmd(test_pharmacy_id(), test_medicine_id());

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(cmd.clone()))
            .unwrap();
        medicine.apply(&events[0]);

        let err = medicine
            .handle(&MedicineCommand::RegisterMedicine(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for duplicate creation"),
        }
    }

    #[test]
    fn update_medicine_changes_name_and_pricing() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);

        let update_cmd = UpdateMedicine {
            pharmacy_id,
            medicine_id,
            name: Some("Panadol Advance".to_string()),
            pricing: Some(MedicinePricing {
                sale_price: 48.0,
                cost: 36.0,
            }),
            occurred_at: test_time(),
        };
        let events = medicine
            .handle(&MedicineCommand::UpdateMedicine(update_cmd))
            .unwrap();
        medicine.apply(&events[0]);

        assert_eq!(medicine.name(), "Panadol Advance");
        assert_eq!(medicine.pricing().sale_price, 48.0);
        // Code is stable across updates.
        assert_eq!(medicine.code(), "MED001");
    }

    #[test]
    fn discontinue_medicine_prevents_purchasing() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);
        assert!(medicine.can_be_purchased());

        let cmd = DiscontinueMedicine {
            pharmacy_id,
            medicine_id,
            reason: Some("Recalled by manufacturer".to_string()),
            occurred_at: test_time(),
        };
        let events = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd))
            .unwrap();
        medicine.apply(&events[0]);

        assert_eq!(medicine.status(), MedicineStatus::Discontinued);
        assert!(!medicine.can_be_purchased());
    }

    #[test]
    fn discontinue_medicine_rejects_already_discontinued() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);

        let cmd = DiscontinueMedicine {
            pharmacy_id,
            medicine_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd.clone()))
            .unwrap();
        medicine.apply(&events[0]);

        let err = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd))
            .unwrap_err();
        match err {
            DomainError::Conflict(_) => {}
            _ => panic!("Expected Conflict error for already discontinued medicine"),
        }
    }

    #[test]
    fn update_rejects_discontinued_medicine() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);

        let cmd = DiscontinueMedicine {
            pharmacy_id,
            medicine_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd))
            .unwrap();
        medicine.apply(&events[0]);

        let update_cmd = UpdateMedicine {
            pharmacy_id,
            medicine_id,
            name: Some("New Name".to_string()),
            pricing: None,
            occurred_at: test_time(),
        };
        let err = medicine
            .handle(&MedicineCommand::UpdateMedicine(update_cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected InvariantViolation for updating discontinued medicine"),
        }
    }

    #[test]
    fn update_rejects_wrong_pharmacy() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);

        let update_cmd = UpdateMedicine {
            pharmacy_id: test_pharmacy_id(),
            medicine_id,
            name: Some("New Name".to_string()),
            pricing: None,
            occurred_at: test_time(),
        };
        let err = medicine
            .handle(&MedicineCommand::UpdateMedicine(update_cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("pharmacy mismatch") => {}
            _ => panic!("Expected InvariantViolation for pharmacy mismatch"),
        }
    }

    #[test]
    fn version_increments_on_apply() {
        let mut medicine = Medicine::empty(test_medicine_id());
        assert_eq!(medicine.version(), 0);

        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);
        assert_eq!(medicine.version(), 1);

        let cmd = DiscontinueMedicine {
            pharmacy_id,
            medicine_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd))
            .unwrap();
        medicine.apply(&events[0]);
        assert_eq!(medicine.version(), 2);
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let mut medicine = Medicine::empty(test_medicine_id());
        let pharmacy_id = test_pharmacy_id();
        let medicine_id = test_medicine_id();

        let events = medicine
            .handle(&MedicineCommand::RegisterMedicine(register_cmd(
                pharmacy_id,
                medicine_id,
            )))
            .unwrap();
        medicine.apply(&events[0]);
        let before = medicine.clone();

        let cmd = DiscontinueMedicine {
            pharmacy_id,
            medicine_id,
            reason: None,
            occurred_at: test_time(),
        };
        let events1 = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd.clone()))
            .unwrap();
        let events2 = medicine
            .handle(&MedicineCommand::DiscontinueMedicine(cmd))
            .unwrap();

        assert_eq!(medicine, before);
        assert_eq!(events1, events2);
    }
}
