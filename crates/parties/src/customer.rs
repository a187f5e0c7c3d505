use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pharma_core::{Aggregate, AggregateId, AggregateRoot, DomainError, PharmacyId};
use pharma_events::Event;

/// Customer identifier (pharmacy-scoped via `pharmacy_id` fields in events/commands).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub AggregateId);

impl CustomerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Customer kind: individual or company account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerKind {
    Individual,
    Company,
}

/// Loyalty program state for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Loyalty {
    pub points_per_currency: f64,
    pub total_points: u64,
    pub pending_points: u64,
}

/// Credit and discount terms for a customer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerTerms {
    /// Cash-only customers never carry a balance.
    pub cash_only: bool,
    pub credit_limit: f64,
    /// Percentage discount on locally-sourced items (0-100).
    pub local_discount: f64,
    /// Percentage discount on imported items (0-100).
    pub import_discount: f64,
}

impl Default for CustomerTerms {
    fn default() -> Self {
        Self {
            cash_only: true,
            credit_limit: 0.0,
            local_discount: 0.0,
            import_discount: 0.0,
        }
    }
}

impl CustomerTerms {
    fn validate(&self) -> Result<(), DomainError> {
        if self.credit_limit < 0.0 {
            return Err(DomainError::validation("credit limit cannot be negative"));
        }
        if !(0.0..=100.0).contains(&self.local_discount)
            || !(0.0..=100.0).contains(&self.import_discount)
        {
            return Err(DomainError::validation("discounts must be between 0 and 100"));
        }
        Ok(())
    }
}

/// Aggregate root: Customer.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    id: CustomerId,
    pharmacy_id: Option<PharmacyId>,
    name: String,
    kind: CustomerKind,
    phone: Option<String>,
    address: Option<String>,
    terms: CustomerTerms,
    /// Outstanding balance owed by the customer. Never negative.
    balance: f64,
    loyalty: Option<Loyalty>,
    last_transaction_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Customer {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: CustomerId) -> Self {
        Self {
            id,
            pharmacy_id: None,
            name: String::new(),
            kind: CustomerKind::Individual,
            phone: None,
            address: None,
            terms: CustomerTerms::default(),
            balance: 0.0,
            loyalty: None,
            last_transaction_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> CustomerId {
        self.id
    }

    pub fn pharmacy_id(&self) -> Option<PharmacyId> {
        self.pharmacy_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CustomerKind {
        self.kind
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn terms(&self) -> CustomerTerms {
        self.terms
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn loyalty(&self) -> Option<Loyalty> {
        self.loyalty
    }

    pub fn last_transaction_at(&self) -> Option<DateTime<Utc>> {
        self.last_transaction_at
    }

    /// Remaining credit headroom for non-cash customers.
    pub fn available_credit(&self) -> f64 {
        if self.terms.cash_only {
            0.0
        } else {
            (self.terms.credit_limit - self.balance).max(0.0)
        }
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterCustomer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterCustomer {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub name: String,
    pub kind: CustomerKind,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: Option<CustomerTerms>,
    pub loyalty: Option<Loyalty>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCustomer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateCustomer {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    /// Optional new name (if None, keep existing).
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Optional new terms (if None, keep existing).
    pub terms: Option<CustomerTerms>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustBalance (positive delta = customer owes more).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustBalance {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub delta: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomerCommand {
    RegisterCustomer(RegisterCustomer),
    UpdateCustomer(UpdateCustomer),
    AdjustBalance(AdjustBalance),
}

/// Event: CustomerRegistered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRegistered {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub name: String,
    pub kind: CustomerKind,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: CustomerTerms,
    pub loyalty: Option<Loyalty>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerUpdated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerUpdated {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub terms: CustomerTerms,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CustomerBalanceAdjusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerBalanceAdjusted {
    pub pharmacy_id: PharmacyId,
    pub customer_id: CustomerId,
    pub delta: f64,
    pub new_balance: f64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CustomerEvent {
    CustomerRegistered(CustomerRegistered),
    CustomerUpdated(CustomerUpdated),
    CustomerBalanceAdjusted(CustomerBalanceAdjusted),
}

impl Event for CustomerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CustomerEvent::CustomerRegistered(_) => "parties.customer.registered",
            CustomerEvent::CustomerUpdated(_) => "parties.customer.updated",
            CustomerEvent::CustomerBalanceAdjusted(_) => "parties.customer.balance_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CustomerEvent::CustomerRegistered(e) => e.occurred_at,
            CustomerEvent::CustomerUpdated(e) => e.occurred_at,
            CustomerEvent::CustomerBalanceAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Customer {
    type Command = CustomerCommand;
    type Event = CustomerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CustomerEvent::CustomerRegistered(e) => {
                self.id = e.customer_id;
                self.pharmacy_id = Some(e.pharmacy_id);
                self.name = e.name.clone();
                self.kind = e.kind;
                self.phone = e.phone.clone();
                self.address = e.address.clone();
                self.terms = e.terms;
                self.balance = 0.0;
                self.loyalty = e.loyalty;
                self.created = true;
            }
            CustomerEvent::CustomerUpdated(e) => {
                self.name = e.name.clone();
                self.phone = e.phone.clone();
                self.address = e.address.clone();
                self.terms = e.terms;
            }
            CustomerEvent::CustomerBalanceAdjusted(e) => {
                self.balance = e.new_balance;
                self.last_transaction_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CustomerCommand::RegisterCustomer(cmd) => self.handle_register(cmd),
            CustomerCommand::UpdateCustomer(cmd) => self.handle_update(cmd),
            CustomerCommand::AdjustBalance(cmd) => self.handle_adjust_balance(cmd),
        }
    }
}

impl Customer {
    fn ensure_pharmacy(&self, pharmacy_id: PharmacyId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.pharmacy_id != Some(pharmacy_id) {
            return Err(DomainError::invariant("pharmacy mismatch"));
        }
        Ok(())
    }

    fn ensure_customer_id(&self, customer_id: CustomerId) -> Result<(), DomainError> {
        if self.id != customer_id {
            return Err(DomainError::invariant("customer_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("customer already exists"));
        }

        if cmd.name.trim().chars().count() < 2 {
            return Err(DomainError::validation(
                "name must be at least 2 characters",
            ));
        }
        if let Some(phone) = &cmd.phone {
            if phone.chars().count() < 7 {
                return Err(DomainError::validation("phone number is too short"));
            }
        }

        let terms = cmd.terms.unwrap_or_default();
        terms.validate()?;

        Ok(vec![CustomerEvent::CustomerRegistered(CustomerRegistered {
            pharmacy_id: cmd.pharmacy_id,
            customer_id: cmd.customer_id,
            name: cmd.name.clone(),
            kind: cmd.kind,
            phone: cmd.phone.clone(),
            address: cmd.address.clone(),
            terms,
            loyalty: cmd.loyalty,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCustomer) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        let new_name = cmd.name.clone().unwrap_or_else(|| self.name.clone());
        if new_name.trim().chars().count() < 2 {
            return Err(DomainError::validation(
                "name must be at least 2 characters",
            ));
        }

        let new_terms = cmd.terms.unwrap_or(self.terms);
        new_terms.validate()?;

        // Cannot switch a customer to cash-only while they still owe money.
        if new_terms.cash_only && self.balance > 0.0 {
            return Err(DomainError::invariant(
                "cannot make customer cash-only while balance is outstanding",
            ));
        }

        Ok(vec![CustomerEvent::CustomerUpdated(CustomerUpdated {
            pharmacy_id: cmd.pharmacy_id,
            customer_id: cmd.customer_id,
            name: new_name,
            phone: cmd.phone.clone().or_else(|| self.phone.clone()),
            address: cmd.address.clone().or_else(|| self.address.clone()),
            terms: new_terms,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust_balance(
        &self,
        cmd: &AdjustBalance,
    ) -> Result<Vec<CustomerEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_pharmacy(cmd.pharmacy_id)?;
        self.ensure_customer_id(cmd.customer_id)?;

        if !cmd.delta.is_finite() || cmd.delta == 0.0 {
            return Err(DomainError::validation("delta must be a non-zero number"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }

        if self.terms.cash_only && cmd.delta > 0.0 {
            return Err(DomainError::invariant(
                "cash-only customers cannot carry a balance",
            ));
        }

        let new_balance = self.balance + cmd.delta;
        if new_balance < 0.0 {
            return Err(DomainError::invariant("balance cannot go negative"));
        }
        if !self.terms.cash_only && new_balance > self.terms.credit_limit {
            return Err(DomainError::invariant("balance would exceed credit limit"));
        }

        Ok(vec![CustomerEvent::CustomerBalanceAdjusted(
            CustomerBalanceAdjusted {
                pharmacy_id: cmd.pharmacy_id,
                customer_id: cmd.customer_id,
                delta: cmd.delta,
                new_balance,
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

    fn test_customer_id() -> CustomerId {
        CustomerId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn credit_terms(limit: f64) -> CustomerTerms {
        CustomerTerms {
            cash_only: false,
            credit_limit: limit,
            local_discount: 5.0,
            import_discount: 2.0,
        }
    }

    fn registered_customer(
        pharmacy_id: PharmacyId,
        customer_id: CustomerId,
        terms: CustomerTerms,
    ) -> Customer {
        let mut customer = Customer::empty(customer_id);
        let cmd = RegisterCustomer {
            pharmacy_id,
            customer_id,
            name: "Ahmed Ali".to_string(),
            kind: CustomerKind::Individual,
            phone: Some("+201001234567".to_string()),
            address: None,
            terms: Some(terms),
            loyalty: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        customer.apply(&events[0]);
        customer
    }

    #[test]
    fn register_customer_emits_customer_registered_event() {
        let customer = Customer::empty(test_customer_id());
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();

        let cmd = RegisterCustomer {
            pharmacy_id,
            customer_id,
            name: "Ahmed Ali".to_string(),
            kind: CustomerKind::Company,
            phone: None,
            address: Some("12 Tahrir St".to_string()),
            terms: None,
            loyalty: Some(Loyalty {
                points_per_currency: 0.5,
                total_points: 0,
                pending_points: 0,
            }),
            occurred_at: test_time(),
        };

        let events = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            CustomerEvent::CustomerRegistered(e) => {
                assert_eq!(e.pharmacy_id, pharmacy_id);
                assert_eq!(e.customer_id, customer_id);
                assert_eq!(e.kind, CustomerKind::Company);
                // Default terms are cash-only.
                assert!(e.terms.cash_only);
                assert!(e.loyalty.is_some());
            }
            _ => panic!("Expected CustomerRegistered event"),
        }
    }

    #[test]
    fn register_customer_rejects_short_name() {
        let customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            pharmacy_id: test_pharmacy_id(),
            customer_id: test_customer_id(),
            name: "A".to_string(),
            kind: CustomerKind::Individual,
            phone: None,
            address: None,
            terms: None,
            loyalty: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(_) => {}
            _ => panic!("Expected Validation error for short name"),
        }
    }

    #[test]
    fn register_customer_rejects_short_phone() {
        let customer = Customer::empty(test_customer_id());
        let cmd = RegisterCustomer {
            pharmacy_id: test_pharmacy_id(),
            customer_id: test_customer_id(),
            name: "Ahmed Ali".to_string(),
            kind: CustomerKind::Individual,
            phone: Some("12345".to_string()),
            address: None,
            terms: None,
            loyalty: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("phone") => {}
            _ => panic!("Expected Validation error for short phone"),
        }
    }

    #[test]
    fn register_customer_rejects_out_of_range_discounts() {
        let customer = Customer::empty(test_customer_id());
        let mut terms = credit_terms(1000.0);
        terms.local_discount = 120.0;
        let cmd = RegisterCustomer {
            pharmacy_id: test_pharmacy_id(),
            customer_id: test_customer_id(),
            name: "Ahmed Ali".to_string(),
            kind: CustomerKind::Individual,
            phone: None,
            address: None,
            terms: Some(terms),
            loyalty: None,
            occurred_at: test_time(),
        };

        let err = customer
            .handle(&CustomerCommand::RegisterCustomer(cmd))
            .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("0 and 100") => {}
            _ => panic!("Expected Validation error for discount out of range"),
        }
    }

    #[test]
    fn adjust_balance_tracks_new_balance() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(pharmacy_id, customer_id, credit_terms(1000.0));

        let cmd = AdjustBalance {
            pharmacy_id,
            customer_id,
            delta: 250.0,
            reason: "Credit sale".to_string(),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::AdjustBalance(cmd))
            .unwrap();
        match &events[0] {
            CustomerEvent::CustomerBalanceAdjusted(e) => {
                assert_eq!(e.delta, 250.0);
                assert_eq!(e.new_balance, 250.0);
            }
            _ => panic!("Expected CustomerBalanceAdjusted event"),
        }
        customer.apply(&events[0]);
        assert_eq!(customer.balance(), 250.0);
        assert_eq!(customer.available_credit(), 750.0);
        assert!(customer.last_transaction_at().is_some());
    }

    #[test]
    fn adjust_balance_rejects_exceeding_credit_limit() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(pharmacy_id, customer_id, credit_terms(100.0));

        let cmd = AdjustBalance {
            pharmacy_id,
            customer_id,
            delta: 100.01,
            reason: "Credit sale".to_string(),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::AdjustBalance(cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("credit limit") => {}
            _ => panic!("Expected InvariantViolation for exceeding credit limit"),
        }
    }

    #[test]
    fn cash_only_customers_cannot_carry_balance() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(pharmacy_id, customer_id, CustomerTerms::default());

        let cmd = AdjustBalance {
            pharmacy_id,
            customer_id,
            delta: 10.0,
            reason: "Credit sale".to_string(),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::AdjustBalance(cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("cash-only") => {}
            _ => panic!("Expected InvariantViolation for cash-only balance"),
        }
    }

    #[test]
    fn balance_cannot_go_negative() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let customer = registered_customer(pharmacy_id, customer_id, credit_terms(1000.0));

        let cmd = AdjustBalance {
            pharmacy_id,
            customer_id,
            delta: -0.01,
            reason: "Repayment".to_string(),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::AdjustBalance(cmd))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("negative") => {}
            _ => panic!("Expected InvariantViolation for negative balance"),
        }
    }

    #[test]
    fn cannot_switch_to_cash_only_with_outstanding_balance() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(pharmacy_id, customer_id, credit_terms(1000.0));

        let adjust = AdjustBalance {
            pharmacy_id,
            customer_id,
            delta: 50.0,
            reason: "Credit sale".to_string(),
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::AdjustBalance(adjust))
            .unwrap();
        customer.apply(&events[0]);

        let update = UpdateCustomer {
            pharmacy_id,
            customer_id,
            name: None,
            phone: None,
            address: None,
            terms: Some(CustomerTerms::default()),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::UpdateCustomer(update))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("cash-only") => {}
            _ => panic!("Expected InvariantViolation for cash-only switch"),
        }
    }

    #[test]
    fn update_keeps_existing_fields_when_none() {
        let pharmacy_id = test_pharmacy_id();
        let customer_id = test_customer_id();
        let mut customer = registered_customer(pharmacy_id, customer_id, credit_terms(1000.0));

        let update = UpdateCustomer {
            pharmacy_id,
            customer_id,
            name: Some("Ahmed M. Ali".to_string()),
            phone: None,
            address: None,
            terms: None,
            occurred_at: test_time(),
        };
        let events = customer
            .handle(&CustomerCommand::UpdateCustomer(update))
            .unwrap();
        customer.apply(&events[0]);

        assert_eq!(customer.name(), "Ahmed M. Ali");
        assert_eq!(customer.phone(), Some("+201001234567"));
        assert!(!customer.terms().cash_only);
    }

    #[test]
    fn adjust_balance_on_unknown_customer_is_not_found() {
        let customer = Customer::empty(test_customer_id());
        let cmd = AdjustBalance {
            pharmacy_id: test_pharmacy_id(),
            customer_id: test_customer_id(),
            delta: 10.0,
            reason: "Credit sale".to_string(),
            occurred_at: test_time(),
        };
        let err = customer
            .handle(&CustomerCommand::AdjustBalance(cmd))
            .unwrap_err();
        match err {
            DomainError::NotFound => {}
            _ => panic!("Expected NotFound for unknown customer"),
        }
    }
}
