//! Parties: the customers a pharmacy sells to and the suppliers it buys from.
//!
//! The two are modeled as separate aggregates — their shapes barely overlap
//! (loyalty points and credit limits on one side, debit settlement and
//! payment periods on the other).

pub mod customer;
pub mod supplier;

pub use customer::{
    AdjustBalance, Customer, CustomerBalanceAdjusted, CustomerCommand, CustomerEvent, CustomerId,
    CustomerKind, CustomerRegistered, CustomerTerms, CustomerUpdated, Loyalty, RegisterCustomer,
    UpdateCustomer,
};
pub use supplier::{
    AdjustDebit, DebitStatus, RegisterSupplier, Supplier, SupplierCommand, SupplierContact,
    SupplierDebitAdjusted, SupplierEvent, SupplierId, SupplierKind, SupplierRegistered,
    SupplierUpdated, UpdateSupplier,
};
