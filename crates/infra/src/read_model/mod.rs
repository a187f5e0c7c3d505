//! Pharmacy-isolated read model storage abstractions.

pub mod pharmacy_store;

pub use pharmacy_store::{InMemoryPharmacyStore, PharmacyStore};
