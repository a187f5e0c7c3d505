//! Medicine catalog: the products a pharmacy stocks and resells.

pub mod medicine;

pub use medicine::{
    DiscontinueMedicine, Medicine, MedicineCommand, MedicineDiscontinued, MedicineEvent,
    MedicineId, MedicinePricing, MedicineRegistered, MedicineStatus, MedicineUpdated,
    RegisterMedicine, UpdateMedicine,
};
