use pharma_core::PharmacyId;

/// Pharmacy context for a request.
///
/// This is immutable and must be present for all domain routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PharmacyContext {
    pharmacy_id: PharmacyId,
}

impl PharmacyContext {
    pub fn new(pharmacy_id: PharmacyId) -> Self {
        Self { pharmacy_id }
    }

    pub fn pharmacy_id(&self) -> PharmacyId {
        self.pharmacy_id
    }
}
