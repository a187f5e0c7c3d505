//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// value objects with the same values are the same value. An invoice's
/// totals record is a value object; the invoice itself is an entity.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
