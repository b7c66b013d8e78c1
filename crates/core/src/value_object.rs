//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**. They are defined entirely by their attribute
//! values, so two value objects with the same values are equal. In this workspace the
//! document number and the amount breakdown are value objects: an invoice is identified
//! by its `DocumentId`, while `FA-2026-0001` is just a value it carries.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one, build a
/// new one.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct Money {
///     cents: i64,
/// }
///
/// impl ValueObject for Money {}
///
/// assert_eq!(Money { cents: 100 }, Money { cents: 100 });
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
