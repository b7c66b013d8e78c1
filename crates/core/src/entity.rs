//! Entities are identified by an id that survives every change of their attributes.
//!
//! An issued document keeps its `DocumentId` when it is paid or cancelled, while its
//! number, lines and amounts never change after issue.

pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Display + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
