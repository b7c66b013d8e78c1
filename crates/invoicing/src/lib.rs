//! Invoicing domain module.
//!
//! This crate contains the business rules for billing documents: document types,
//! year-scoped numbering, the VAT/discount calculator and the issued-document lifecycle.
//! Everything here is deterministic domain logic (no IO, no HTTP, no storage); the
//! transactional side of numbering lives in `compta-infra`.

pub mod amount;
pub mod document;
pub mod document_type;
pub mod line;
pub mod numbering;

pub use amount::{AmountBreakdown, DEFAULT_VAT_RATE, compute_breakdown, round2};
pub use document::{Document, DocumentStatus, NewDocument};
pub use document_type::DocumentType;
pub use line::{LineInput, LineItem, subtotal};
pub use numbering::{DocumentNumber, NumberingScope, ScopeKey, SequenceCounter, Tenancy};
