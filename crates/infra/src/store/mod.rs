//! Persistence boundary for numbering and issued documents.
//!
//! Two capabilities live here: the transactional sequence counter ([`CounterStore`]) and
//! tenant-scoped document storage ([`DocumentRepository`]). Both backends implement both,
//! because the self-healing check of the allocator reads the documents inside the
//! counter transaction.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryCounterTx, InMemoryStore};
#[cfg(feature = "postgres")]
pub use postgres::{PostgresCounterTx, PostgresStore};
pub use r#trait::{CounterStore, CounterTx, DocumentFilter, DocumentRepository, StoreError};
