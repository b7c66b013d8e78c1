//! Infrastructure layer: counter and document storage, number allocation, the document
//! issuing workflow and process configuration.
//!
//! The Postgres backend is behind the `postgres` feature; without it only the in-memory
//! store is compiled.

pub mod config;
pub mod documents;
pub mod numbering;
pub mod payment_link;
pub mod store;

pub use config::{ComptaConfig, ConfigError, NumberingTenancy};
pub use documents::{CreateDocument, DocumentError, DocumentService};
pub use numbering::{AllocationError, RetryPolicy, SequenceAllocator};
pub use payment_link::{NoPaymentLinks, PaymentLinkError, PaymentLinkProvider};
