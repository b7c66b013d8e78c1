//! Errors raised by the pure bookkeeping layer.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

/// Rejections decided from the inputs alone.
///
/// Lookups that come back empty and storage failures are reported by the infra layer,
/// which knows which tenant and record were asked for.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Caller input that can never be accepted as given (empty line list, unknown
    /// document type, amount out of range).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The request is well formed but the document's state forbids it, e.g. cancelling a
    /// paid invoice.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The requested change already happened concurrently.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
