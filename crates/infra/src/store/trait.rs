use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use compta_core::{DocumentId, TenantId};
use compta_invoicing::{Document, DocumentStatus, DocumentType, NumberingScope, ScopeKey, SequenceCounter};

/// Persistence error shared by the counter store and the document repository.
///
/// These are **infrastructure errors** (transactions, storage) as opposed to domain
/// errors (validation, invariants).
///
/// ## Error Categories
///
/// - **Conflict**: the transaction lost a race (serialization failure, deadlock); retrying
///   the whole unit of work is safe
/// - **DuplicateNumber**: a document with the same full number already exists in scope
/// - **NotFound**: the addressed record does not exist (for this tenant)
/// - **Storage**: anything else (connection, decoding, poisoned lock); not retried
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transaction conflict: {0}")]
    Conflict(String),

    #[error("duplicate document number: {0}")]
    DuplicateNumber(String),

    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Whether re-running the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

/// Transactional access to the sequence counters, one per (scope key, year).
///
/// The counter row is the only shared mutable state of numbering. It is mutated
/// exclusively through a [`CounterTx`] obtained from [`CounterStore::begin`]; nothing else
/// in the workspace writes to it.
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - serialize transactions on the **same** scope key and year (a second `begin` either
///   waits or its commit fails with `StoreError::Conflict`)
/// - keep each year's counter separate, so an allocation for one year never changes
///   another year's counter
/// - never make transactions on different counters contend
/// - apply nothing unless `commit` succeeds (dropping a transaction rolls it back)
#[async_trait]
pub trait CounterStore: Send + Sync {
    type Tx: CounterTx;

    /// Open a transaction on the counter row of `(scope.key(), scope.year)`.
    async fn begin(&self, scope: &NumberingScope) -> Result<Self::Tx, StoreError>;

    /// Committed counter state (inspection only; never use this to derive a number).
    async fn counter(&self, scope: &NumberingScope) -> Result<Option<SequenceCounter>, StoreError>;
}

/// One open counter transaction, bound to the scope it was opened for.
#[async_trait]
pub trait CounterTx: Send + Sized + 'static {
    /// Advance the counter for the transaction's year and return the new state.
    ///
    /// A missing row yields `last_number = 1`.
    async fn read_and_increment(&mut self) -> Result<SequenceCounter, StoreError>;

    /// Highest sequential number held by an issued document of the same scope and year.
    async fn highest_issued(&mut self) -> Result<Option<u64>, StoreError>;

    /// Overwrite `last_number` (used when the counter lags behind issued documents).
    async fn set_last_number(&mut self, last_number: u64) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// Listing filter for documents of one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub document_type: Option<DocumentType>,
    pub status: Option<DocumentStatus>,
    pub limit: usize,
}

impl DocumentFilter {
    pub const DEFAULT_LIMIT: usize = 50;
    pub const MAX_LIMIT: usize = 100;

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.clamp(1, Self::MAX_LIMIT);
        self
    }
}

impl Default for DocumentFilter {
    fn default() -> Self {
        Self {
            document_type: None,
            status: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// Tenant-scoped storage of issued documents.
///
/// Every read and write takes the tenant explicitly; a document of another tenant is
/// reported as not found. Documents are never deleted.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Persist a newly issued document under the numbering key it was allocated from.
    ///
    /// Fails with `StoreError::DuplicateNumber` if `key` already holds its full number.
    async fn insert(&self, key: &ScopeKey, document: &Document) -> Result<(), StoreError>;

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Option<Document>, StoreError>;

    /// Newest first.
    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError>;

    /// Move a document from `from` to `to`; `StoreError::Conflict` if it is no longer in `from`.
    async fn update_status(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    type Tx = S::Tx;

    async fn begin(&self, scope: &NumberingScope) -> Result<Self::Tx, StoreError> {
        (**self).begin(scope).await
    }

    async fn counter(&self, scope: &NumberingScope) -> Result<Option<SequenceCounter>, StoreError> {
        (**self).counter(scope).await
    }
}

#[async_trait]
impl<R> DocumentRepository for Arc<R>
where
    R: DocumentRepository + ?Sized,
{
    async fn insert(&self, key: &ScopeKey, document: &Document) -> Result<(), StoreError> {
        (**self).insert(key, document).await
    }

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Option<Document>, StoreError> {
        (**self).get(tenant_id, id).await
    }

    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        (**self).list(tenant_id, filter).await
    }

    async fn update_status(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<(), StoreError> {
        (**self).update_status(tenant_id, id, from, to).await
    }
}
