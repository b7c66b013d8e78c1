//! Document issuing workflow: validate, compute amounts, allocate a number, attach a
//! payment link, store.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use compta_core::{ClientId, DocumentId, DomainError, TenantId};
use compta_invoicing::{
    AmountBreakdown, Document, DocumentNumber, DocumentStatus, DocumentType, LineInput, NewDocument, compute_breakdown,
};

use crate::config::NumberingTenancy;
use crate::numbering::{AllocationError, RetryPolicy, SequenceAllocator};
use crate::payment_link::{NoPaymentLinks, PaymentLinkProvider};
use crate::store::{CounterStore, DocumentFilter, DocumentRepository, StoreError};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("document not found")]
    NotFound,
}

/// Request to issue a new document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub document_type: DocumentType,
    pub lines: Vec<LineInput>,
    pub discount: Decimal,
    /// Falls back to the configured default rate.
    pub vat_rate: Option<Decimal>,
}

#[derive(Clone)]
pub struct DocumentService<S> {
    store: S,
    allocator: SequenceAllocator<S>,
    payments: Arc<dyn PaymentLinkProvider>,
    tenancy: NumberingTenancy,
    default_vat_rate: Decimal,
}

impl<S> std::fmt::Debug for DocumentService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentService")
            .field("tenancy", &self.tenancy)
            .field("default_vat_rate", &self.default_vat_rate)
            .finish_non_exhaustive()
    }
}

impl<S> DocumentService<S>
where
    S: CounterStore + DocumentRepository + Clone,
{
    pub fn new(store: S, policy: RetryPolicy, tenancy: NumberingTenancy, default_vat_rate: Decimal) -> Self {
        Self {
            allocator: SequenceAllocator::new(store.clone(), policy),
            store,
            payments: Arc::new(NoPaymentLinks),
            tenancy,
            default_vat_rate,
        }
    }

    pub fn with_payment_links(mut self, payments: Arc<dyn PaymentLinkProvider>) -> Self {
        self.payments = payments;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tenancy(&self) -> NumberingTenancy {
        self.tenancy
    }

    pub fn default_vat_rate(&self) -> Decimal {
        self.default_vat_rate
    }

    /// Amounts for a draft, using the default VAT rate when none is given.
    pub fn breakdown(&self, subtotal: Decimal, discount: Decimal, vat_rate: Option<Decimal>) -> AmountBreakdown {
        compute_breakdown(subtotal, discount, vat_rate.unwrap_or(self.default_vat_rate))
    }

    /// Draw the next number for a type and year without issuing a document.
    pub async fn allocate_number(
        &self,
        tenant_id: TenantId,
        document_type: DocumentType,
        year: i32,
    ) -> Result<DocumentNumber, DocumentError> {
        let scope = self.tenancy.scope(tenant_id, document_type, year);
        Ok(self.allocator.allocate(scope).await?)
    }

    pub async fn create_document(&self, cmd: CreateDocument) -> Result<Document, DocumentError> {
        self.create_document_at(cmd, Utc::now()).await
    }

    /// Issue a document dated `issued_at`; its year selects the numbering sequence.
    #[instrument(
        skip(self, cmd),
        fields(tenant_id = %cmd.tenant_id, document_type = %cmd.document_type, full_number = tracing::field::Empty),
        err
    )]
    pub async fn create_document_at(&self, cmd: CreateDocument, issued_at: DateTime<Utc>) -> Result<Document, DocumentError> {
        let draft = NewDocument::prepare(
            cmd.tenant_id,
            cmd.client_id,
            cmd.document_type,
            cmd.lines,
            cmd.discount,
            cmd.vat_rate.unwrap_or(self.default_vat_rate),
        )?;

        let scope = self.tenancy.scope(cmd.tenant_id, cmd.document_type, issued_at.year());
        let number = self.allocator.allocate(scope).await?;
        tracing::Span::current().record("full_number", tracing::field::display(&number));

        let payment_link = if cmd.document_type.accepts_payment() {
            match self.payments.create_link(&number, draft.breakdown.gross_cents()).await {
                Ok(link) => link,
                Err(err) => {
                    tracing::error!(full_number = %number, error = %err, "payment link creation failed");
                    None
                }
            }
        } else {
            None
        };

        let document = draft.issue(DocumentId::new(), number, payment_link, issued_at)?;

        if let Err(err) = self.store.insert(&scope.key(), &document).await {
            tracing::error!(full_number = %document.number, error = %err, "document not stored, number is lost");
            return Err(err.into());
        }

        tracing::info!(document_id = %document.id, gross = %document.breakdown.gross_amount, "document issued");
        Ok(document)
    }

    pub async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        self.store.get(tenant_id, id).await?.ok_or(DocumentError::NotFound)
    }

    pub async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, DocumentError> {
        Ok(self.store.list(tenant_id, filter).await?)
    }

    pub async fn mark_paid(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        self.change_status(tenant_id, id, DocumentStatus::Paid).await
    }

    pub async fn cancel(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        self.change_status(tenant_id, id, DocumentStatus::Cancelled).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %id, to = to.as_str()), err)]
    async fn change_status(&self, tenant_id: TenantId, id: DocumentId, to: DocumentStatus) -> Result<Document, DocumentError> {
        let mut document = self.get(tenant_id, id).await?;
        let from = document.status;
        document.transition(to)?;

        match self.store.update_status(tenant_id, id, from, to).await {
            Ok(()) => Ok(document),
            Err(StoreError::NotFound) => Err(DocumentError::NotFound),
            // Someone else moved it between our read and write.
            Err(StoreError::Conflict(msg)) => Err(DomainError::conflict(msg).into()),
            Err(err) => Err(err.into()),
        }
    }
}
