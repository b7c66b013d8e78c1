//! Service wiring: picks the storage backend from configuration and erases the store type
//! behind [`DocumentApi`] so handlers stay non-generic.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;

use compta_core::{DocumentId, TenantId};
use compta_infra::store::{CounterStore, DocumentFilter, DocumentRepository, InMemoryStore, StoreError};
use compta_infra::{ComptaConfig, CreateDocument, DocumentError, DocumentService};
use compta_invoicing::{AmountBreakdown, Document, DocumentNumber, DocumentType};

/// Operations the HTTP layer needs from the document service.
#[async_trait]
pub trait DocumentApi: Send + Sync {
    fn breakdown(&self, subtotal: Decimal, discount: Decimal, vat_rate: Option<Decimal>) -> AmountBreakdown;

    async fn allocate_number(
        &self,
        tenant_id: TenantId,
        document_type: DocumentType,
        year: i32,
    ) -> Result<DocumentNumber, DocumentError>;

    async fn create_document(&self, cmd: CreateDocument) -> Result<Document, DocumentError>;

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError>;

    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, DocumentError>;

    async fn mark_paid(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError>;

    async fn cancel(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError>;
}

#[async_trait]
impl<S> DocumentApi for DocumentService<S>
where
    S: CounterStore + DocumentRepository + Clone + 'static,
{
    fn breakdown(&self, subtotal: Decimal, discount: Decimal, vat_rate: Option<Decimal>) -> AmountBreakdown {
        DocumentService::breakdown(self, subtotal, discount, vat_rate)
    }

    async fn allocate_number(
        &self,
        tenant_id: TenantId,
        document_type: DocumentType,
        year: i32,
    ) -> Result<DocumentNumber, DocumentError> {
        DocumentService::allocate_number(self, tenant_id, document_type, year).await
    }

    async fn create_document(&self, cmd: CreateDocument) -> Result<Document, DocumentError> {
        DocumentService::create_document(self, cmd).await
    }

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        DocumentService::get(self, tenant_id, id).await
    }

    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, DocumentError> {
        DocumentService::list(self, tenant_id, filter).await
    }

    async fn mark_paid(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        DocumentService::mark_paid(self, tenant_id, id).await
    }

    async fn cancel(&self, tenant_id: TenantId, id: DocumentId) -> Result<Document, DocumentError> {
        DocumentService::cancel(self, tenant_id, id).await
    }
}

#[derive(Clone)]
pub struct AppServices {
    pub documents: Arc<dyn DocumentApi>,
}

impl std::fmt::Debug for AppServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppServices").finish_non_exhaustive()
    }
}

impl AppServices {
    /// Services over the in-memory store.
    pub fn in_memory(config: &ComptaConfig) -> Self {
        Self::over(InMemoryStore::arc(), config)
    }

    fn over<S>(store: S, config: &ComptaConfig) -> Self
    where
        S: CounterStore + DocumentRepository + Clone + 'static,
    {
        let service = DocumentService::new(
            store,
            config.numbering.retry_policy(),
            config.numbering.tenancy,
            config.invoicing.default_vat_rate,
        );
        Self {
            documents: Arc::new(service),
        }
    }
}

/// Build services for the configured backend.
///
/// A `database.url` selects Postgres (requires the `postgres` feature); otherwise
/// everything is kept in memory.
pub async fn build_services(config: &ComptaConfig) -> Result<AppServices, StoreError> {
    match config.database.url.as_deref() {
        None => {
            tracing::info!(tenancy = ?config.numbering.tenancy, "using in-memory store");
            Ok(AppServices::in_memory(config))
        }
        Some(url) => connect_postgres(url, config).await,
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(url: &str, config: &ComptaConfig) -> Result<AppServices, StoreError> {
    use compta_infra::store::PostgresStore;

    let store = PostgresStore::connect(url, config.database.max_connections).await?;
    store.migrate().await?;
    tracing::info!(tenancy = ?config.numbering.tenancy, "using postgres store");
    Ok(AppServices::over(Arc::new(store), config))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_url: &str, _config: &ComptaConfig) -> Result<AppServices, StoreError> {
    Err(StoreError::Storage(
        "database.url is set but this build has no postgres support (enable the `postgres` feature)".to_string(),
    ))
}
