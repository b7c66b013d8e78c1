use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use compta_core::{DocumentId, TenantId};
use compta_invoicing::{Document, DocumentStatus, NumberingScope, ScopeKey, SequenceCounter};

use super::r#trait::{CounterStore, CounterTx, DocumentFilter, DocumentRepository, StoreError};

type CounterCell = Arc<AsyncMutex<Option<SequenceCounter>>>;
type Documents = Arc<RwLock<HashMap<DocumentId, StoredDocument>>>;

#[derive(Debug, Clone)]
struct StoredDocument {
    key: ScopeKey,
    document: Document,
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

fn highest_in(documents: &Documents, scope: &NumberingScope) -> Result<Option<u64>, StoreError> {
    let key = scope.key();
    let documents = documents.read().map_err(|_| poisoned())?;
    Ok(documents
        .values()
        .filter(|d| d.key == key && d.document.number.year() == scope.year)
        .map(|d| d.document.number.sequential_number())
        .max())
}

/// In-memory counter store and document repository.
///
/// Intended for tests/dev and single-process deployments. Each (scope key, year) counter
/// has its own async mutex which a [`InMemoryCounterTx`] holds until it is committed or
/// dropped, so allocations on one counter run one at a time while others proceed in
/// parallel.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    counters: Mutex<HashMap<NumberingScope, CounterCell>>,
    documents: Documents,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn cell(&self, scope: &NumberingScope) -> Result<CounterCell, StoreError> {
        let mut counters = self.counters.lock().map_err(|_| poisoned())?;
        Ok(counters.entry(*scope).or_default().clone())
    }

    /// Overwrite a counter outside of any allocation, as a manual data edit or a partial
    /// restore would. Waits for in-flight transactions on the same counter.
    pub async fn overwrite_counter(
        &self,
        scope: &NumberingScope,
        counter: Option<SequenceCounter>,
    ) -> Result<(), StoreError> {
        let cell = self.cell(scope)?;
        *cell.lock().await = counter;
        Ok(())
    }

    /// Number of stored documents across all tenants.
    pub fn document_count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }
}

/// Open transaction on one in-memory counter.
#[derive(Debug)]
pub struct InMemoryCounterTx {
    scope: NumberingScope,
    guard: OwnedMutexGuard<Option<SequenceCounter>>,
    pending: Option<SequenceCounter>,
    documents: Documents,
}

#[async_trait]
impl CounterStore for InMemoryStore {
    type Tx = InMemoryCounterTx;

    async fn begin(&self, scope: &NumberingScope) -> Result<Self::Tx, StoreError> {
        let cell = self.cell(scope)?;
        let guard = cell.lock_owned().await;
        Ok(InMemoryCounterTx {
            scope: *scope,
            guard,
            pending: None,
            documents: self.documents.clone(),
        })
    }

    async fn counter(&self, scope: &NumberingScope) -> Result<Option<SequenceCounter>, StoreError> {
        let cell = self.cell(scope)?;
        let current = *cell.lock().await;
        Ok(current)
    }
}

#[async_trait]
impl CounterTx for InMemoryCounterTx {
    async fn read_and_increment(&mut self) -> Result<SequenceCounter, StoreError> {
        let current = self.pending.or(*self.guard);
        let next = SequenceCounter::advance(current, self.scope.year);
        self.pending = Some(next);
        Ok(next)
    }

    async fn highest_issued(&mut self) -> Result<Option<u64>, StoreError> {
        highest_in(&self.documents, &self.scope)
    }

    async fn set_last_number(&mut self, last_number: u64) -> Result<(), StoreError> {
        self.pending = Some(SequenceCounter {
            year: self.scope.year,
            last_number,
        });
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if let Some(next) = self.pending.take() {
            *self.guard = Some(next);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentRepository for InMemoryStore {
    async fn insert(&self, key: &ScopeKey, document: &Document) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| poisoned())?;

        let full_number = document.number.full_number();
        if documents
            .values()
            .any(|d| &d.key == key && d.document.number.full_number() == full_number)
        {
            return Err(StoreError::DuplicateNumber(full_number.to_string()));
        }
        if documents.contains_key(&document.id) {
            return Err(StoreError::Storage(format!("document {} already exists", document.id)));
        }

        documents.insert(
            document.id,
            StoredDocument {
                key: key.clone(),
                document: document.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let documents = self.documents.read().map_err(|_| poisoned())?;
        Ok(documents
            .get(&id)
            .filter(|d| d.document.tenant_id == tenant_id)
            .map(|d| d.document.clone()))
    }

    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let documents = self.documents.read().map_err(|_| poisoned())?;

        let mut matching: Vec<Document> = documents
            .values()
            .map(|d| &d.document)
            .filter(|d| d.tenant_id == tenant_id)
            .filter(|d| filter.document_type.is_none_or(|t| d.document_type == t))
            .filter(|d| filter.status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.number.sequential_number().cmp(&a.number.sequential_number()))
        });
        matching.truncate(filter.limit);
        Ok(matching)
    }

    async fn update_status(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<(), StoreError> {
        let mut documents = self.documents.write().map_err(|_| poisoned())?;
        let stored = documents
            .get_mut(&id)
            .filter(|d| d.document.tenant_id == tenant_id)
            .ok_or(StoreError::NotFound)?;

        if stored.document.status != from {
            return Err(StoreError::Conflict(format!(
                "document {} is {}, expected {}",
                stored.document.number,
                stored.document.status.as_str(),
                from.as_str()
            )));
        }
        stored.document.status = to;
        Ok(())
    }
}
