//! Postgres-backed counter store and document repository.
//!
//! Counter rows are keyed by `(scope_key, year)`. Each counter transaction runs at
//! `SERIALIZABLE` isolation. The increment itself is a single
//! `INSERT ... ON CONFLICT DO UPDATE`, which takes the row lock, so two transactions on
//! the same counter can never both read the same `last_number`.
//! When they race, Postgres aborts one of them with a serialization failure, which is
//! reported as `StoreError::Conflict` and retried by the allocator.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (serialization failure) | `40001` | `Conflict` | Concurrent allocation on the same scope |
//! | Database (deadlock detected) | `40P01` | `Conflict` | Lock ordering race |
//! | Database (unique violation) | `23505` | `DuplicateNumber` | Full number already used in scope |
//! | Database (other) | Any other | `Storage` | Schema or data errors |
//! | PoolClosed / Other | N/A | `Storage` | Network errors, connection failures, etc. |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use compta_core::{ClientId, DocumentId, TenantId};
use compta_invoicing::{
    AmountBreakdown, Document, DocumentNumber, DocumentStatus, DocumentType, LineItem, NumberingScope,
    ScopeKey, SequenceCounter,
};

use super::r#trait::{CounterStore, CounterTx, DocumentFilter, DocumentRepository, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_numbering.sql");

/// Postgres-backed store.
///
/// ## Thread Safety
///
/// Uses the SQLx connection pool, which is `Send + Sync`; the store can be shared
/// across tasks behind an `Arc`.
///
/// ## Tenant Isolation
///
/// Every document query includes `tenant_id` in the WHERE clause, except the
/// numbering lookups, which are keyed by scope key (itself tenant-qualified when
/// numbering is per tenant).
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

/// Open `SERIALIZABLE` transaction on one counter row.
pub struct PostgresCounterTx {
    scope: NumberingScope,
    key: ScopeKey,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CounterStore for PostgresStore {
    type Tx = PostgresCounterTx;

    #[instrument(skip(self), fields(scope_key = %scope.key(), year = scope.year), err)]
    async fn begin(&self, scope: &NumberingScope) -> Result<Self::Tx, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        Ok(PostgresCounterTx {
            scope: *scope,
            key: scope.key(),
            tx,
        })
    }

    async fn counter(&self, scope: &NumberingScope) -> Result<Option<SequenceCounter>, StoreError> {
        let row = sqlx::query("SELECT year, last_number FROM sequence_counters WHERE scope_key = $1 AND year = $2")
            .bind(scope.key().as_str())
            .bind(scope.year)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_counter", e))?;

        row.map(|row| counter_from_row(&row)).transpose()
    }
}

#[async_trait]
impl CounterTx for PostgresCounterTx {
    #[instrument(skip(self), fields(scope_key = %self.key, year = self.scope.year), err)]
    async fn read_and_increment(&mut self) -> Result<SequenceCounter, StoreError> {
        // A missing row starts the year at 1, as in `SequenceCounter::advance`.
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counters (scope_key, year, last_number)
            VALUES ($1, $2, 1)
            ON CONFLICT (scope_key, year) DO UPDATE SET
                last_number = sequence_counters.last_number + 1,
                updated_at = NOW()
            RETURNING year, last_number
            "#,
        )
        .bind(self.key.as_str())
        .bind(self.scope.year)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("increment_counter", e))?;

        counter_from_row(&row)
    }

    async fn highest_issued(&mut self) -> Result<Option<u64>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT MAX(sequential_number) AS highest
            FROM documents
            WHERE scope_key = $1 AND year = $2
            "#,
        )
        .bind(self.key.as_str())
        .bind(self.scope.year)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("highest_issued", e))?;

        read_highest(&row)
    }

    async fn set_last_number(&mut self, last_number: u64) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sequence_counters (scope_key, year, last_number)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope_key, year) DO UPDATE SET
                last_number = EXCLUDED.last_number,
                updated_at = NOW()
            "#,
        )
        .bind(self.key.as_str())
        .bind(self.scope.year)
        .bind(last_number as i64)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("set_last_number", e))?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

const DOCUMENT_COLUMNS: &str = r#"
    document_id, tenant_id, client_id, document_type, year, sequential_number, full_number,
    lines, subtotal, discount, net_amount, vat_rate, vat_amount, gross_amount,
    status, payment_link, created_at
"#;

#[async_trait]
impl DocumentRepository for PostgresStore {
    #[instrument(
        skip(self, document),
        fields(tenant_id = %document.tenant_id, full_number = %document.number),
        err
    )]
    async fn insert(&self, key: &ScopeKey, document: &Document) -> Result<(), StoreError> {
        let lines = serde_json::to_value(&document.lines)
            .map_err(|e| StoreError::Storage(format!("lines serialization failed: {e}")))?;
        let b = &document.breakdown;

        sqlx::query(
            r#"
            INSERT INTO documents (
                document_id, tenant_id, client_id, scope_key, document_type, year,
                sequential_number, full_number, lines, subtotal, discount, net_amount,
                vat_rate, vat_amount, gross_amount, status, payment_link, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(document.tenant_id.as_uuid())
        .bind(document.client_id.as_uuid())
        .bind(key.as_str())
        .bind(document.document_type.as_str())
        .bind(document.number.year())
        .bind(document.number.sequential_number() as i64)
        .bind(document.number.full_number())
        .bind(&lines)
        .bind(b.subtotal)
        .bind(b.discount)
        .bind(b.net_amount)
        .bind(b.vat_rate)
        .bind(b.vat_amount)
        .bind(b.gross_amount)
        .bind(document.status.as_str())
        .bind(document.payment_link.as_deref())
        .bind(document.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "documents_scope_number_unique") {
                StoreError::DuplicateNumber(document.number.full_number().to_string())
            } else {
                map_sqlx_error("insert_document", e)
            }
        })?;

        Ok(())
    }

    async fn get(&self, tenant_id: TenantId, id: DocumentId) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE tenant_id = $1 AND document_id = $2"
        ))
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_document", e))?;

        row.map(|row| document_from_row(&row)).transpose()
    }

    async fn list(&self, tenant_id: TenantId, filter: &DocumentFilter) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM documents
            WHERE tenant_id = $1
                AND ($2::text IS NULL OR document_type = $2)
                AND ($3::text IS NULL OR status = $3)
            ORDER BY created_at DESC, sequential_number DESC
            LIMIT $4
            "#
        ))
        .bind(tenant_id.as_uuid())
        .bind(filter.document_type.map(|t| t.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_documents", e))?;

        rows.iter().map(document_from_row).collect()
    }

    async fn update_status(
        &self,
        tenant_id: TenantId,
        id: DocumentId,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET status = $4 WHERE tenant_id = $1 AND document_id = $2 AND status = $3",
        )
        .bind(tenant_id.as_uuid())
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.get(tenant_id, id).await? {
            None => Err(StoreError::NotFound),
            Some(current) => Err(StoreError::Conflict(format!(
                "document {} is {}, expected {}",
                current.number,
                current.status.as_str(),
                from.as_str()
            ))),
        }
    }
}

fn read_highest(row: &PgRow) -> Result<Option<u64>, StoreError> {
    let highest: Option<i64> = row
        .try_get("highest")
        .map_err(|e| StoreError::Storage(format!("failed to read highest: {e}")))?;
    Ok(highest.map(|h| h as u64))
}

fn counter_from_row(row: &PgRow) -> Result<SequenceCounter, StoreError> {
    let year: i32 = row
        .try_get("year")
        .map_err(|e| StoreError::Storage(format!("failed to read year: {e}")))?;
    let last_number: i64 = row
        .try_get("last_number")
        .map_err(|e| StoreError::Storage(format!("failed to read last_number: {e}")))?;
    Ok(SequenceCounter {
        year,
        last_number: last_number as u64,
    })
}

fn document_from_row(row: &PgRow) -> Result<Document, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Storage(format!("failed to deserialize document row: {e}"));
    let invalid = |e: compta_core::DomainError| StoreError::Storage(format!("invalid stored document: {e}"));

    let document_type: String = row.try_get("document_type").map_err(decode)?;
    let document_type: DocumentType = document_type.parse().map_err(invalid)?;
    let year: i32 = row.try_get("year").map_err(decode)?;
    let sequential_number: i64 = row.try_get("sequential_number").map_err(decode)?;
    let full_number: String = row.try_get("full_number").map_err(decode)?;

    let number = DocumentNumber::new(document_type, year, sequential_number as u64);
    if number.full_number() != full_number {
        return Err(StoreError::Storage(format!(
            "stored full number '{full_number}' does not match {number}"
        )));
    }

    let lines: serde_json::Value = row.try_get("lines").map_err(decode)?;
    let lines: Vec<LineItem> = serde_json::from_value(lines)
        .map_err(|e| StoreError::Storage(format!("failed to decode lines: {e}")))?;

    let status: String = row.try_get("status").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;
    let decimal = |col: &str| -> Result<Decimal, StoreError> { row.try_get(col).map_err(decode) };

    Ok(Document {
        id: DocumentId::from_uuid(row.try_get("document_id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get("tenant_id").map_err(decode)?),
        client_id: ClientId::from_uuid(row.try_get("client_id").map_err(decode)?),
        document_type,
        number,
        lines,
        breakdown: AmountBreakdown {
            subtotal: decimal("subtotal")?,
            discount: decimal("discount")?,
            net_amount: decimal("net_amount")?,
            vat_rate: decimal("vat_rate")?,
            vat_amount: decimal("vat_amount")?,
            gross_amount: decimal("gross_amount")?,
        },
        status: status.parse().map_err(invalid)?,
        payment_link: row.try_get("payment_link").map_err(decode)?,
        created_at,
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().as_deref() == Some("23505") && db_err.constraint() == Some(constraint);
    }
    false
}

#[cfg(test)]
mod tests {
    //! Run against a disposable database:
    //! `DATABASE_URL=postgres://... cargo test -p compta-infra --features postgres -- --ignored`

    use std::collections::HashSet;
    use std::time::Duration;

    use super::*;
    use crate::numbering::{RetryPolicy, SequenceAllocator};

    async fn store() -> PostgresStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PostgresStore::connect(&url, 10).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn issued(scope: &NumberingScope, tenant_id: TenantId, sequential_number: u64) -> Document {
        compta_invoicing::NewDocument::prepare(
            tenant_id,
            ClientId::new(),
            scope.document_type,
            vec![compta_invoicing::LineInput {
                description: "Prestation".to_string(),
                quantity: None,
                unit_price: None,
                amount: Some(Decimal::ONE_HUNDRED),
            }],
            Decimal::ZERO,
            Decimal::from(20),
        )
        .unwrap()
        .issue(DocumentId::new(), scope.number(sequential_number), None, Utc::now())
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore]
    async fn concurrent_allocations_are_unique() {
        const TASKS: u64 = 20;

        let store = Arc::new(store().await);
        // Serialization failures resolve one winner per round, so every task gets enough
        // attempts to outlast all the others.
        let policy = RetryPolicy::exponential(TASKS as u32 + 5, Duration::from_millis(5), Duration::from_millis(50));
        let allocator = Arc::new(SequenceAllocator::new(store, policy));
        let scope = NumberingScope::for_tenant(DocumentType::Facture, 2026, TenantId::new());

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move { allocator.allocate(scope).await }));
        }

        let mut numbers = HashSet::new();
        for h in handles {
            let number = h.await.unwrap().expect("every allocation should succeed");
            assert!(numbers.insert(number.sequential_number()), "duplicate {number}");
        }
        assert_eq!(numbers, (1..=TASKS).collect::<HashSet<u64>>());
    }

    #[tokio::test]
    #[ignore]
    async fn allocation_skips_past_stored_documents() {
        let store = Arc::new(store().await);
        let tenant = TenantId::new();
        let scope = NumberingScope::for_tenant(DocumentType::Facture, 2026, tenant);

        // Document stored without its counter row, as after a partial restore.
        store.insert(&scope.key(), &issued(&scope, tenant, 5)).await.unwrap();
        assert_eq!(store.counter(&scope).await.unwrap(), None);

        let allocator = SequenceAllocator::new(store.clone(), RetryPolicy::default());
        assert_eq!(allocator.allocate(scope).await.unwrap().sequential_number(), 6);
        assert_eq!(allocator.allocate(scope).await.unwrap().sequential_number(), 7);
        assert_eq!(
            store.counter(&scope).await.unwrap(),
            Some(SequenceCounter { year: 2026, last_number: 7 })
        );
    }

    #[tokio::test]
    #[ignore]
    async fn back_dated_allocation_leaves_current_year_alone() {
        let store = Arc::new(store().await);
        let allocator = SequenceAllocator::new(store.clone(), RetryPolicy::default());
        let tenant = TenantId::new();
        let current = NumberingScope::for_tenant(DocumentType::Facture, 2026, tenant);
        let previous = NumberingScope::for_tenant(DocumentType::Facture, 2025, tenant);

        assert_eq!(allocator.allocate(current).await.unwrap().full_number(), "FA-2026-0001");
        assert_eq!(allocator.allocate(current).await.unwrap().full_number(), "FA-2026-0002");
        assert_eq!(allocator.allocate(previous).await.unwrap().full_number(), "FA-2025-0001");
        assert_eq!(allocator.allocate(current).await.unwrap().full_number(), "FA-2026-0003");
    }
    #[tokio::test]
    #[ignore]
    async fn year_change_restarts_sequence() {
        let store = store().await;
        let tenant = TenantId::new();

        let mut tx = store
            .begin(&NumberingScope::for_tenant(DocumentType::Avoir, 2024, tenant))
            .await
            .unwrap();
        tx.read_and_increment().await.unwrap();
        tx.read_and_increment().await.unwrap();
        tx.commit().await.unwrap();

        let scope = NumberingScope::for_tenant(DocumentType::Avoir, 2025, tenant);
        let mut tx = store.begin(&scope).await.unwrap();
        let counter = tx.read_and_increment().await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(counter, SequenceCounter { year: 2025, last_number: 1 });
    }
}
