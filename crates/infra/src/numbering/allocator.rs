use thiserror::Error;
use tracing::instrument;

use compta_invoicing::{DocumentNumber, NumberingScope};

use super::retry::RetryPolicy;
use crate::store::{CounterStore, CounterTx, StoreError};

#[derive(Debug, Error)]
pub enum AllocationError {
    /// Every attempt lost its transaction to a concurrent allocation on the same scope.
    /// Retrying the whole operation from the top is safe.
    #[error("could not allocate a number for {scope} after {attempts} attempts")]
    AllocationConflict { scope: NumberingScope, attempts: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, AllocationError::AllocationConflict { .. })
    }
}

/// Hands out gap-free, unique sequential numbers per numbering scope.
///
/// One allocation is one counter transaction:
///
/// 1. increment the counter of the scope's key and year (a new year starts at 1)
/// 2. compare the candidate with the highest number already issued in the scope and year;
///    if the counter lags behind, jump past it and write the corrected value back
/// 3. commit
///
/// A transaction that loses a race is rolled back and the whole sequence is re-run,
/// up to the retry policy's attempt budget. No other code path writes the counter.
#[derive(Debug, Clone)]
pub struct SequenceAllocator<S> {
    store: S,
    policy: RetryPolicy,
}

impl<S> SequenceAllocator<S>
where
    S: CounterStore,
{
    pub fn new(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[instrument(skip(self), fields(scope_key = %scope.key(), year = scope.year), err)]
    pub async fn allocate(&self, scope: NumberingScope) -> Result<DocumentNumber, AllocationError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.attempt(&scope).await {
                Ok(sequential_number) => {
                    let number = scope.number(sequential_number);
                    tracing::debug!(full_number = %number, attempts, "number allocated");
                    return Ok(number);
                }
                Err(err) if err.is_retryable() => {
                    if !self.policy.should_retry(attempts) {
                        return Err(AllocationError::AllocationConflict { scope, attempts });
                    }
                    let delay = self.policy.delay_for_attempt(attempts);
                    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                    tracing::warn!(attempt = attempts, delay_ms, error = %err, "allocation conflict, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn attempt(&self, scope: &NumberingScope) -> Result<u64, StoreError> {
        let mut tx = self.store.begin(scope).await?;
        let candidate = tx.read_and_increment().await?.last_number;

        let issued = match tx.highest_issued().await? {
            Some(highest) if highest >= candidate => {
                let healed = highest + 1;
                tracing::warn!(
                    candidate = %scope.number(candidate),
                    highest_issued = highest,
                    next = healed,
                    "counter behind issued documents, skipping ahead"
                );
                tx.set_last_number(healed).await?;
                healed
            }
            _ => candidate,
        };

        tx.commit().await?;
        Ok(issued)
    }
}
