//! Seam for attaching an online payment link to issued invoices.

use async_trait::async_trait;
use thiserror::Error;

use compta_invoicing::DocumentNumber;

#[derive(Debug, Error)]
pub enum PaymentLinkError {
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),

    #[error("payment provider rejected the request: {0}")]
    Rejected(String),
}

/// Creates a hosted payment page for an invoice.
///
/// Called after the number is allocated and before the document is stored. Failures
/// never abort document creation; the invoice is simply stored without a link.
#[async_trait]
pub trait PaymentLinkProvider: Send + Sync {
    /// `Ok(None)` means the provider chose not to create a link.
    async fn create_link(&self, number: &DocumentNumber, amount_cents: i64) -> Result<Option<String>, PaymentLinkError>;
}

/// Provider used when no payment integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPaymentLinks;

#[async_trait]
impl PaymentLinkProvider for NoPaymentLinks {
    async fn create_link(&self, _number: &DocumentNumber, _amount_cents: i64) -> Result<Option<String>, PaymentLinkError> {
        Ok(None)
    }
}
