use rust_decimal::Decimal;
use serde::Deserialize;

use compta_core::{ClientId, DocumentId};
use compta_infra::store::DocumentFilter;
use compta_invoicing::{DocumentStatus, DocumentType, LineInput};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct BreakdownRequest {
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub vat_rate: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateNumberRequest {
    pub document_type: String,
    /// Defaults to the current year.
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub client_id: String,
    pub document_type: String,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub discount: Decimal,
    pub vat_rate: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListDocumentsQuery {
    pub document_type: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

// -------------------------
// Parsing helpers
// -------------------------

pub fn parse_document_type(s: &str) -> Result<DocumentType, axum::response::Response> {
    s.trim()
        .to_uppercase()
        .parse()
        .map_err(errors::domain_error_to_response)
}

pub fn parse_client_id(s: &str) -> Result<ClientId, axum::response::Response> {
    s.trim().parse().map_err(errors::domain_error_to_response)
}

pub fn parse_document_id(s: &str) -> Result<DocumentId, axum::response::Response> {
    s.trim().parse().map_err(errors::domain_error_to_response)
}

impl ListDocumentsQuery {
    pub fn into_filter(self) -> Result<DocumentFilter, axum::response::Response> {
        let document_type = self.document_type.as_deref().map(parse_document_type).transpose()?;
        let status = self
            .status
            .as_deref()
            .map(|s| s.trim().to_lowercase().parse::<DocumentStatus>())
            .transpose()
            .map_err(errors::domain_error_to_response)?;

        let filter = DocumentFilter {
            document_type,
            status,
            ..DocumentFilter::default()
        };
        Ok(match self.limit {
            Some(limit) => filter.with_limit(limit),
            None => filter,
        })
    }
}
