use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use compta_core::{ClientId, DocumentId, DomainError, DomainResult, Entity, TenantId};

use crate::amount::{AmountBreakdown, compute_breakdown};
use crate::document_type::DocumentType;
use crate::line::{LineInput, LineItem, subtotal};
use crate::numbering::DocumentNumber;

/// Document status lifecycle.
///
/// Documents are never deleted; cancelling is the only way to withdraw one, so the
/// number it consumed stays accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Issued,
    Paid,
    Cancelled,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Issued => "issued",
            DocumentStatus::Paid => "paid",
            DocumentStatus::Cancelled => "cancelled",
        }
    }
}

impl core::str::FromStr for DocumentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issued" => Ok(DocumentStatus::Issued),
            "paid" => Ok(DocumentStatus::Paid),
            "cancelled" => Ok(DocumentStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown document status '{other}'"))),
        }
    }
}

/// Everything needed to issue a document except its number.
///
/// Built (and validated) before a number is allocated, so that a bad request never
/// burns a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub document_type: DocumentType,
    pub lines: Vec<LineItem>,
    pub breakdown: AmountBreakdown,
}

impl NewDocument {
    pub fn prepare(
        tenant_id: TenantId,
        client_id: ClientId,
        document_type: DocumentType,
        lines: Vec<LineInput>,
        discount: Decimal,
        vat_rate: Decimal,
    ) -> DomainResult<Self> {
        let lines = LineItem::from_inputs(lines)?;
        let breakdown = compute_breakdown(subtotal(&lines)?, discount, vat_rate);
        Ok(Self {
            tenant_id,
            client_id,
            document_type,
            lines,
            breakdown,
        })
    }

    pub fn issue(
        self,
        id: DocumentId,
        number: DocumentNumber,
        payment_link: Option<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Document> {
        if number.document_type() != self.document_type {
            return Err(DomainError::invariant(format!(
                "number {number} does not belong to a {} document",
                self.document_type
            )));
        }
        if payment_link.is_some() && !self.document_type.accepts_payment() {
            return Err(DomainError::invariant("only invoices carry a payment link"));
        }

        Ok(Document {
            id,
            tenant_id: self.tenant_id,
            client_id: self.client_id,
            document_type: self.document_type,
            number,
            lines: self.lines,
            breakdown: self.breakdown,
            status: DocumentStatus::Issued,
            payment_link,
            created_at,
        })
    }
}

/// An issued billing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub document_type: DocumentType,
    pub number: DocumentNumber,
    pub lines: Vec<LineItem>,
    pub breakdown: AmountBreakdown,
    pub status: DocumentStatus,
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Document {
    type Id = DocumentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Document {
    /// Whether the document may move to `to`.
    pub fn check_transition(&self, to: DocumentStatus) -> DomainResult<()> {
        match (self.status, to) {
            (DocumentStatus::Issued, DocumentStatus::Paid) => Ok(()),
            (DocumentStatus::Issued, DocumentStatus::Cancelled) => Ok(()),
            (from, to) if from == to => Err(DomainError::conflict(format!(
                "document {} is already {}",
                self.number,
                to.as_str()
            ))),
            (DocumentStatus::Paid, DocumentStatus::Cancelled) => Err(DomainError::invariant(
                "a paid document cannot be cancelled; issue a credit note instead",
            )),
            (from, to) => Err(DomainError::invariant(format!(
                "cannot move document {} from {} to {}",
                self.number,
                from.as_str(),
                to.as_str()
            ))),
        }
    }

    pub fn mark_paid(&mut self) -> DomainResult<()> {
        if !self.document_type.accepts_payment() {
            return Err(DomainError::invariant(format!(
                "{} documents cannot be paid",
                self.document_type
            )));
        }
        self.check_transition(DocumentStatus::Paid)?;
        self.status = DocumentStatus::Paid;
        Ok(())
    }

    pub fn cancel(&mut self) -> DomainResult<()> {
        self.check_transition(DocumentStatus::Cancelled)?;
        self.status = DocumentStatus::Cancelled;
        Ok(())
    }

    /// Apply a status change requested from outside (e.g. a payment webhook).
    pub fn transition(&mut self, to: DocumentStatus) -> DomainResult<()> {
        match to {
            DocumentStatus::Paid => self.mark_paid(),
            DocumentStatus::Cancelled => self.cancel(),
            DocumentStatus::Issued => self.check_transition(to),
        }
    }
}
