use core::str::FromStr;

use serde::{Deserialize, Serialize};

use compta_core::DomainError;

/// Kind of billing document. Each kind has its own numbering sequence.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Invoice.
    Facture,
    /// Quote.
    Devis,
    /// Credit note.
    Avoir,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [DocumentType::Facture, DocumentType::Devis, DocumentType::Avoir];

    /// Stable upper-case name used on the wire and in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Facture => "FACTURE",
            DocumentType::Devis => "DEVIS",
            DocumentType::Avoir => "AVOIR",
        }
    }

    /// Two-letter code printed at the start of every full number.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentType::Facture => "FA",
            DocumentType::Devis => "DV",
            DocumentType::Avoir => "AV",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Only invoices can carry a payment link.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, DocumentType::Facture)
    }
}

impl core::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unknown document type '{s}' (expected FACTURE, DEVIS or AVOIR)"
                ))
            })
    }
}
