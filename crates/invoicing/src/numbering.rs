//! Year-scoped document numbering (pure part).
//!
//! A numbering family is identified by a [`ScopeKey`]: the document type plus, when
//! numbering is per tenant, the tenant. Every (key, year) pair owns its own counter, so
//! the first allocation of a year starts at 1 and allocating for an earlier year never
//! touches a later year's counter. [`SequenceCounter::advance`] holds the increment rule
//! every storage backend applies.
//!
//! Full numbers look like `FA-2026-0001`: type code, year, then the sequential number
//! zero-padded to four digits. Numbers past 9999 simply print wider.

use serde::{Deserialize, Serialize};

use compta_core::{DomainError, DomainResult, TenantId, ValueObject};

use crate::document_type::DocumentType;

/// Minimum width of the sequential part of a full number.
pub const SEQUENCE_WIDTH: usize = 4;

/// Whether sequences are shared by every tenant or kept per tenant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "tenant_id")]
pub enum Tenancy {
    Global,
    Tenant(TenantId),
}

impl Tenancy {
    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Tenancy::Global => None,
            Tenancy::Tenant(t) => Some(*t),
        }
    }
}

/// Tenancy and document type of a sequence; the year completes the counter identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn new(tenancy: Tenancy, document_type: DocumentType) -> Self {
        match tenancy {
            Tenancy::Global => Self(format!("global/{}", document_type.as_str())),
            Tenancy::Tenant(t) => Self(format!("{}/{}", t, document_type.as_str())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (document type, calendar year, tenancy) triple a number is drawn for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumberingScope {
    pub document_type: DocumentType,
    pub year: i32,
    pub tenancy: Tenancy,
}

impl NumberingScope {
    pub fn new(document_type: DocumentType, year: i32, tenancy: Tenancy) -> Self {
        Self {
            document_type,
            year,
            tenancy,
        }
    }

    pub fn global(document_type: DocumentType, year: i32) -> Self {
        Self::new(document_type, year, Tenancy::Global)
    }

    pub fn for_tenant(document_type: DocumentType, year: i32, tenant_id: TenantId) -> Self {
        Self::new(document_type, year, Tenancy::Tenant(tenant_id))
    }

    pub fn key(&self) -> ScopeKey {
        ScopeKey::new(self.tenancy, self.document_type)
    }

    /// `"FA-2026-"` for invoices of 2026.
    pub fn prefix(&self) -> String {
        format!("{}-{}-", self.document_type.code(), self.year)
    }

    pub fn number(&self, sequential_number: u64) -> DocumentNumber {
        DocumentNumber::new(self.document_type, self.year, sequential_number)
    }
}

impl core::fmt::Display for NumberingScope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.key(), self.year)
    }
}

/// Persistent state of one counter row.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub year: i32,
    /// Last number issued in `year`.
    pub last_number: u64,
}

impl SequenceCounter {
    /// Counter state after one allocation for `year`.
    ///
    /// A missing row and a row left over from another year both count as
    /// `last_number = 0`, so the first allocation of a year always yields 1.
    pub fn advance(current: Option<SequenceCounter>, year: i32) -> SequenceCounter {
        let last = match current {
            Some(c) if c.year == year => c.last_number,
            _ => 0,
        };
        SequenceCounter {
            year,
            last_number: last.saturating_add(1),
        }
    }
}

/// A formatted document number, e.g. `FA-2026-0001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DocumentNumber {
    #[serde(skip)]
    document_type: DocumentType,
    #[serde(skip)]
    year: i32,
    sequential_number: u64,
    prefix: String,
    full_number: String,
}

impl ValueObject for DocumentNumber {}

impl DocumentNumber {
    pub fn new(document_type: DocumentType, year: i32, sequential_number: u64) -> Self {
        let prefix = format!("{}-{}-", document_type.code(), year);
        let full_number = format!(
            "{prefix}{sequential_number:0width$}",
            width = SEQUENCE_WIDTH
        );
        Self {
            document_type,
            year,
            sequential_number,
            prefix,
            full_number,
        }
    }

    /// Parse a full number such as `DV-2026-0042`.
    pub fn parse(s: &str) -> DomainResult<Self> {
        let malformed = || DomainError::validation(format!("malformed document number '{s}'"));

        let mut parts = s.splitn(3, '-');
        let (code, year, seq) = match (parts.next(), parts.next(), parts.next()) {
            (Some(c), Some(y), Some(n)) => (c, y, n),
            _ => return Err(malformed()),
        };

        let document_type = DocumentType::from_code(code).ok_or_else(malformed)?;
        if year.len() != 4 || seq.len() < SEQUENCE_WIDTH {
            return Err(malformed());
        }
        if !year.bytes().all(|b| b.is_ascii_digit()) || !seq.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let sequential_number: u64 = seq.parse().map_err(|_| malformed())?;
        if sequential_number == 0 {
            return Err(malformed());
        }

        let number = Self::new(document_type, year, sequential_number);
        // Reject non-canonical forms such as "FA-2026-00012".
        if number.full_number != s {
            return Err(malformed());
        }
        Ok(number)
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequential_number(&self) -> u64 {
        self.sequential_number
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn full_number(&self) -> &str {
        &self.full_number
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.full_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_quote_numbers() {
        let scope = NumberingScope::global(DocumentType::Devis, 2026);
        let n = scope.number(1);
        assert_eq!(n.full_number(), "DV-2026-0001");
        assert_eq!(n.prefix(), "DV-2026-");
        assert_eq!(n.sequential_number(), 1);
    }

    #[test]
    fn numbers_past_four_digits_print_wider() {
        let n = DocumentNumber::new(DocumentType::Facture, 2026, 12345);
        assert_eq!(n.full_number(), "FA-2026-12345");
        assert_eq!(DocumentNumber::parse("FA-2026-12345").unwrap(), n);
    }

    #[test]
    fn parse_recovers_scope_parts() {
        let n = DocumentNumber::parse("AV-2025-0042").unwrap();
        assert_eq!(n.document_type(), DocumentType::Avoir);
        assert_eq!(n.year(), 2025);
        assert_eq!(n.sequential_number(), 42);
    }

    #[test]
    fn parse_rejects_malformed_numbers() {
        for bad in [
            "",
            "FA-2026",
            "XX-2026-0001",
            "FA-26-0001",
            "FA-2026-1",
            "FA-2026-0000",
            "FA-2026-00012",
            "FA-2026-00a1",
            "FA-2026--001",
        ] {
            assert!(DocumentNumber::parse(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn scope_key_ignores_year() {
        let tenant = TenantId::new();
        let a = NumberingScope::for_tenant(DocumentType::Facture, 2025, tenant);
        let b = NumberingScope::for_tenant(DocumentType::Facture, 2026, tenant);
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), NumberingScope::global(DocumentType::Facture, 2025).key());
        assert_ne!(
            a.key(),
            NumberingScope::for_tenant(DocumentType::Avoir, 2025, tenant).key()
        );
    }

    #[test]
    fn counter_starts_at_one() {
        let c = SequenceCounter::advance(None, 2026);
        assert_eq!(c, SequenceCounter { year: 2026, last_number: 1 });
    }

    #[test]
    fn counter_increments_within_a_year() {
        let c = SequenceCounter::advance(Some(SequenceCounter { year: 2026, last_number: 7 }), 2026);
        assert_eq!(c.last_number, 8);
    }

    #[test]
    fn counter_rolls_over_on_year_change() {
        let c = SequenceCounter::advance(Some(SequenceCounter { year: 2024, last_number: 318 }), 2025);
        assert_eq!(c, SequenceCounter { year: 2025, last_number: 1 });
    }

    proptest! {
        /// Property: within one year, successive advances are strictly increasing by one.
        #[test]
        fn advance_is_strictly_monotonic(year in 2000i32..2100, steps in 1usize..200) {
            let mut current = None;
            let mut previous = 0u64;
            for _ in 0..steps {
                let next = SequenceCounter::advance(current, year);
                prop_assert_eq!(next.last_number, previous + 1);
                previous = next.last_number;
                current = Some(next);
            }
        }

        #[test]
        fn formatted_numbers_parse_back(code_idx in 0usize..3, year in 1000i32..10000, n in 1u64..1_000_000) {
            let t = DocumentType::ALL[code_idx];
            let number = DocumentNumber::new(t, year, n);
            prop_assert_eq!(DocumentNumber::parse(number.full_number()).unwrap(), number);
        }
    }
}
