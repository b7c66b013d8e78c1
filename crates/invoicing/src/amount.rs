//! Subtotal / discount / VAT breakdown.
//!
//! Every derived field is rounded to the cent on its own (half-up on the cent), rather
//! than rounding only the final total. Historical documents were computed this way and
//! must reproduce exactly, even where it is one cent off a "round at the end" total.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use compta_core::ValueObject;

/// VAT rate (percent) applied when the caller does not give one.
pub const DEFAULT_VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

const CENT_PLACES: u32 = 2;

/// Round to two decimals, half-up on the cent.
///
/// All calculator inputs are clamped to be non-negative first, so "away from zero" and
/// "half-up" coincide here.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CENT_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// Tax-inclusive breakdown of a document total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountBreakdown {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub net_amount: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub gross_amount: Decimal,
}

impl ValueObject for AmountBreakdown {}

impl AmountBreakdown {
    /// Gross amount in the smallest currency unit (what a payment provider charges).
    pub fn gross_cents(&self) -> i64 {
        self.gross_amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .and_then(|cents| cents.trunc().to_i64())
            .unwrap_or(i64::MAX)
    }
}

/// `net * rate / 100`, saturating at `Decimal::MAX`.
fn vat_on(net: Decimal, vat_rate: Decimal) -> Decimal {
    net.checked_mul(vat_rate)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .or_else(|| (net / Decimal::ONE_HUNDRED).checked_mul(vat_rate))
        .unwrap_or(Decimal::MAX)
}

/// Convert a subtotal, a discount and a VAT rate into a rounded breakdown.
///
/// Never fails: negative inputs are clamped to zero, a discount larger than the
/// subtotal floors the net amount at zero, and amounts beyond the decimal range
/// saturate at `Decimal::MAX`.
pub fn compute_breakdown(subtotal: Decimal, discount: Decimal, vat_rate: Decimal) -> AmountBreakdown {
    let subtotal = subtotal.max(Decimal::ZERO);
    let discount = discount.max(Decimal::ZERO);
    let vat_rate = vat_rate.max(Decimal::ZERO);

    let net = (subtotal - discount).max(Decimal::ZERO);
    let vat_amount = round2(vat_on(net, vat_rate));
    let gross_amount = round2(net.checked_add(vat_amount).unwrap_or(Decimal::MAX));

    AmountBreakdown {
        subtotal: round2(subtotal),
        discount: round2(discount),
        net_amount: round2(net),
        vat_rate,
        vat_amount,
        gross_amount,
    }
}
