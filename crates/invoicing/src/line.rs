use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use compta_core::{DomainError, DomainResult};

/// A billed line as received from the caller (form, dictation extraction, import).
///
/// `quantity` defaults to 1 and `amount`, when absent, is `quantity * unit_price`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub description: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

/// A validated document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub amount: Decimal,
}

impl LineItem {
    pub fn from_inputs(inputs: Vec<LineInput>) -> DomainResult<Vec<LineItem>> {
        if inputs.is_empty() {
            return Err(DomainError::validation("a document needs at least one line"));
        }

        inputs
            .into_iter()
            .enumerate()
            .map(|(idx, input)| {
                let line_no = (idx as u32) + 1;
                let description = input.description.trim().to_string();
                if description.is_empty() {
                    return Err(DomainError::validation(format!(
                        "line {line_no}: description must not be empty"
                    )));
                }

                let quantity = input.quantity.unwrap_or(Decimal::ONE);
                let unit_price = input.unit_price.unwrap_or(Decimal::ZERO);
                let amount = match input.amount {
                    Some(amount) => amount,
                    None => quantity.checked_mul(unit_price).ok_or_else(|| {
                        DomainError::validation(format!("line {line_no}: quantity times unit price is out of range"))
                    })?,
                };

                Ok(LineItem {
                    line_no,
                    description,
                    quantity,
                    unit_price,
                    amount,
                })
            })
            .collect()
    }
}

/// Sum of line amounts; a total past the decimal range is a validation error.
pub fn subtotal(lines: &[LineItem]) -> DomainResult<Decimal> {
    lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        acc.checked_add(line.amount)
            .ok_or_else(|| DomainError::validation("sum of line amounts is out of range"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input(description: &str) -> LineInput {
        LineInput {
            description: description.to_string(),
            quantity: None,
            unit_price: None,
            amount: None,
        }
    }

    #[test]
    fn amount_defaults_to_quantity_times_price() {
        let lines = LineItem::from_inputs(vec![LineInput {
            quantity: Some(dec!(3)),
            unit_price: Some(dec!(29.99)),
            ..input("Tenue de comptabilité")
        }])
        .unwrap();
        assert_eq!(lines[0].amount, dec!(89.97));
        assert_eq!(lines[0].line_no, 1);
    }

    #[test]
    fn explicit_amount_wins() {
        let lines = LineItem::from_inputs(vec![LineInput {
            quantity: Some(dec!(2)),
            unit_price: Some(dec!(10)),
            amount: Some(dec!(15)),
            ..input("Forfait")
        }])
        .unwrap();
        assert_eq!(lines[0].amount, dec!(15));
    }

    #[test]
    fn quantity_defaults_to_one() {
        let lines = LineItem::from_inputs(vec![LineInput {
            unit_price: Some(dec!(250)),
            ..input("Bilan annuel")
        }])
        .unwrap();
        assert_eq!(lines[0].quantity, Decimal::ONE);
        assert_eq!(lines[0].amount, dec!(250));
    }

    #[test]
    fn rejects_empty_documents_and_blank_descriptions() {
        assert!(matches!(LineItem::from_inputs(vec![]), Err(DomainError::Validation(_))));
        assert!(matches!(
            LineItem::from_inputs(vec![input("   ")]),
            Err(DomainError::Validation(msg)) if msg.contains("line 1")
        ));
    }

    #[test]
    fn subtotal_sums_amounts() {
        let lines = LineItem::from_inputs(vec![
            LineInput { amount: Some(dec!(100)), ..input("a") },
            LineInput { amount: Some(dec!(50.5)), ..input("b") },
        ])
        .unwrap();
        assert_eq!(subtotal(&lines).unwrap(), dec!(150.5));
        assert_eq!(lines[1].line_no, 2);
    }

    #[test]
    fn out_of_range_amounts_are_rejected() {
        let err = LineItem::from_inputs(vec![LineInput {
            quantity: Some(Decimal::MAX),
            unit_price: Some(dec!(2)),
            ..input("Heures")
        }])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.starts_with("line 1")));

        let lines = LineItem::from_inputs(vec![
            LineInput { amount: Some(Decimal::MAX), ..input("a") },
            LineInput { amount: Some(dec!(1)), ..input("b") },
        ])
        .unwrap();
        assert!(matches!(subtotal(&lines), Err(DomainError::Validation(_))));
    }
}
