//! VAT arithmetic, discounts and order totals.
//!
//! Catalog prices are VAT-inclusive. Every helper rounds to two decimal places,
//! half away from zero.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::types::DiscountKind;

/// UK standard VAT rate (20%).
pub const VAT_RATE: Decimal = Decimal::from_parts(20, 0, 0, false, 2);

/// Maximum quantity of a single SKU in a cart or order line.
pub const MAX_LINE_QUANTITY: i32 = 99;

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Strip VAT from a VAT-inclusive price.
#[must_use]
pub fn calculate_price_excl_tax(price_incl_tax: Decimal) -> Decimal {
    round_money(price_incl_tax / (Decimal::ONE + VAT_RATE))
}

/// Add VAT to a VAT-exclusive price.
#[must_use]
pub fn calculate_price_incl_tax(price_excl_tax: Decimal) -> Decimal {
    round_money(price_excl_tax * (Decimal::ONE + VAT_RATE))
}

/// VAT contained in a VAT-inclusive amount.
#[must_use]
pub fn vat_portion(price_incl_tax: Decimal) -> Decimal {
    price_incl_tax - calculate_price_excl_tax(price_incl_tax)
}

/// Line total for `quantity` units at `unit_price`.
#[must_use]
pub fn line_total(unit_price: Decimal, quantity: i32) -> Decimal {
    round_money(unit_price * Decimal::from(quantity))
}

/// Errors from discount validation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscountError {
    #[error("percentage discounts must be greater than 0 and at most 100")]
    PercentageOutOfRange,
    #[error("fixed discounts must be greater than zero")]
    NonPositiveAmount,
}

/// A discount's calculation rule, detached from its database row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscountRule {
    pub kind: DiscountKind,
    pub value: Decimal,
}

impl DiscountRule {
    /// Build a rule, validating `value` against `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError`] if a percentage is not in `(0, 100]` or a
    /// fixed amount is not positive.
    pub fn new(kind: DiscountKind, value: Decimal) -> Result<Self, DiscountError> {
        match kind {
            DiscountKind::Percentage if value <= Decimal::ZERO || value > Decimal::ONE_HUNDRED => {
                Err(DiscountError::PercentageOutOfRange)
            }
            DiscountKind::FixedAmount if value <= Decimal::ZERO => {
                Err(DiscountError::NonPositiveAmount)
            }
            _ => Ok(Self { kind, value }),
        }
    }

    /// Amount taken off `subtotal`. Never exceeds the subtotal.
    #[must_use]
    pub fn amount_off(&self, subtotal: Decimal) -> Decimal {
        let raw = match self.kind {
            DiscountKind::Percentage => round_money(subtotal * self.value / Decimal::ONE_HUNDRED),
            DiscountKind::FixedAmount => self.value,
        };
        raw.min(subtotal).max(Decimal::ZERO)
    }
}

/// Monetary summary of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Sum of line totals (VAT-inclusive).
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    /// VAT contained in `total`.
    pub tax_total: Decimal,
    /// Amount charged.
    pub total: Decimal,
}

impl OrderTotals {
    /// Compute totals from `(unit_price, quantity)` lines and an optional discount.
    #[must_use]
    pub fn compute<I>(lines: I, discount: Option<&DiscountRule>) -> Self
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let subtotal: Decimal = lines
            .into_iter()
            .map(|(price, quantity)| line_total(price, quantity))
            .sum();
        let discount_total = discount.map_or(Decimal::ZERO, |rule| rule.amount_off(subtotal));
        let total = subtotal - discount_total;

        Self {
            subtotal,
            discount_total,
            tax_total: vat_portion(total),
            total,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_excl_tax() {
        assert_eq!(calculate_price_excl_tax(dec("120.00")), dec("100.00"));
        assert_eq!(calculate_price_excl_tax(dec("19.99")), dec("16.66"));
        assert_eq!(calculate_price_excl_tax(Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_incl_tax() {
        assert_eq!(calculate_price_incl_tax(dec("100.00")), dec("120.00"));
        assert_eq!(calculate_price_incl_tax(dec("16.66")), dec("19.99"));
    }

    #[test]
    fn test_vat_round_trip_within_a_penny() {
        let tolerance = dec("0.01");
        let mut price = dec("0.01");
        while price < dec("250.00") {
            let back = calculate_price_incl_tax(calculate_price_excl_tax(price));
            assert!((back - price).abs() <= tolerance, "{price} -> {back}");
            price += dec("0.37");
        }
    }

    #[test]
    fn test_percentage_discount() {
        let rule = DiscountRule::new(DiscountKind::Percentage, dec("15")).unwrap();
        assert_eq!(rule.amount_off(dec("80.00")), dec("12.00"));
    }

    #[test]
    fn test_fixed_discount_capped_at_subtotal() {
        let rule = DiscountRule {
            kind: DiscountKind::FixedAmount,
            value: dec("50.00"),
        };
        assert_eq!(rule.amount_off(dec("30.00")), dec("30.00"));
        assert_eq!(rule.amount_off(dec("80.00")), dec("50.00"));
    }

    #[test]
    fn test_discount_validation() {
        assert_eq!(
            DiscountRule::new(DiscountKind::Percentage, dec("101")),
            Err(DiscountError::PercentageOutOfRange)
        );
        assert_eq!(
            DiscountRule::new(DiscountKind::Percentage, Decimal::ZERO),
            Err(DiscountError::PercentageOutOfRange)
        );
        assert_eq!(
            DiscountRule::new(DiscountKind::FixedAmount, dec("-5")),
            Err(DiscountError::NonPositiveAmount)
        );
        assert!(DiscountRule::new(DiscountKind::Percentage, dec("100")).is_ok());
        assert!(DiscountRule::new(DiscountKind::Percentage, dec("0.5")).is_ok());
    }

    #[test]
    fn test_zero_percent_message_matches_rule() {
        let err = DiscountRule::new(DiscountKind::Percentage, Decimal::ZERO).unwrap_err();
        assert_eq!(
            err.to_string(),
            "percentage discounts must be greater than 0 and at most 100"
        );
    }

    #[test]
    fn test_order_totals() {
        let rule = DiscountRule {
            kind: DiscountKind::FixedAmount,
            value: dec("10.00"),
        };
        let totals = OrderTotals::compute([(dec("25.00"), 2), (dec("10.00"), 1)], Some(&rule));

        assert_eq!(totals.subtotal, dec("60.00"));
        assert_eq!(totals.discount_total, dec("10.00"));
        assert_eq!(totals.total, dec("50.00"));
        assert_eq!(totals.tax_total, dec("8.33"));
    }

    #[test]
    fn test_order_totals_without_discount() {
        let totals = OrderTotals::compute([(dec("12.00"), 1)], None);
        assert_eq!(totals.discount_total, Decimal::ZERO);
        assert_eq!(totals.total, dec("12.00"));
        assert_eq!(totals.tax_total, dec("2.00"));
    }
}
