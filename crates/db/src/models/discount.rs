//! Discount code model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use atelier_core::pricing::{DiscountError, DiscountRule};
use atelier_core::{DiscountId, DiscountKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Discount {
    pub id: DiscountId,
    /// Stored upper-case.
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Discount {
    /// Whether the code can be redeemed at `now` against `subtotal`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>, subtotal: Decimal) -> bool {
        self.is_active
            && self.starts_at.is_none_or(|start| start <= now)
            && self.ends_at.is_none_or(|end| now < end)
            && self.usage_limit.is_none_or(|limit| self.usage_count < limit)
            && self.min_subtotal.is_none_or(|min| subtotal >= min)
    }

    /// Calculation rule for this discount.
    ///
    /// # Errors
    ///
    /// Returns [`DiscountError`] if the stored value is out of range.
    pub fn rule(&self) -> Result<DiscountRule, DiscountError> {
        DiscountRule::new(self.kind, self.value)
    }
}

/// Create/replace input for a discount.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountInput {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_subtotal: Option<Decimal>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn discount() -> Discount {
        let now = Utc::now();
        Discount {
            id: DiscountId::new(1),
            code: "SPRING10".to_owned(),
            kind: DiscountKind::Percentage,
            value: Decimal::TEN,
            min_subtotal: Some(Decimal::new(5000, 2)),
            starts_at: Some(now - Duration::days(1)),
            ends_at: Some(now + Duration::days(1)),
            usage_limit: Some(2),
            usage_count: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_redeemable_inside_window() {
        assert!(discount().is_redeemable(Utc::now(), Decimal::ONE_HUNDRED));
    }

    #[test]
    fn test_not_redeemable_below_minimum() {
        assert!(!discount().is_redeemable(Utc::now(), Decimal::TEN));
    }

    #[test]
    fn test_not_redeemable_when_exhausted_or_expired() {
        let mut d = discount();
        d.usage_count = 2;
        assert!(!d.is_redeemable(Utc::now(), Decimal::ONE_HUNDRED));

        let d = discount();
        assert!(!d.is_redeemable(Utc::now() + Duration::days(2), Decimal::ONE_HUNDRED));
    }
}
