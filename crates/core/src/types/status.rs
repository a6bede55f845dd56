//! Status enums and their transition tables.
//!
//! Every status change in Atelier goes through `can_transition_to` before the
//! database update is attempted; the update itself is a compare-and-set on the
//! status that was read, so a concurrent writer makes the second update a no-op.

use serde::{Deserialize, Serialize};

/// Implements `as_str`, `Display` and a case-insensitive `FromStr` over the
/// snake_case names that are also used for the Postgres enum labels.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// All variants, in declaration order.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Database/wire label for this variant.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Storefront shopper.
    #[default]
    Customer,
    /// Back-office operator.
    Admin,
}

string_enum!(UserRole {
    Customer => "customer",
    Admin => "admin",
});

/// Order lifecycle status.
///
/// ```text
/// PROCESSING ──> PAID ──> SHIPPED ──> DELIVERED
///     │           │ └────────────────────^
///     └───────────┴──> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Processing,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus {
    Processing => "processing",
    Paid => "paid",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Whether an order in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Paid | Self::Cancelled)
                | (Self::Paid, Self::Shipped | Self::Delivered | Self::Cancelled)
                | (Self::Shipped, Self::Delivered)
        )
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

/// Payment status of an order.
///
/// `PENDING → PAID → PARTIALLY_REFUNDED → REFUNDED`, plus `PENDING → FAILED`
/// and `FAILED → PAID` when the customer retries a declined payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "payment_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    PartiallyRefunded,
    Refunded,
    Failed,
}

string_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    PartiallyRefunded => "partially_refunded",
    Refunded => "refunded",
    Failed => "failed",
});

impl PaymentStatus {
    /// Whether a payment in this status may move to `next`.
    ///
    /// `PARTIALLY_REFUNDED → PARTIALLY_REFUNDED` is allowed so a second partial
    /// refund can be recorded.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Paid | Self::Failed)
                | (Self::Failed, Self::Paid)
                | (Self::Paid, Self::PartiallyRefunded | Self::Refunded)
                | (
                    Self::PartiallyRefunded,
                    Self::PartiallyRefunded | Self::Refunded
                )
        )
    }

    /// Whether money has been captured for the order (refunds are possible).
    #[must_use]
    pub const fn is_captured(self) -> bool {
        matches!(self, Self::Paid | Self::PartiallyRefunded)
    }
}

/// Refund request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "refund_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    /// The provider refused the refund; an admin may approve it again.
    Failed,
}

string_enum!(RefundStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Failed => "failed",
});

impl RefundStatus {
    /// Whether a refund in this status may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending | Self::Failed,
                Self::Approved | Self::Rejected | Self::Failed
            )
        )
    }
}

/// Reason code attached to a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "refund_reason", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundReason {
    CustomerRequest,
    WrongItem,
    Damaged,
    Defective,
    Fraudulent,
    Other,
}

string_enum!(RefundReason {
    CustomerRequest => "customer_request",
    WrongItem => "wrong_item",
    Damaged => "damaged",
    Defective => "defective",
    Fraudulent => "fraudulent",
    Other => "other",
});

impl RefundReason {
    /// Whether returned goods go back into sellable stock unless the admin
    /// says otherwise.
    ///
    /// Only unopened returns qualify: a customer changing their mind or the
    /// wrong item being shipped. Damaged or defective goods never do.
    #[must_use]
    pub const fn should_restock_by_default(self) -> bool {
        matches!(self, Self::CustomerRequest | Self::WrongItem)
    }

    /// Reason string accepted by the payment provider's refund API.
    #[must_use]
    pub const fn provider_reason(self) -> &'static str {
        match self {
            Self::Fraudulent => "fraudulent",
            _ => "requested_by_customer",
        }
    }
}

/// Free function form of [`RefundReason::should_restock_by_default`].
#[must_use]
pub const fn should_restock_by_default(reason: RefundReason) -> bool {
    reason.should_restock_by_default()
}

/// Discount calculation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "discount_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    /// `value` is a percentage greater than 0 and at most 100.
    Percentage,
    /// `value` is an amount in the store currency.
    FixedAmount,
}

string_enum!(DiscountKind {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
});

/// Processing status of a recorded payment webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "webhook_event_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventStatus {
    /// Received but not yet applied, or applied unsuccessfully and awaiting retry.
    #[default]
    Pending,
    Processed,
    /// Retry budget exhausted.
    Failed,
}

string_enum!(WebhookEventStatus {
    Pending => "pending",
    Processed => "processed",
    Failed => "failed",
});

/// Newsletter subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "subscription_status", rename_all = "snake_case")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    #[default]
    Subscribed,
    Unsubscribed,
}

string_enum!(SubscriptionStatus {
    Subscribed => "subscribed",
    Unsubscribed => "unsubscribed",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_should_restock_by_default() {
        assert!(should_restock_by_default(RefundReason::CustomerRequest));
        assert!(should_restock_by_default(RefundReason::WrongItem));

        for reason in [
            RefundReason::Damaged,
            RefundReason::Defective,
            RefundReason::Fraudulent,
            RefundReason::Other,
        ] {
            assert!(!should_restock_by_default(reason), "{reason} restocked");
        }
    }

    #[test]
    fn test_order_status_transitions() {
        use OrderStatus::{Cancelled, Delivered, Paid, Processing, Shipped};

        assert!(Processing.can_transition_to(Paid));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Paid.can_transition_to(Delivered));
        assert!(Paid.can_transition_to(Cancelled));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Processing.can_transition_to(Delivered));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Delivered.can_transition_to(Processing));
        assert!(!Cancelled.can_transition_to(Paid));

        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(*status), "{status} self-loop");
        }
    }

    #[test]
    fn test_terminal_order_statuses_have_no_exits() {
        for from in OrderStatus::ALL.iter().filter(|s| s.is_terminal()) {
            for to in OrderStatus::ALL {
                assert!(!from.can_transition_to(*to));
            }
        }
    }

    #[test]
    fn test_payment_status_transitions() {
        use PaymentStatus::{Failed, Paid, PartiallyRefunded, Pending, Refunded};

        assert!(Pending.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(PartiallyRefunded));
        assert!(PartiallyRefunded.can_transition_to(PartiallyRefunded));
        assert!(PartiallyRefunded.can_transition_to(Refunded));
        assert!(Pending.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Paid));

        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Refunded));
    }

    #[test]
    fn test_refund_status_transitions() {
        assert!(RefundStatus::Pending.can_transition_to(RefundStatus::Approved));
        assert!(RefundStatus::Failed.can_transition_to(RefundStatus::Approved));
        assert!(!RefundStatus::Approved.can_transition_to(RefundStatus::Rejected));
        assert!(!RefundStatus::Rejected.can_transition_to(RefundStatus::Approved));
    }

    #[test]
    fn test_string_round_trip() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>(), Ok(*status));
        }
        assert_eq!("ADMIN".parse::<UserRole>(), Ok(UserRole::Admin));
        assert!("owner".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&RefundReason::CustomerRequest).unwrap();
        assert_eq!(json, "\"CUSTOMER_REQUEST\"");
        let parsed: PaymentStatus = serde_json::from_str("\"PARTIALLY_REFUNDED\"").unwrap();
        assert_eq!(parsed, PaymentStatus::PartiallyRefunded);
    }
}
