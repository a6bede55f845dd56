//! Refund models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use atelier_core::{OrderId, RefundId, RefundReason, RefundStatus, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Refund {
    pub id: RefundId,
    pub order_id: OrderId,
    pub amount: Decimal,
    pub reason: RefundReason,
    pub note: Option<String>,
    pub restock: bool,
    pub status: RefundStatus,
    pub provider_refund_id: Option<String>,
    pub failure_reason: Option<String>,
    /// Failed provider attempts so far.
    pub attempts: i32,
    pub requested_by: Option<UserId>,
    pub processed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// A refund with the number and email of its order, for admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct RefundWithOrder {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub refund: Refund,
    pub order_number: String,
    pub order_email: String,
}

#[derive(Debug, Clone)]
pub struct NewRefund {
    pub order_id: OrderId,
    pub amount: Decimal,
    pub reason: RefundReason,
    pub note: Option<String>,
    pub restock: bool,
    pub requested_by: Option<UserId>,
}
