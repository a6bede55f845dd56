//! Order models.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::pricing::OrderTotals;
use atelier_core::{Email, OrderId, OrderItemId, OrderStatus, PaymentStatus, SkuId, UserId};

use super::refund::Refund;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: Option<UserId>,
    #[serde(skip_serializing)]
    pub cart_id: Option<Uuid>,
    pub email: Email,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub refunded_total: Decimal,
    pub currency: String,
    pub discount_code: Option<String>,
    pub checkout_session_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub disputed: bool,
    pub shipping_name: String,
    pub shipping_line1: String,
    pub shipping_line2: Option<String>,
    pub shipping_city: String,
    pub shipping_postal_code: String,
    pub shipping_country: String,
    pub tracking_number: Option<String>,
    pub restocked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Amount that can still be refunded.
    #[must_use]
    pub fn refundable_amount(&self) -> Decimal {
        (self.total - self.refunded_total).max(Decimal::ZERO)
    }

    /// Whether a customer may cancel this order themselves.
    #[must_use]
    pub fn is_customer_cancellable(&self) -> bool {
        self.status == OrderStatus::Processing && self.payment_status == PaymentStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub sku_id: Option<SkuId>,
    pub product_name: String,
    pub sku_code: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// An order with its items and refunds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub refunds: Vec<Refund>,
}

/// Shipping address captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

/// A new order, inserted together with its items.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub user_id: Option<UserId>,
    pub cart_id: Option<Uuid>,
    pub email: Email,
    pub totals: OrderTotals,
    pub currency: String,
    pub discount_code: Option<String>,
    pub shipping: ShippingAddress,
}

/// A line to insert; stock for `sku_id` is decremented by `quantity`.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub sku_id: SkuId,
    pub product_name: String,
    pub sku_code: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Sort order for admin order listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    #[default]
    Newest,
    Oldest,
    TotalDesc,
    TotalAsc,
}

impl OrderSort {
    pub(crate) const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => " ORDER BY created_at DESC, id DESC",
            Self::Oldest => " ORDER BY created_at ASC, id ASC",
            Self::TotalDesc => " ORDER BY total DESC, id DESC",
            Self::TotalAsc => " ORDER BY total ASC, id ASC",
        }
    }
}

/// Filters for admin order listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    /// Matches order number or email.
    pub q: Option<String>,
    /// Inclusive lower bound on the creation date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the creation date.
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub sort: OrderSort,
}
