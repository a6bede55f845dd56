//! Admin dashboard aggregates.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    /// Order count keyed by status label.
    pub orders_by_status: BTreeMap<String, i64>,
    /// Revenue from orders paid in the last 30 days, net of refunds.
    pub revenue_30d: Decimal,
    pub paid_orders_30d: i64,
    pub pending_refunds: i64,
    pub failed_webhooks: i64,
    pub low_stock_skus: i64,
}
