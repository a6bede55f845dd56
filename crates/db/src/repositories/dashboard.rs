//! Dashboard aggregates.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sqlx::PgPool;

use atelier_core::{OrderStatus, WebhookEventStatus};

use super::{ProductRepository, RefundRepository, WebhookEventRepository};
use crate::RepositoryError;
use crate::models::DashboardStats;

/// SKUs at or below this many units count as low stock.
pub const LOW_STOCK_THRESHOLD: i32 = 5;

/// Read-only queries for the admin dashboard.
pub struct DashboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DashboardRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Collect the dashboard numbers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if any query fails.
    pub async fn stats(&self) -> Result<DashboardStats, RepositoryError> {
        let rows = sqlx::query_as::<_, (OrderStatus, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status",
        )
        .fetch_all(self.pool)
        .await?;

        let mut orders_by_status: BTreeMap<String, i64> = OrderStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_owned(), 0))
            .collect();
        for (status, count) in rows {
            orders_by_status.insert(status.as_str().to_owned(), count);
        }

        let (revenue_30d, paid_orders_30d) = sqlx::query_as::<_, (Decimal, i64)>(
            r"
            SELECT COALESCE(SUM(total - refunded_total), 0), COUNT(*)
            FROM orders
            WHERE paid_at >= now() - INTERVAL '30 days'
              AND payment_status IN ('paid', 'partially_refunded', 'refunded')
            ",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(DashboardStats {
            orders_by_status,
            revenue_30d,
            paid_orders_30d,
            pending_refunds: RefundRepository::new(self.pool).count_pending().await?,
            failed_webhooks: WebhookEventRepository::new(self.pool)
                .count_by_status(WebhookEventStatus::Failed)
                .await?,
            low_stock_skus: ProductRepository::new(self.pool)
                .count_low_stock(LOW_STOCK_THRESHOLD)
                .await?,
        })
    }
}
