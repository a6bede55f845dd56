//! Refund repository.

use sqlx::PgPool;

use atelier_core::{OrderId, PageParams, RefundId, RefundStatus, UserId};

use crate::RepositoryError;
use crate::models::{NewRefund, Refund, RefundWithOrder};

const REFUND_COLUMNS: &str = "id, order_id, amount, reason, note, restock, status, \
     provider_refund_id, failure_reason, attempts, requested_by, processed_by, created_at, processed_at";

/// Repository for refunds.
pub struct RefundRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> RefundRepository<'a> {
    /// Create a new refund repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create a `PENDING` refund.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn create(&self, input: &NewRefund) -> Result<Refund, RepositoryError> {
        sqlx::query_as::<_, Refund>(&format!(
            r"
            INSERT INTO refunds (order_id, amount, reason, note, restock, requested_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {REFUND_COLUMNS}
            "
        ))
        .bind(input.order_id)
        .bind(input.amount)
        .bind(input.reason)
        .bind(input.note.as_deref())
        .bind(input.restock)
        .bind(input.requested_by)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })
    }

    /// Get a refund by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: RefundId) -> Result<Option<Refund>, RepositoryError> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(refund)
    }

    /// Refunds of an order, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<Refund>, RepositoryError> {
        let refunds = sqlx::query_as::<_, Refund>(&format!(
            "SELECT {REFUND_COLUMNS} FROM refunds WHERE order_id = $1 ORDER BY created_at, id"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;

        Ok(refunds)
    }

    /// Sum of refunds for an order that are pending or approved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn committed_amount(
        &self,
        order_id: OrderId,
    ) -> Result<rust_decimal::Decimal, RepositoryError> {
        let sum = sqlx::query_scalar::<_, rust_decimal::Decimal>(
            r"
            SELECT COALESCE(SUM(amount), 0) FROM refunds
            WHERE order_id = $1 AND status IN ('pending', 'approved')
            ",
        )
        .bind(order_id)
        .fetch_one(self.pool)
        .await?;

        Ok(sum)
    }

    /// Whether the order already has a refund awaiting review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_pending(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM refunds WHERE order_id = $1 AND status = 'pending')",
        )
        .bind(order_id)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// List refunds with order details, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<RefundStatus>,
        page: PageParams,
    ) -> Result<(Vec<RefundWithOrder>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM refunds WHERE $1::refund_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let refunds = sqlx::query_as::<_, RefundWithOrder>(
            r"
            SELECT r.id, r.order_id, r.amount, r.reason, r.note, r.restock, r.status,
                   r.provider_refund_id, r.failure_reason, r.attempts, r.requested_by, r.processed_by,
                   r.created_at, r.processed_at,
                   o.order_number, o.email AS order_email
            FROM refunds r
            JOIN orders o ON o.id = r.order_id
            WHERE $1::refund_status IS NULL OR r.status = $1
            ORDER BY r.created_at DESC, r.id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((refunds, total))
    }

    /// Move a refund from `from` to `to`, recording who processed it.
    ///
    /// Moving to `FAILED` counts a failed provider attempt.
    ///
    /// Returns `None` if the refund was not in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition(
        &self,
        id: RefundId,
        from: RefundStatus,
        to: RefundStatus,
        update: RefundUpdate<'_>,
    ) -> Result<Option<Refund>, RepositoryError> {
        let refund = sqlx::query_as::<_, Refund>(&format!(
            r"
            UPDATE refunds SET
                status = $3,
                processed_by = COALESCE($4, processed_by),
                provider_refund_id = COALESCE($5, provider_refund_id),
                failure_reason = $6,
                attempts = attempts + CASE WHEN $3 = 'failed'::refund_status THEN 1 ELSE 0 END,
                note = COALESCE($7, note),
                restock = COALESCE($8, restock),
                processed_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {REFUND_COLUMNS}
            "
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(update.processed_by)
        .bind(update.provider_refund_id)
        .bind(update.failure_reason)
        .bind(update.note)
        .bind(update.restock)
        .fetch_optional(self.pool)
        .await?;

        Ok(refund)
    }

    /// Number of refunds awaiting review.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_pending(&self) -> Result<i64, RepositoryError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM refunds WHERE status = 'pending'")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }
}

/// Columns written alongside a refund status change.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefundUpdate<'a> {
    pub processed_by: Option<UserId>,
    pub provider_refund_id: Option<&'a str>,
    /// Cleared when `None`.
    pub failure_reason: Option<&'a str>,
    pub note: Option<&'a str>,
    pub restock: Option<bool>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::RefundReason;

    use super::*;
    use crate::fixtures::{order_for, paid, price, sku_with_stock};

    async fn pending_refund(pool: &PgPool) -> Refund {
        let sku = sku_with_stock(pool, "silk-tie", 3).await;
        let order = order_for(pool, "ORD-REFUND", &sku, 1).await;
        let order = paid(pool, &order).await;

        RefundRepository::new(pool)
            .create(&NewRefund {
                order_id: order.id,
                amount: price("10.00"),
                reason: RefundReason::Damaged,
                note: None,
                restock: true,
                requested_by: None,
            })
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_failed_attempts_are_counted(pool: PgPool) {
        let refund = pending_refund(&pool).await;
        assert_eq!(refund.status, RefundStatus::Pending);
        assert_eq!(refund.attempts, 0);

        let refunds = RefundRepository::new(&pool);
        let failed = refunds
            .transition(
                refund.id,
                RefundStatus::Pending,
                RefundStatus::Failed,
                RefundUpdate {
                    failure_reason: Some("card_declined"),
                    ..RefundUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.attempts, 1);
        assert_eq!(failed.failure_reason.as_deref(), Some("card_declined"));

        let approved = refunds
            .transition(
                refund.id,
                RefundStatus::Failed,
                RefundStatus::Approved,
                RefundUpdate {
                    provider_refund_id: Some("re_1"),
                    ..RefundUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.attempts, 1);
        assert!(approved.failure_reason.is_none());
        assert_eq!(approved.provider_refund_id.as_deref(), Some("re_1"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_stale_transition_returns_none(pool: PgPool) {
        let refund = pending_refund(&pool).await;
        let refunds = RefundRepository::new(&pool);

        refunds
            .transition(
                refund.id,
                RefundStatus::Pending,
                RefundStatus::Rejected,
                RefundUpdate::default(),
            )
            .await
            .unwrap()
            .unwrap();

        let late = refunds
            .transition(
                refund.id,
                RefundStatus::Pending,
                RefundStatus::Approved,
                RefundUpdate::default(),
            )
            .await
            .unwrap();
        assert!(late.is_none());
        assert_eq!(
            refunds.get(refund.id).await.unwrap().unwrap().status,
            RefundStatus::Rejected
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_committed_amount_ignores_rejected(pool: PgPool) {
        let refund = pending_refund(&pool).await;
        let refunds = RefundRepository::new(&pool);
        assert_eq!(
            refunds.committed_amount(refund.order_id).await.unwrap(),
            price("10.00")
        );

        refunds
            .transition(
                refund.id,
                RefundStatus::Pending,
                RefundStatus::Rejected,
                RefundUpdate::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            refunds.committed_amount(refund.order_id).await.unwrap(),
            rust_decimal::Decimal::ZERO
        );
    }
}
