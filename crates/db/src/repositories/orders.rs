//! Order repository.
//!
//! Status changes are compare-and-set updates: the expected current status is
//! part of the `WHERE` clause, and `None` is returned when another writer got
//! there first. Stock is returned at most once per order, guarded by
//! `orders.restocked_at`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use atelier_core::{OrderId, OrderStatus, PageParams, PaymentStatus, UserId};

use super::discounts::DiscountRepository;
use super::refunds::RefundRepository;
use crate::RepositoryError;
use crate::models::{NewOrder, NewOrderItem, Order, OrderDetail, OrderFilter, OrderItem};

const ORDER_COLUMNS: &str = "id, order_number, user_id, cart_id, email, status, payment_status, \
     subtotal, discount_total, tax_total, total, refunded_total, currency, discount_code, \
     checkout_session_id, payment_intent_id, disputed, shipping_name, shipping_line1, \
     shipping_line2, shipping_city, shipping_postal_code, shipping_country, tracking_number, \
     restocked_at, created_at, updated_at, paid_at, shipped_at, delivered_at, cancelled_at";

const ITEM_COLUMNS: &str =
    "id, order_id, sku_id, product_name, sku_code, quantity, unit_price, line_total";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(payment_status) = filter.payment_status {
        qb.push(" AND payment_status = ").push_bind(payment_status);
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{q}%");
        qb.push(" AND (order_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from) = filter.from {
        qb.push(" AND created_at >= ").push_bind(from.and_time(chrono::NaiveTime::MIN).and_utc());
    }
    if let Some(to) = filter.to
        && let Some(next_day) = to.succ_opt()
    {
        qb.push(" AND created_at < ")
            .push_bind(next_day.and_time(chrono::NaiveTime::MIN).and_utc());
    }
}

/// Put an order's items back into stock, once.
///
/// Returns `false` if the order was already restocked.
async fn restock_in(conn: &mut PgConnection, id: OrderId) -> Result<bool, RepositoryError> {
    let claimed = sqlx::query_scalar::<_, OrderId>(
        "UPDATE orders SET restocked_at = now(), updated_at = now() \
         WHERE id = $1 AND restocked_at IS NULL RETURNING id",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    if claimed.is_none() {
        return Ok(false);
    }

    sqlx::query(
        r"
        UPDATE product_skus s SET stock = s.stock + oi.quantity, updated_at = now()
        FROM (
            SELECT sku_id, SUM(quantity)::INTEGER AS quantity
            FROM order_items
            WHERE order_id = $1 AND sku_id IS NOT NULL
            GROUP BY sku_id
        ) oi
        WHERE s.id = oi.sku_id
        ",
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

/// Repository for orders and order items.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Insert an order with its items and decrement stock, atomically.
    ///
    /// SKU rows are locked (`FOR UPDATE`, in id order) before the guarded
    /// decrement, so concurrent checkouts for the last unit serialize and
    /// exactly one of them succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if any SKU lacks stock or the order
    /// number collides. Nothing is written in that case.
    pub async fn create_with_items(
        &self,
        order: &NewOrder,
        items: &[NewOrderItem],
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut sku_ids: Vec<i32> = items.iter().map(|i| i.sku_id.as_i32()).collect();
        sku_ids.sort_unstable();
        sku_ids.dedup();
        sqlx::query("SELECT id FROM product_skus WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(&sku_ids)
            .execute(&mut *tx)
            .await?;

        for item in items {
            let result = sqlx::query(
                "UPDATE product_skus SET stock = stock - $2, updated_at = now() \
                 WHERE id = $1 AND stock >= $2",
            )
            .bind(item.sku_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::Conflict(format!(
                    "insufficient stock for {}",
                    item.sku_code
                )));
            }
        }

        let created = sqlx::query_as::<_, Order>(&format!(
            r"
            INSERT INTO orders (
                order_number, user_id, cart_id, email, subtotal, discount_total, tax_total,
                total, currency, discount_code, shipping_name, shipping_line1, shipping_line2,
                shipping_city, shipping_postal_code, shipping_country
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(order.cart_id)
        .bind(&order.email)
        .bind(order.totals.subtotal)
        .bind(order.totals.discount_total)
        .bind(order.totals.tax_total)
        .bind(order.totals.total)
        .bind(&order.currency)
        .bind(order.discount_code.as_deref())
        .bind(&order.shipping.name)
        .bind(&order.shipping.line1)
        .bind(order.shipping.line2.as_deref())
        .bind(&order.shipping.city)
        .bind(&order.shipping.postal_code)
        .bind(&order.shipping.country)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "order number already exists"))?;

        let mut insert = QueryBuilder::<Postgres>::new(
            "INSERT INTO order_items \
             (order_id, sku_id, product_name, sku_code, quantity, unit_price, line_total) ",
        );
        insert.push_values(items, |mut row, item| {
            row.push_bind(created.id)
                .push_bind(item.sku_id)
                .push_bind(item.product_name.clone())
                .push_bind(item.sku_code.clone())
                .push_bind(item.quantity)
                .push_bind(item.unit_price)
                .push_bind(atelier_core::pricing::line_total(item.unit_price, item.quantity));
        });
        insert.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(created)
    }

    /// Record the provider checkout session for an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order doesn't exist.
    pub async fn set_checkout_session(
        &self,
        id: OrderId,
        session_id: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET checkout_session_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(session_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get an order by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Get an order by id if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_for_user(
        &self,
        id: OrderId,
        user_id: UserId,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Get an order by its provider checkout session.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE checkout_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Get an order by its provider payment intent.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_intent_id = $1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Items of an order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn items(&self, id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(&format!(
            "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY id"
        ))
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Slugs of the products an order's items belong to.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn product_slugs(&self, id: OrderId) -> Result<Vec<String>, RepositoryError> {
        let slugs = sqlx::query_scalar::<_, String>(
            r"
            SELECT DISTINCT p.slug
            FROM order_items oi
            JOIN product_skus s ON s.id = oi.sku_id
            JOIN products p ON p.id = s.product_id
            WHERE oi.order_id = $1
            ORDER BY p.slug
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(slugs)
    }

    /// Order with items and refunds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn detail(&self, order: Order) -> Result<OrderDetail, RepositoryError> {
        let items = self.items(order.id).await?;
        let refunds = RefundRepository::new(self.pool).list_for_order(order.id).await?;
        Ok(OrderDetail {
            order,
            items,
            refunds,
        })
    }

    /// List orders for the admin with filters.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: PageParams,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders WHERE TRUE");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders WHERE TRUE"));
        push_filters(&mut select, filter);
        select
            .push(filter.sort.order_by())
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let orders = select.build_query_as::<Order>().fetch_all(self.pool).await?;

        Ok((orders, total))
    }

    /// A customer's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        page: PageParams,
    ) -> Result<(Vec<Order>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((orders, total))
    }

    /// Orders still awaiting payment that were created before `cutoff` and
    /// have a checkout session to look up.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_pending_payment(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE payment_status = 'pending' AND status = 'processing'
              AND checkout_session_id IS NOT NULL AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(orders)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move an order from `from` to `to`, stamping the matching timestamp.
    ///
    /// Returns `None` if the order was not in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders SET
                status = $3,
                tracking_number = COALESCE($4, tracking_number),
                paid_at = CASE WHEN $3 = 'paid' THEN COALESCE(paid_at, now()) ELSE paid_at END,
                shipped_at = CASE WHEN $3 = 'shipped' THEN now() ELSE shipped_at END,
                delivered_at = CASE WHEN $3 = 'delivered' THEN now() ELSE delivered_at END,
                cancelled_at = CASE WHEN $3 = 'cancelled' THEN now() ELSE cancelled_at END,
                updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(tracking_number)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Move the payment status from `from` to `to`.
    ///
    /// Returns `None` if the payment was not in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition_payment(
        &self,
        id: OrderId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders SET payment_status = $3, updated_at = now()
            WHERE id = $1 AND payment_status = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(from)
        .bind(to)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Mark an order paid, then clear its cart and count its discount, in one
    /// transaction.
    ///
    /// Only orders whose payment is `PENDING` or `FAILED` and that are not
    /// cancelled are updated. Returns `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn mark_paid(
        &self,
        id: OrderId,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders SET
                payment_status = 'paid',
                status = CASE WHEN status = 'processing' THEN 'paid'::order_status ELSE status END,
                payment_intent_id = COALESCE($2, payment_intent_id),
                paid_at = now(),
                updated_at = now()
            WHERE id = $1
              AND payment_status IN ('pending', 'failed')
              AND status <> 'cancelled'
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(cart_id) = order.cart_id {
            sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                .bind(cart_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(code) = order.discount_code.as_deref()
            && !DiscountRepository::record_usage(&mut tx, code).await?
        {
            tracing::warn!(order_id = %order.id, code, "discount usage limit reached at payment");
        }

        tx.commit().await?;
        Ok(Some(order))
    }

    /// Cancel an order that is currently `from` and return its stock.
    ///
    /// Returns `None` if the order was not in `from`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn cancel_and_restock(
        &self,
        id: OrderId,
        from: OrderStatus,
        restock: bool,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query_scalar::<_, OrderId>(
            r"
            UPDATE orders SET status = 'cancelled', cancelled_at = now(), updated_at = now()
            WHERE id = $1 AND status = $2
            RETURNING id
            ",
        )
        .bind(id)
        .bind(from)
        .fetch_optional(&mut *tx)
        .await?;

        if cancelled.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        if restock {
            restock_in(&mut tx, id).await?;
        }

        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(order))
    }

    /// Return an order's items to stock if that has not happened yet.
    ///
    /// Returns whether stock was returned by this call.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn restock(&self, id: OrderId) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let restocked = restock_in(&mut tx, id).await?;
        tx.commit().await?;
        Ok(restocked)
    }

    /// Bring `refunded_total` up to the provider's figure. Never lowers it.
    ///
    /// Returns `None` if the payment is not captured.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sync_refunded_total(
        &self,
        id: OrderId,
        provider_refunded: Decimal,
    ) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            r"
            UPDATE orders SET
                refunded_total = LEAST(GREATEST(refunded_total, $2), total),
                payment_status = CASE
                    WHEN GREATEST(refunded_total, $2) >= total THEN 'refunded'::payment_status
                    WHEN GREATEST(refunded_total, $2) > 0 THEN 'partially_refunded'::payment_status
                    ELSE payment_status
                END,
                updated_at = now()
            WHERE id = $1 AND payment_status IN ('paid', 'partially_refunded')
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(id)
        .bind(provider_refunded)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }

    /// Flag an order as disputed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_disputed(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders SET disputed = TRUE, updated_at = now() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(order)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{item, new_order, order_for, sku_with_stock, stock_of};

    #[sqlx::test(migrations = "./migrations")]
    async fn test_last_unit_sells_once(pool: PgPool) {
        let sku = sku_with_stock(&pool, "last-scarf", 1).await;
        let orders = OrderRepository::new(&pool);
        let first_items = [item(&sku, 1)];
        let second_items = [item(&sku, 1)];

        let first_order = new_order("ORD-A", "25.00");
        let second_order = new_order("ORD-B", "25.00");
        let (first, second) = tokio::join!(
            orders.create_with_items(&first_order, &first_items),
            orders.create_with_items(&second_order, &second_items),
        );

        let sold = [first.is_ok(), second.is_ok()];
        assert_eq!(sold.iter().filter(|ok| **ok).count(), 1);
        for result in [first, second] {
            if let Err(e) = result {
                assert!(matches!(e, RepositoryError::Conflict(_)), "{e:?}");
            }
        }
        assert_eq!(stock_of(&pool, sku.id).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_short_stock_writes_nothing(pool: PgPool) {
        let plenty = sku_with_stock(&pool, "plenty", 10).await;
        let short = sku_with_stock(&pool, "short", 2).await;

        let result = OrderRepository::new(&pool)
            .create_with_items(
                &new_order("ORD-SHORT", "125.00"),
                &[item(&plenty, 2), item(&short, 3)],
            )
            .await;

        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
        assert_eq!(stock_of(&pool, plenty.id).await, 10);
        assert_eq!(stock_of(&pool, short.id).await, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_restock_happens_once(pool: PgPool) {
        let sku = sku_with_stock(&pool, "linen-shirt", 5).await;
        let order = order_for(&pool, "ORD-RESTOCK", &sku, 2).await;
        assert_eq!(stock_of(&pool, sku.id).await, 3);

        let orders = OrderRepository::new(&pool);
        let cancelled = orders
            .cancel_and_restock(order.id, OrderStatus::Processing, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.restocked_at.is_some());
        assert_eq!(stock_of(&pool, sku.id).await, 5);

        assert!(!orders.restock(order.id).await.unwrap());
        assert_eq!(stock_of(&pool, sku.id).await, 5);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_cancel_without_restock_keeps_stock_claimable(pool: PgPool) {
        let sku = sku_with_stock(&pool, "wool-coat", 4).await;
        let order = order_for(&pool, "ORD-KEEP", &sku, 1).await;
        let orders = OrderRepository::new(&pool);

        orders
            .cancel_and_restock(order.id, OrderStatus::Processing, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stock_of(&pool, sku.id).await, 3);

        assert!(orders.restock(order.id).await.unwrap());
        assert_eq!(stock_of(&pool, sku.id).await, 4);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_stale_status_is_not_overwritten(pool: PgPool) {
        let sku = sku_with_stock(&pool, "beret", 3).await;
        let order = order_for(&pool, "ORD-STALE", &sku, 1).await;
        let orders = OrderRepository::new(&pool);

        let stale = orders
            .transition_status(order.id, OrderStatus::Paid, OrderStatus::Shipped, None)
            .await
            .unwrap();
        assert!(stale.is_none());

        let stale_payment = orders
            .transition_payment(order.id, PaymentStatus::Paid, PaymentStatus::Refunded)
            .await
            .unwrap();
        assert!(stale_payment.is_none());

        let stale_cancel = orders
            .cancel_and_restock(order.id, OrderStatus::Shipped, true)
            .await
            .unwrap();
        assert!(stale_cancel.is_none());
        assert_eq!(stock_of(&pool, sku.id).await, 2);

        let current = orders.get(order.id).await.unwrap().unwrap();
        assert_eq!(current.status, OrderStatus::Processing);
        assert_eq!(current.payment_status, PaymentStatus::Pending);
        assert!(current.restocked_at.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_mark_paid_only_once(pool: PgPool) {
        let sku = sku_with_stock(&pool, "gloves", 3).await;
        let order = order_for(&pool, "ORD-PAID", &sku, 1).await;
        let orders = OrderRepository::new(&pool);

        let paid = orders.mark_paid(order.id, Some("pi_1")).await.unwrap().unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_1"));

        assert!(orders.mark_paid(order.id, Some("pi_2")).await.unwrap().is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_product_slugs(pool: PgPool) {
        let coat = sku_with_stock(&pool, "wool-coat", 3).await;
        let scarf = sku_with_stock(&pool, "scarf", 3).await;
        let order = OrderRepository::new(&pool)
            .create_with_items(
                &new_order("ORD-SLUGS", "75.00"),
                &[item(&scarf, 1), item(&coat, 1), item(&scarf, 1)],
            )
            .await
            .unwrap();

        let slugs = OrderRepository::new(&pool).product_slugs(order.id).await.unwrap();
        assert_eq!(slugs, vec!["scarf", "wool-coat"]);
    }
}
