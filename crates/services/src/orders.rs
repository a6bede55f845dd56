//! Order lifecycle operations shared by the storefront, admin, webhooks and
//! jobs: checkout, payment confirmation, cancellation, status changes and
//! refunds.
//!
//! Every status change reads the row, checks the transition table in
//! `atelier_core`, then performs a compare-and-set update. A `None` from the
//! update means another request got there first and surfaces as
//! [`OrderOpsError::Conflict`].

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use atelier_core::pricing::{DiscountRule, OrderTotals};
use atelier_core::{
    Email, OrderId, OrderStatus, PaymentStatus, RefundId, RefundReason, RefundStatus, UserId,
    generate_order_number, should_restock_by_default,
};
use atelier_db::models::{NewOrder, NewOrderItem, NewRefund, Order, Refund, ShippingAddress};
use atelier_db::{
    CartRepository, DiscountRepository, OrderRepository, RefundRepository, RefundUpdate,
    RepositoryError,
};

use crate::email::EmailService;
use crate::payments::{CheckoutRequest, PaymentClient, PaymentError, RefundRequest};
use crate::revalidate::{CatalogInvalidation, tags};

/// Errors from order lifecycle operations.
#[derive(Debug, Error)]
pub enum OrderOpsError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Input the caller can fix.
    #[error("{0}")]
    Validation(String),

    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The row changed under us.
    #[error("{0}")]
    Conflict(String),
}

impl OrderOpsError {
    fn transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

/// Everything checkout needs besides the cart contents.
#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub cart_id: Uuid,
    pub user_id: Option<UserId>,
    pub email: Email,
    pub shipping: ShippingAddress,
    pub discount_code: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// A created order and where to send the customer to pay.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub checkout_url: String,
}

/// A refund to create in `PENDING`.
#[derive(Debug, Clone)]
pub struct RefundInput {
    pub order_id: OrderId,
    /// Defaults to everything still refundable.
    pub amount: Option<Decimal>,
    pub reason: RefundReason,
    pub note: Option<String>,
    /// Defaults to [`should_restock_by_default`].
    pub restock: Option<bool>,
    pub requested_by: Option<UserId>,
}

/// How to cancel an order.
#[derive(Debug, Clone, Copy)]
pub struct CancelOptions {
    pub restock: bool,
    /// Expire the provider checkout session first, so an unpaid order
    /// can no longer be paid.
    pub expire_session: bool,
}

/// Order lifecycle service.
#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    payments: PaymentClient,
    email: EmailService,
    catalog: CatalogInvalidation,
}

impl OrderService {
    #[must_use]
    pub const fn new(pool: PgPool, payments: PaymentClient, email: EmailService) -> Self {
        Self {
            pool,
            payments,
            email,
            catalog: CatalogInvalidation::Disabled,
        }
    }

    /// Drop cached product pages through `catalog` whenever stock moves.
    #[must_use]
    pub fn with_catalog(self, catalog: CatalogInvalidation) -> Self {
        Self { catalog, ..self }
    }

    #[must_use]
    pub const fn payments(&self) -> &PaymentClient {
        &self.payments
    }

    #[must_use]
    pub const fn email(&self) -> &EmailService {
        &self.email
    }

    fn orders(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.pool)
    }

    fn refunds(&self) -> RefundRepository<'_> {
        RefundRepository::new(&self.pool)
    }

    // Best effort: the catalog cache expires on its own.
    async fn stock_changed(&self, order_id: OrderId) {
        match self.orders().product_slugs(order_id).await {
            Ok(slugs) => self.catalog.invalidate(tags::stock_changed(&slugs)).await,
            Err(e) => {
                tracing::warn!(order_id = %order_id, error = %e, "Could not load products for cache invalidation");
            }
        }
    }

    async fn get_order(&self, id: OrderId) -> Result<Order, OrderOpsError> {
        self.orders()
            .get(id)
            .await?
            .ok_or(OrderOpsError::NotFound("order"))
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Turn a cart into an order and a provider checkout session.
    ///
    /// The order and its stock decrements are written in one transaction. If
    /// the provider call fails the order is cancelled and restocked.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an empty or unavailable cart or a bad
    /// discount code, `Conflict` when stock ran out, and `Payment` when the
    /// provider call fails.
    #[tracing::instrument(skip(self, input), fields(cart_id = %input.cart_id))]
    pub async fn checkout(&self, input: CheckoutInput) -> Result<CheckoutOutcome, OrderOpsError> {
        validate_shipping(&input.shipping)?;

        let lines = CartRepository::new(&self.pool).lines(input.cart_id).await?;
        if lines.is_empty() {
            return Err(OrderOpsError::Validation("Your cart is empty".to_string()));
        }
        for line in &lines {
            if !line.is_active {
                return Err(OrderOpsError::Validation(format!(
                    "{} is no longer available",
                    line.product_name
                )));
            }
            if line.quantity > line.stock {
                return Err(OrderOpsError::Validation(format!(
                    "Only {} left of {}",
                    line.stock.max(0),
                    line.product_name
                )));
            }
        }

        let subtotal: Decimal = lines.iter().map(|l| l.line_total()).sum();
        let (discount_code, rule) = match input.discount_code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => {
                let (code, rule) = self.redeemable_discount(code, subtotal).await?;
                (Some(code), Some(rule))
            }
            _ => (None, None),
        };

        let totals = OrderTotals::compute(
            lines.iter().map(|l| (l.unit_price, l.quantity)),
            rule.as_ref(),
        );
        if totals.total <= Decimal::ZERO {
            return Err(OrderOpsError::Validation(
                "Order total must be greater than zero".to_string(),
            ));
        }

        let new_order = NewOrder {
            order_number: generate_order_number(),
            user_id: input.user_id,
            cart_id: Some(input.cart_id),
            email: input.email,
            totals,
            currency: self.payments.currency().code().to_string(),
            discount_code,
            shipping: input.shipping,
        };
        let items: Vec<NewOrderItem> = lines
            .iter()
            .map(|line| NewOrderItem {
                sku_id: line.sku_id,
                product_name: line.product_name.clone(),
                sku_code: line.sku_code.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        let order = match self.orders().create_with_items(&new_order, &items).await {
            Ok(order) => order,
            Err(RepositoryError::Conflict(message)) => return Err(OrderOpsError::Conflict(message)),
            Err(e) => return Err(e.into()),
        };
        tracing::info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, "Order created");
        self.stock_changed(order.id).await;

        let request = CheckoutRequest {
            order_id: order.id,
            order_number: &order.order_number,
            email: order.email.as_str(),
            total: order.total,
            success_url: &input.success_url,
            cancel_url: &input.cancel_url,
        };

        let session = match self.payments.create_checkout_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                self.abandon_checkout(order.id).await;
                return Err(e.into());
            }
        };

        let Some(checkout_url) = session.url.clone() else {
            self.abandon_checkout(order.id).await;
            return Err(PaymentError::Parse("checkout session has no url".to_string()).into());
        };

        self.orders().set_checkout_session(order.id, &session.id).await?;

        let order = Order {
            checkout_session_id: Some(session.id),
            ..order
        };
        Ok(CheckoutOutcome {
            order,
            checkout_url,
        })
    }

    async fn redeemable_discount(
        &self,
        code: &str,
        subtotal: Decimal,
    ) -> Result<(String, DiscountRule), OrderOpsError> {
        let discount = DiscountRepository::new(&self.pool)
            .get_by_code(code)
            .await?
            .ok_or_else(|| OrderOpsError::Validation("Unknown discount code".to_string()))?;

        if !discount.is_redeemable(Utc::now(), subtotal) {
            return Err(OrderOpsError::Validation(
                "This discount code cannot be used for this order".to_string(),
            ));
        }

        let rule = discount.rule().map_err(|e| {
            tracing::error!(code = %discount.code, error = %e, "Stored discount is invalid");
            OrderOpsError::Validation("This discount code cannot be used for this order".to_string())
        })?;
        Ok((discount.code, rule))
    }

    async fn abandon_checkout(&self, order_id: OrderId) {
        match self
            .orders()
            .cancel_and_restock(order_id, OrderStatus::Processing, true)
            .await
        {
            Ok(_) => {
                tracing::warn!(order_id = %order_id, "Checkout failed, order cancelled and restocked");
                self.stock_changed(order_id).await;
            }
            Err(e) => {
                tracing::error!(order_id = %order_id, error = %e, "Failed to cancel order after checkout failure");
            }
        }
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// Mark an order paid and send the confirmation email.
    ///
    /// Returns `None` when the order was already paid, refunded or cancelled.
    ///
    /// # Errors
    ///
    /// Returns error if the database update fails. Email failures are logged.
    pub async fn confirm_payment(
        &self,
        order_id: OrderId,
        payment_intent: Option<&str>,
    ) -> Result<Option<Order>, OrderOpsError> {
        let Some(order) = self.orders().mark_paid(order_id, payment_intent).await? else {
            tracing::debug!(order_id = %order_id, "Order not awaiting payment, nothing to confirm");
            return Ok(None);
        };
        tracing::info!(order_id = %order.id, "Order paid");

        match self.orders().items(order.id).await {
            Ok(items) => {
                if let Err(e) = self.email.send_order_confirmation(&order, &items).await {
                    tracing::error!(order_id = %order.id, error = %e, "Failed to send order confirmation");
                }
            }
            Err(e) => {
                tracing::error!(order_id = %order.id, error = %e, "Failed to load items for confirmation");
            }
        }

        Ok(Some(order))
    }

    // =========================================================================
    // Cancellation and status
    // =========================================================================

    /// Cancel an order.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the order can no longer be cancelled,
    /// and `Conflict` if it was paid or changed concurrently.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        options: CancelOptions,
    ) -> Result<Order, OrderOpsError> {
        let order = self.get_order(order_id).await?;
        if !order.status.can_transition_to(OrderStatus::Cancelled) {
            return Err(OrderOpsError::transition(order.status, OrderStatus::Cancelled));
        }

        if options.expire_session
            && order.payment_status == PaymentStatus::Pending
            && let Some(session_id) = order.checkout_session_id.as_deref()
        {
            self.expire_session(order.id, session_id).await?;
        }

        let cancelled = self
            .orders()
            .cancel_and_restock(order.id, order.status, options.restock)
            .await?
            .ok_or_else(|| OrderOpsError::Conflict("Order changed, please retry".to_string()))?;

        tracing::info!(order_id = %cancelled.id, restock = options.restock, "Order cancelled");
        if options.restock {
            self.stock_changed(cancelled.id).await;
        }
        Ok(cancelled)
    }

    async fn expire_session(&self, order_id: OrderId, session_id: &str) -> Result<(), OrderOpsError> {
        let Err(expire_err) = self.payments.expire_checkout_session(session_id).await else {
            return Ok(());
        };

        // Expiry fails for sessions that are already complete or expired.
        match self.payments.retrieve_checkout_session(session_id).await {
            Ok(session) if session.is_paid() => Err(OrderOpsError::Conflict(
                "Payment for this order has already been completed".to_string(),
            )),
            Ok(_) => {
                tracing::warn!(order_id = %order_id, error = %expire_err, "Checkout session not expired, continuing");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Cancel a customer's own unpaid order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the order belongs to `user_id`, and
    /// `Validation` unless it is still processing and unpaid.
    pub async fn cancel_for_customer(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<Order, OrderOpsError> {
        let order = self
            .orders()
            .get_for_user(order_id, user_id)
            .await?
            .ok_or(OrderOpsError::NotFound("order"))?;

        if !order.is_customer_cancellable() {
            return Err(OrderOpsError::Validation(
                "Only unpaid orders that are still processing can be cancelled".to_string(),
            ));
        }

        self.cancel_order(
            order.id,
            CancelOptions {
                restock: true,
                expire_session: true,
            },
        )
        .await
    }

    /// Move an order to `to`, recording a tracking number when shipping.
    ///
    /// Moving to `CANCELLED` cancels and restocks.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for moves the transition table forbids.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        to: OrderStatus,
        tracking_number: Option<&str>,
    ) -> Result<Order, OrderOpsError> {
        if to == OrderStatus::Cancelled {
            return self
                .cancel_order(
                    order_id,
                    CancelOptions {
                        restock: true,
                        expire_session: true,
                    },
                )
                .await;
        }

        let order = self.get_order(order_id).await?;
        if !order.status.can_transition_to(to) {
            return Err(OrderOpsError::transition(order.status, to));
        }
        if matches!(
            order.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        ) {
            return Err(OrderOpsError::Validation(
                "Payment has not been captured for this order".to_string(),
            ));
        }

        let tracking_number = tracking_number.map(str::trim).filter(|t| !t.is_empty());
        let updated = self
            .orders()
            .transition_status(order.id, order.status, to, tracking_number)
            .await?
            .ok_or_else(|| OrderOpsError::Conflict("Order changed, please retry".to_string()))?;

        tracing::info!(order_id = %updated.id, from = %order.status, to = %to, "Order status updated");

        if to == OrderStatus::Shipped
            && let Err(e) = self.email.send_order_shipped(&updated).await
        {
            tracing::error!(order_id = %updated.id, error = %e, "Failed to send shipping email");
        }

        Ok(updated)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    /// Create a `PENDING` refund for a paid order.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the order is not paid or the amount is out of range.
    pub async fn create_refund(&self, input: RefundInput) -> Result<Refund, OrderOpsError> {
        let order = self.get_order(input.order_id).await?;
        self.create_refund_for(&order, input).await
    }

    /// A customer's refund request for the full remaining amount.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` unless the order belongs to `user_id`, and
    /// `Validation` if it is unpaid or already has a pending request.
    pub async fn request_refund(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: RefundReason,
        note: Option<String>,
    ) -> Result<Refund, OrderOpsError> {
        let order = self
            .orders()
            .get_for_user(order_id, user_id)
            .await?
            .ok_or(OrderOpsError::NotFound("order"))?;

        if self.refunds().has_pending(order.id).await? {
            return Err(OrderOpsError::Validation(
                "A refund request is already pending for this order".to_string(),
            ));
        }

        self.create_refund_for(
            &order,
            RefundInput {
                order_id,
                amount: None,
                reason,
                note,
                restock: None,
                requested_by: Some(user_id),
            },
        )
        .await
    }

    async fn create_refund_for(
        &self,
        order: &Order,
        input: RefundInput,
    ) -> Result<Refund, OrderOpsError> {
        if !order.payment_status.is_captured() {
            return Err(OrderOpsError::Validation(
                "Only paid orders can be refunded".to_string(),
            ));
        }

        let committed = self.refunds().committed_amount(order.id).await?;
        let available = refund_headroom(order.total, order.refunded_total, committed);
        let amount = input.amount.unwrap_or(available);
        check_refund_amount(amount, available)?;

        let refund = self
            .refunds()
            .create(&NewRefund {
                order_id: order.id,
                amount,
                reason: input.reason,
                note: input.note.filter(|n| !n.trim().is_empty()),
                restock: input
                    .restock
                    .unwrap_or_else(|| should_restock_by_default(input.reason)),
                requested_by: input.requested_by,
            })
            .await?;

        tracing::info!(refund_id = %refund.id, order_id = %order.id, amount = %amount, "Refund requested");
        Ok(refund)
    }

    /// Approve a pending (or previously failed) refund: refund at the
    /// provider, update the order's payment status, restock at most once and
    /// email the customer.
    ///
    /// # Errors
    ///
    /// Returns `Payment` if the provider call fails; the refund is then
    /// marked `FAILED` and can be approved again.
    #[tracing::instrument(skip(self))]
    pub async fn approve_refund(
        &self,
        refund_id: RefundId,
        restock: Option<bool>,
        processed_by: UserId,
    ) -> Result<Refund, OrderOpsError> {
        let refund = self
            .refunds()
            .get(refund_id)
            .await?
            .ok_or(OrderOpsError::NotFound("refund"))?;
        if !refund.status.can_transition_to(RefundStatus::Approved) {
            return Err(OrderOpsError::transition(refund.status, RefundStatus::Approved));
        }

        let order = self.get_order(refund.order_id).await?;
        let payment_intent = match order.payment_intent_id.as_deref() {
            Some(pi) if order.payment_status.is_captured() => pi,
            _ => {
                return Err(OrderOpsError::Validation(
                    "Order has no captured payment to refund".to_string(),
                ));
            }
        };
        if refund.amount > order.refundable_amount() {
            return Err(OrderOpsError::Validation(format!(
                "At most {} can still be refunded",
                order.refundable_amount()
            )));
        }

        let request = RefundRequest {
            refund_id: refund.id,
            order_id: order.id,
            payment_intent,
            amount: refund.amount,
            reason: refund.reason,
            attempt: refund.attempts,
        };
        let provider_refund = match self.payments.create_refund(&request).await {
            Ok(r) if r.status.is_failure() => {
                let reason = r
                    .failure_reason
                    .unwrap_or_else(|| "declined by payment provider".to_string());
                self.fail_refund(&refund, processed_by, &reason).await?;
                return Err(OrderOpsError::Conflict(format!("Refund failed: {reason}")));
            }
            Ok(r) => r,
            Err(e) => {
                self.fail_refund(&refund, processed_by, &e.to_string()).await?;
                return Err(e.into());
            }
        };

        let restock = restock.unwrap_or(refund.restock);
        let approved = self
            .refunds()
            .transition(
                refund.id,
                refund.status,
                RefundStatus::Approved,
                RefundUpdate {
                    processed_by: Some(processed_by),
                    provider_refund_id: Some(&provider_refund.id),
                    restock: Some(restock),
                    ..RefundUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| OrderOpsError::Conflict("Refund was processed concurrently".to_string()))?;

        let approved_total: Decimal = self
            .refunds()
            .list_for_order(order.id)
            .await?
            .iter()
            .filter(|r| r.status == RefundStatus::Approved)
            .map(|r| r.amount)
            .sum();
        let order = self
            .orders()
            .sync_refunded_total(order.id, approved_total)
            .await?
            .unwrap_or(order);

        if restock && self.orders().restock(order.id).await? {
            tracing::info!(order_id = %order.id, "Order items returned to stock");
            self.stock_changed(order.id).await;
        }

        tracing::info!(refund_id = %approved.id, order_id = %order.id, payment_status = %order.payment_status, "Refund approved");

        if let Err(e) = self.email.send_refund_processed(&order, &approved).await {
            tracing::error!(refund_id = %approved.id, error = %e, "Failed to send refund email");
        }

        Ok(approved)
    }

    async fn fail_refund(
        &self,
        refund: &Refund,
        processed_by: UserId,
        reason: &str,
    ) -> Result<(), OrderOpsError> {
        tracing::warn!(refund_id = %refund.id, reason, "Provider refund failed");
        self.refunds()
            .transition(
                refund.id,
                refund.status,
                RefundStatus::Failed,
                RefundUpdate {
                    processed_by: Some(processed_by),
                    failure_reason: Some(reason),
                    ..RefundUpdate::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Reject a pending refund.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the refund was already approved or rejected.
    pub async fn reject_refund(
        &self,
        refund_id: RefundId,
        note: Option<&str>,
        processed_by: UserId,
    ) -> Result<Refund, OrderOpsError> {
        let refund = self
            .refunds()
            .get(refund_id)
            .await?
            .ok_or(OrderOpsError::NotFound("refund"))?;
        if !refund.status.can_transition_to(RefundStatus::Rejected) {
            return Err(OrderOpsError::transition(refund.status, RefundStatus::Rejected));
        }

        let rejected = self
            .refunds()
            .transition(
                refund.id,
                refund.status,
                RefundStatus::Rejected,
                RefundUpdate {
                    processed_by: Some(processed_by),
                    note: note.map(str::trim).filter(|n| !n.is_empty()),
                    ..RefundUpdate::default()
                },
            )
            .await?
            .ok_or_else(|| OrderOpsError::Conflict("Refund was processed concurrently".to_string()))?;

        tracing::info!(refund_id = %rejected.id, "Refund rejected");
        Ok(rejected)
    }
}

/// Validate a shipping address has every required line.
///
/// # Errors
///
/// Returns `Validation` naming the first missing field.
pub fn validate_shipping(address: &ShippingAddress) -> Result<(), OrderOpsError> {
    let required = [
        ("name", &address.name),
        ("address line 1", &address.line1),
        ("city", &address.city),
        ("postal code", &address.postal_code),
        ("country", &address.country),
    ];
    for (label, value) in required {
        if value.trim().is_empty() {
            return Err(OrderOpsError::Validation(format!(
                "Shipping {label} is required"
            )));
        }
    }
    if address.country.trim().len() != 2 {
        return Err(OrderOpsError::Validation(
            "Shipping country must be a two-letter code".to_string(),
        ));
    }
    Ok(())
}

/// Amount still open for new refund requests.
///
/// `committed` is the sum of pending and approved refunds; `refunded` may
/// exceed it when refunds were issued directly at the provider.
#[must_use]
pub fn refund_headroom(total: Decimal, refunded: Decimal, committed: Decimal) -> Decimal {
    (total - refunded.max(committed)).max(Decimal::ZERO)
}

/// Check a requested refund amount against the headroom.
///
/// # Errors
///
/// Returns `Validation` if the amount is not positive, has more than two
/// decimal places, or exceeds `available`.
pub fn check_refund_amount(amount: Decimal, available: Decimal) -> Result<(), OrderOpsError> {
    if amount <= Decimal::ZERO {
        return Err(OrderOpsError::Validation(
            "Refund amount must be greater than zero".to_string(),
        ));
    }
    if amount.round_dp(2) != amount {
        return Err(OrderOpsError::Validation(
            "Refund amount cannot have more than two decimal places".to_string(),
        ));
    }
    if amount > available {
        return Err(OrderOpsError::Validation(format!(
            "At most {available} can be refunded"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::fixtures::{
        ProviderObjects, order_service, pending_order, sku_with_stock, stock_of, stub_provider,
    };

    async fn recording_service(pool: &PgPool) -> (OrderService, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let api_base = stub_provider(ProviderObjects::default()).await;
        let service = order_service(pool, api_base).with_catalog(CatalogInvalidation::local(
            move |stale| sink.lock().unwrap().extend_from_slice(stale),
        ));
        (service, seen)
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_cancel_with_restock_drops_product_cache(pool: PgPool) {
        let sku = sku_with_stock(&pool, "linen-shirt", 2).await;
        let order = pending_order(&pool, "ORD-CACHE", &sku, None).await;
        let (service, seen) = recording_service(&pool).await;

        service
            .cancel_order(
                order.id,
                CancelOptions {
                    restock: true,
                    expire_session: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(stock_of(&pool, &sku).await, 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["products".to_string(), "product:linen-shirt".to_string()]
        );
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_cancel_without_restock_keeps_cache(pool: PgPool) {
        let sku = sku_with_stock(&pool, "wool-coat", 2).await;
        let order = pending_order(&pool, "ORD-NOCACHE", &sku, None).await;
        let (service, seen) = recording_service(&pool).await;

        service
            .cancel_order(
                order.id,
                CancelOptions {
                    restock: false,
                    expire_session: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(stock_of(&pool, &sku).await, 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Ada Lovelace".to_string(),
            line1: "1 Analytical Row".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1 1AA".to_string(),
            country: "GB".to_string(),
        }
    }

    #[test]
    fn test_validate_shipping() {
        assert!(validate_shipping(&address()).is_ok());

        let mut missing = address();
        missing.city = "  ".to_string();
        let err = validate_shipping(&missing).unwrap_err();
        assert_eq!(err.to_string(), "Shipping city is required");

        let mut bad_country = address();
        bad_country.country = "GBR".to_string();
        assert!(validate_shipping(&bad_country).is_err());
    }

    #[test]
    fn test_refund_headroom() {
        assert_eq!(refund_headroom(dec("50.00"), Decimal::ZERO, Decimal::ZERO), dec("50.00"));
        assert_eq!(refund_headroom(dec("50.00"), dec("10.00"), dec("30.00")), dec("20.00"));
        assert_eq!(refund_headroom(dec("50.00"), dec("40.00"), dec("10.00")), dec("10.00"));
        assert_eq!(refund_headroom(dec("50.00"), dec("50.00"), dec("60.00")), Decimal::ZERO);
    }

    #[test]
    fn test_check_refund_amount() {
        assert!(check_refund_amount(dec("20.00"), dec("20.00")).is_ok());
        assert!(check_refund_amount(dec("20.01"), dec("20.00")).is_err());
        assert!(check_refund_amount(Decimal::ZERO, dec("20.00")).is_err());
        assert!(check_refund_amount(dec("1.005"), dec("20.00")).is_err());
    }

    #[test]
    fn test_transition_error_message() {
        let err = OrderOpsError::transition(OrderStatus::Delivered, OrderStatus::Cancelled);
        assert_eq!(err.to_string(), "cannot move from delivered to cancelled");
    }
}
