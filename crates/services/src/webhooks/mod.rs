//! Payment webhook intake: signature verification, idempotent recording and
//! event application.
//!
//! Every event is stored once per provider event id before it is applied.
//! A failed application leaves the event `PENDING` with its retry count
//! bumped; the `webhook-retry` job picks it up until the retry budget is
//! spent, after which it is `FAILED`.

mod signature;

pub use signature::{
    SIGNATURE_HEADER, SIGNATURE_TOLERANCE_SECS, compute_signature, constant_time_compare,
    verify_signature,
};

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use atelier_core::{OrderId, OrderStatus, PaymentStatus, WebhookEventStatus};
use atelier_db::models::{RecordOutcome, WebhookEvent};
use atelier_db::{OrderRepository, RepositoryError, WebhookEventRepository};

use crate::orders::{CancelOptions, OrderOpsError, OrderService};
use crate::payments::{EventKind, PaymentEvent, from_minor_units};

/// Errors from webhook intake.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    PaymentConfirmed,
    OrderCancelled,
    PaymentFailed,
    RefundSynced,
    DisputeFlagged,
    /// The order was already in the target state.
    AlreadyApplied,
    /// Event type or state Atelier does not act on.
    Ignored,
}

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed { applied: Applied },
    /// Redelivery of an event that was already processed.
    Duplicate,
    /// Application failed; the event stays queued unless `status` is `FAILED`.
    Failed {
        error: String,
        status: WebhookEventStatus,
    },
}

/// Records and applies payment provider events.
#[derive(Clone)]
pub struct WebhookProcessor {
    pool: PgPool,
    orders: OrderService,
    max_retries: i32,
}

impl WebhookProcessor {
    #[must_use]
    pub const fn new(pool: PgPool, orders: OrderService, max_retries: i32) -> Self {
        Self {
            pool,
            orders,
            max_retries,
        }
    }

    fn events(&self) -> WebhookEventRepository<'_> {
        WebhookEventRepository::new(&self.pool)
    }

    fn order_repo(&self) -> OrderRepository<'_> {
        OrderRepository::new(&self.pool)
    }

    /// Handle a verified webhook body.
    ///
    /// # Errors
    ///
    /// Returns error if the body is not an event or the event cannot be
    /// recorded. Application failures are recorded, not returned.
    pub async fn receive(&self, body: &[u8]) -> Result<WebhookOutcome, WebhookError> {
        let payload: serde_json::Value = serde_json::from_slice(body)?;
        let event: PaymentEvent = serde_json::from_value(payload.clone())?;

        let record = match self
            .events()
            .record(&event.id, &event.event_type, &payload)
            .await?
        {
            RecordOutcome::Duplicate(existing) if existing.status == WebhookEventStatus::Processed => {
                tracing::debug!(event_id = %event.id, "Duplicate webhook delivery");
                return Ok(WebhookOutcome::Duplicate);
            }
            RecordOutcome::Duplicate(existing) => existing,
            RecordOutcome::New(created) => created,
        };

        self.process(&record, &event).await
    }

    /// Re-fetch a recorded event from the provider and apply it again.
    ///
    /// # Errors
    ///
    /// Returns error if the outcome cannot be recorded.
    pub async fn retry(&self, record: &WebhookEvent) -> Result<WebhookOutcome, WebhookError> {
        match self
            .orders
            .payments()
            .retrieve_event(&record.provider_event_id)
            .await
        {
            Ok(event) => self.process(record, &event).await,
            Err(e) => self.record_failure(record, &e.to_string()).await,
        }
    }

    async fn process(
        &self,
        record: &WebhookEvent,
        event: &PaymentEvent,
    ) -> Result<WebhookOutcome, WebhookError> {
        match self.apply(event).await {
            Ok(applied) => {
                self.events().mark_processed(record.id).await?;
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    ?applied,
                    "Webhook event processed"
                );
                Ok(WebhookOutcome::Processed { applied })
            }
            Err(e) => self.record_failure(record, &e.to_string()).await,
        }
    }

    async fn record_failure(
        &self,
        record: &WebhookEvent,
        error: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let status = self
            .events()
            .record_failure(record.id, error, self.max_retries)
            .await?;

        if status == WebhookEventStatus::Failed {
            tracing::error!(event_id = %record.provider_event_id, error, "Webhook event failed permanently");
        } else {
            tracing::warn!(event_id = %record.provider_event_id, error, "Webhook event failed, queued for retry");
        }

        Ok(WebhookOutcome::Failed {
            error: error.to_string(),
            status,
        })
    }

    /// Apply an event to the order it concerns.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is malformed, the order cannot be found,
    /// or a database or provider call fails.
    pub async fn apply(&self, event: &PaymentEvent) -> Result<Applied, OrderOpsError> {
        let kind = event
            .kind()
            .map_err(|e| OrderOpsError::Validation(format!("malformed {}: {e}", event.event_type)))?;

        match kind {
            EventKind::CheckoutCompleted(session) => {
                if !session.is_paid() {
                    return Ok(Applied::Ignored);
                }
                let order_id = self
                    .resolve(session.order_id(), Lookup::Session(&session.id))
                    .await?;
                let confirmed = self
                    .orders
                    .confirm_payment(order_id, session.payment_intent.as_deref())
                    .await?;
                Ok(if confirmed.is_some() {
                    Applied::PaymentConfirmed
                } else {
                    Applied::AlreadyApplied
                })
            }
            EventKind::CheckoutExpired(session) => {
                let order_id = self
                    .resolve(session.order_id(), Lookup::Session(&session.id))
                    .await?;
                let order = self
                    .order_repo()
                    .get(order_id)
                    .await?
                    .ok_or(OrderOpsError::NotFound("order"))?;

                let awaiting_payment = order.status == OrderStatus::Processing
                    && matches!(
                        order.payment_status,
                        PaymentStatus::Pending | PaymentStatus::Failed
                    );
                if !awaiting_payment {
                    return Ok(Applied::AlreadyApplied);
                }

                self.orders
                    .cancel_order(
                        order.id,
                        CancelOptions {
                            restock: true,
                            expire_session: false,
                        },
                    )
                    .await?;
                Ok(Applied::OrderCancelled)
            }
            EventKind::PaymentFailed(intent) => {
                let order_id = self
                    .resolve(intent.order_id(), Lookup::PaymentIntent(&intent.id))
                    .await?;
                let failed = self
                    .order_repo()
                    .transition_payment(order_id, PaymentStatus::Pending, PaymentStatus::Failed)
                    .await?;
                if let Some(order) = &failed {
                    let reason = intent
                        .last_payment_error
                        .and_then(|e| e.message)
                        .unwrap_or_default();
                    tracing::info!(order_id = %order.id, reason, "Payment failed");
                }
                Ok(if failed.is_some() {
                    Applied::PaymentFailed
                } else {
                    Applied::AlreadyApplied
                })
            }
            EventKind::ChargeRefunded(charge) => {
                let order_id = match charge.payment_intent.as_deref() {
                    Some(pi) => self.resolve(charge.order_id(), Lookup::PaymentIntent(pi)).await?,
                    None => charge
                        .order_id()
                        .ok_or(OrderOpsError::NotFound("order"))?,
                };
                let synced = self
                    .order_repo()
                    .sync_refunded_total(order_id, from_minor_units(charge.amount_refunded))
                    .await?;
                Ok(if synced.is_some() {
                    Applied::RefundSynced
                } else {
                    Applied::AlreadyApplied
                })
            }
            EventKind::DisputeCreated(dispute) => {
                let order_id = match dispute.payment_intent.as_deref() {
                    Some(pi) => self.resolve(dispute.order_id(), Lookup::PaymentIntent(pi)).await?,
                    None => dispute
                        .order_id()
                        .ok_or(OrderOpsError::NotFound("order"))?,
                };
                self.order_repo()
                    .set_disputed(order_id)
                    .await?
                    .ok_or(OrderOpsError::NotFound("order"))?;
                tracing::warn!(order_id = %order_id, reason = ?dispute.reason, "Payment disputed");
                Ok(Applied::DisputeFlagged)
            }
            EventKind::Other(event_type) => {
                tracing::debug!(event_type, "Unhandled webhook event type");
                Ok(Applied::Ignored)
            }
        }
    }

    /// The order an event concerns: metadata first, then a provider id lookup.
    async fn resolve(
        &self,
        from_metadata: Option<OrderId>,
        lookup: Lookup<'_>,
    ) -> Result<OrderId, OrderOpsError> {
        if let Some(id) = from_metadata {
            return Ok(id);
        }

        let order = match lookup {
            Lookup::Session(id) => self.order_repo().get_by_checkout_session(id).await?,
            Lookup::PaymentIntent(id) => self.order_repo().get_by_payment_intent(id).await?,
        };
        order
            .map(|o| o.id)
            .ok_or(OrderOpsError::NotFound("order"))
    }
}

enum Lookup<'a> {
    Session(&'a str),
    PaymentIntent(&'a str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fixtures::{
        ProviderObjects, order_service, pending_order, reload, session_object, sku_with_stock,
        stock_of, stub_provider,
    };

    fn body(id: &str, event_type: &str, object: &serde_json::Value) -> Vec<u8> {
        json!({
            "id": id,
            "type": event_type,
            "created": 1_760_000_000,
            "data": { "object": object }
        })
        .to_string()
        .into_bytes()
    }

    async fn processor(pool: &PgPool, max_retries: i32) -> WebhookProcessor {
        let api_base = stub_provider(ProviderObjects::default()).await;
        WebhookProcessor::new(pool.clone(), order_service(pool, api_base), max_retries)
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_completed_session_confirms_once(pool: PgPool) {
        let sku = sku_with_stock(&pool, "linen-shirt", 3).await;
        let order = pending_order(&pool, "ORD-1", &sku, Some("cs_1")).await;
        let webhooks = processor(&pool, 3).await;
        let event = body(
            "evt_completed",
            "checkout.session.completed",
            &session_object("cs_1", "complete", "paid"),
        );

        let first = webhooks.receive(&event).await.unwrap();
        assert_eq!(
            first,
            WebhookOutcome::Processed {
                applied: Applied::PaymentConfirmed
            }
        );
        let paid = reload(&pool, &order).await;
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        assert_eq!(webhooks.receive(&event).await.unwrap(), WebhookOutcome::Duplicate);
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_expired_session_cancels_and_restocks(pool: PgPool) {
        let sku = sku_with_stock(&pool, "wool-coat", 2).await;
        let order = pending_order(&pool, "ORD-2", &sku, Some("cs_2")).await;
        assert_eq!(stock_of(&pool, &sku).await, 1);
        let webhooks = processor(&pool, 3).await;

        let event = body(
            "evt_expired",
            "checkout.session.expired",
            &session_object("cs_2", "expired", "unpaid"),
        );
        assert_eq!(
            webhooks.receive(&event).await.unwrap(),
            WebhookOutcome::Processed {
                applied: Applied::OrderCancelled
            }
        );
        assert_eq!(reload(&pool, &order).await.status, OrderStatus::Cancelled);
        assert_eq!(stock_of(&pool, &sku).await, 2);

        // A second expiry for the same order is a no-op, not a second restock.
        let replay = body(
            "evt_expired_again",
            "checkout.session.expired",
            &session_object("cs_2", "expired", "unpaid"),
        );
        assert_eq!(
            webhooks.receive(&replay).await.unwrap(),
            WebhookOutcome::Processed {
                applied: Applied::AlreadyApplied
            }
        );
        assert_eq!(stock_of(&pool, &sku).await, 2);
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_refund_total_never_decreases(pool: PgPool) {
        let sku = sku_with_stock(&pool, "scarf", 2).await;
        let order = pending_order(&pool, "ORD-3", &sku, Some("cs_3")).await;
        OrderRepository::new(&pool)
            .mark_paid(order.id, Some("pi_3"))
            .await
            .unwrap()
            .unwrap();
        let webhooks = processor(&pool, 3).await;

        let charge = |id: &str, refunded: i64| {
            body(
                id,
                "charge.refunded",
                &json!({ "id": "ch_3", "payment_intent": "pi_3", "amount_refunded": refunded }),
            )
        };
        webhooks.receive(&charge("evt_r1", 1_000)).await.unwrap();
        let partial = reload(&pool, &order).await;
        assert_eq!(partial.payment_status, PaymentStatus::PartiallyRefunded);
        assert_eq!(partial.refunded_total, from_minor_units(1_000));

        // Out-of-order delivery of an older, smaller total.
        webhooks.receive(&charge("evt_r0", 500)).await.unwrap();
        assert_eq!(
            reload(&pool, &order).await.refunded_total,
            from_minor_units(1_000)
        );

        webhooks.receive(&charge("evt_r2", 2_500)).await.unwrap();
        let refunded = reload(&pool, &order).await;
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.refunded_total, from_minor_units(2_500));
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_unknown_order_fails_after_budget(pool: PgPool) {
        let webhooks = processor(&pool, 1).await;
        let event = body(
            "evt_orphan",
            "checkout.session.completed",
            &json!({
                "id": "cs_orphan",
                "status": "complete",
                "payment_status": "paid",
            }),
        );

        let outcome = webhooks.receive(&event).await.unwrap();
        assert!(matches!(
            outcome,
            WebhookOutcome::Failed {
                status: WebhookEventStatus::Failed,
                ..
            }
        ));
        assert!(
            WebhookEventRepository::new(&pool)
                .list_retryable(1, 10)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_payment_failure_only_from_pending(pool: PgPool) {
        let sku = sku_with_stock(&pool, "gloves", 2).await;
        let order = pending_order(&pool, "ORD-4", &sku, None).await;
        let webhooks = processor(&pool, 3).await;
        let event: PaymentEvent = serde_json::from_slice(&body(
            "evt_failed",
            "payment_intent.payment_failed",
            &json!({
                "id": "pi_4",
                "metadata": { "order_id": order.id.to_string() },
                "last_payment_error": { "message": "card declined" }
            }),
        ))
        .unwrap();

        assert_eq!(webhooks.apply(&event).await.unwrap(), Applied::PaymentFailed);
        assert_eq!(
            reload(&pool, &order).await.payment_status,
            PaymentStatus::Failed
        );
        assert_eq!(webhooks.apply(&event).await.unwrap(), Applied::AlreadyApplied);
    }

    #[test]
    fn test_outcome_serialization() {
        let processed = WebhookOutcome::Processed {
            applied: Applied::PaymentConfirmed,
        };
        assert_eq!(
            serde_json::to_value(&processed).unwrap(),
            json!({ "outcome": "processed", "applied": "payment_confirmed" })
        );

        let failed = WebhookOutcome::Failed {
            error: "order not found".to_string(),
            status: WebhookEventStatus::Pending,
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "outcome": "failed", "error": "order not found", "status": "PENDING" })
        );
    }
}
