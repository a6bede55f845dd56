//! Scheduled maintenance jobs.
//!
//! Each job is one idempotent pass whose query predicates make overlapping
//! runs safe. The admin binary exposes them under `/api/cron/<job>` and the
//! CLI under `atelier-cli jobs run <job>`.

use chrono::{Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;

use atelier_db::{
    ADMIN_SESSION_TABLE, CartRepository, OrderRepository, RepositoryError, STOREFRONT_SESSION_TABLE,
    SessionRepository, WebhookEventRepository,
};

use crate::config::JobSettings;
use crate::orders::{CancelOptions, OrderService};
use crate::payments::CheckoutSessionStatus;
use crate::webhooks::{WebhookOutcome, WebhookProcessor};

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("unknown job: {0}")]
    UnknownJob(String),
}

/// The scheduled jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Job {
    AbandonedCarts,
    Sessions,
    WebhookRetry,
    PaymentReconciliation,
}

impl Job {
    pub const ALL: &'static [Self] = &[
        Self::AbandonedCarts,
        Self::Sessions,
        Self::WebhookRetry,
        Self::PaymentReconciliation,
    ];

    /// Name used in cron paths and on the command line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AbandonedCarts => "abandoned-carts",
            Self::Sessions => "sessions",
            Self::WebhookRetry => "webhook-retry",
            Self::PaymentReconciliation => "payment-reconciliation",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Job {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|job| job.name() == s)
            .ok_or_else(|| JobError::UnknownJob(s.to_string()))
    }
}

/// Counts from one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub job: Job,
    pub examined: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl JobReport {
    #[must_use]
    pub const fn new(job: Job) -> Self {
        Self {
            job,
            examined: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        }
    }
}

/// Runs jobs against the shared services.
#[derive(Clone)]
pub struct JobRunner {
    pool: PgPool,
    orders: OrderService,
    webhooks: WebhookProcessor,
    settings: JobSettings,
}

impl JobRunner {
    #[must_use]
    pub fn new(pool: PgPool, orders: OrderService, settings: JobSettings) -> Self {
        let webhooks =
            WebhookProcessor::new(pool.clone(), orders.clone(), settings.webhook_max_retries);
        Self {
            pool,
            orders,
            webhooks,
            settings,
        }
    }

    /// Run one job to completion.
    ///
    /// # Errors
    ///
    /// Returns error if the job's driving query fails. Per-row failures are
    /// counted in the report instead.
    #[tracing::instrument(skip(self), fields(job = %job))]
    pub async fn run(&self, job: Job) -> Result<JobReport, JobError> {
        let report = match job {
            Job::AbandonedCarts => self.abandoned_carts().await?,
            Job::Sessions => self.sessions().await?,
            Job::WebhookRetry => self.webhook_retry().await?,
            Job::PaymentReconciliation => self.payment_reconciliation().await?,
        };

        tracing::info!(
            examined = report.examined,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            "Job finished"
        );
        Ok(report)
    }

    async fn abandoned_carts(&self) -> Result<JobReport, JobError> {
        let cutoff = Utc::now() - Duration::days(self.settings.abandoned_cart_days);
        let deleted = CartRepository::new(&self.pool).delete_abandoned(cutoff).await?;

        Ok(JobReport {
            examined: deleted,
            succeeded: deleted,
            ..JobReport::new(Job::AbandonedCarts)
        })
    }

    async fn sessions(&self) -> Result<JobReport, JobError> {
        let repo = SessionRepository::new(&self.pool);
        let mut report = JobReport::new(Job::Sessions);

        for table in [STOREFRONT_SESSION_TABLE, ADMIN_SESSION_TABLE] {
            match repo.delete_expired(table).await {
                Ok(deleted) => {
                    report.examined += deleted;
                    report.succeeded += deleted;
                }
                Err(e) => {
                    tracing::error!(table, error = %e, "Failed to delete expired sessions");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn webhook_retry(&self) -> Result<JobReport, JobError> {
        let events = WebhookEventRepository::new(&self.pool)
            .list_retryable(self.settings.webhook_max_retries, self.settings.batch_size)
            .await?;
        let mut report = JobReport::new(Job::WebhookRetry);

        for event in &events {
            report.examined += 1;
            match self.webhooks.retry(event).await {
                Ok(WebhookOutcome::Processed { .. } | WebhookOutcome::Duplicate) => {
                    report.succeeded += 1;
                }
                Ok(WebhookOutcome::Failed { .. }) => report.failed += 1,
                Err(e) => {
                    tracing::error!(event_id = %event.provider_event_id, error = %e, "Webhook retry errored");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn payment_reconciliation(&self) -> Result<JobReport, JobError> {
        let cutoff = Utc::now() - Duration::minutes(self.settings.reconciliation_after_minutes);
        let orders = OrderRepository::new(&self.pool)
            .list_pending_payment(cutoff, self.settings.batch_size)
            .await?;
        let mut report = JobReport::new(Job::PaymentReconciliation);

        for order in &orders {
            report.examined += 1;
            let Some(session_id) = order.checkout_session_id.as_deref() else {
                report.skipped += 1;
                continue;
            };

            let session = match self
                .orders
                .payments()
                .retrieve_checkout_session(session_id)
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Could not fetch checkout session");
                    report.failed += 1;
                    continue;
                }
            };

            let result = if session.is_paid() {
                self.orders
                    .confirm_payment(order.id, session.payment_intent.as_deref())
                    .await
                    .map(|_| ())
            } else if session.status == Some(CheckoutSessionStatus::Expired) {
                self.orders
                    .cancel_order(
                        order.id,
                        CancelOptions {
                            restock: true,
                            expire_session: false,
                        },
                    )
                    .await
                    .map(|_| ())
            } else {
                report.skipped += 1;
                continue;
            };

            match result {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(order_id = %order.id, error = %e, "Reconciliation failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::{OrderStatus, PaymentStatus};
    use serde_json::json;

    use super::*;
    use crate::fixtures::{
        ProviderObjects, order_service, pending_order, reload, session_object, sku_with_stock,
        stock_of, stub_provider,
    };

    #[test]
    fn test_job_names_round_trip() {
        for job in Job::ALL {
            assert_eq!(job.name().parse::<Job>().unwrap(), *job);
        }
        assert!(matches!(
            "vacuum".parse::<Job>(),
            Err(JobError::UnknownJob(name)) if name == "vacuum"
        ));
    }

    fn settings() -> JobSettings {
        JobSettings {
            // Cutoff in the future so every seeded order qualifies.
            reconciliation_after_minutes: -5,
            webhook_max_retries: 3,
            ..JobSettings::default()
        }
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_reconciliation_follows_session_state(pool: PgPool) {
        let mut objects = ProviderObjects::default();
        for (id, status, payment) in [
            ("cs_paid", "complete", "paid"),
            ("cs_expired", "expired", "unpaid"),
            ("cs_open", "open", "unpaid"),
        ] {
            objects
                .sessions
                .insert(id.to_string(), session_object(id, status, payment));
        }
        let api_base = stub_provider(objects).await;

        let sku = sku_with_stock(&pool, "linen-shirt", 5).await;
        let paid = pending_order(&pool, "ORD-PAID", &sku, Some("cs_paid")).await;
        let expired = pending_order(&pool, "ORD-EXPIRED", &sku, Some("cs_expired")).await;
        let open = pending_order(&pool, "ORD-OPEN", &sku, Some("cs_open")).await;
        assert_eq!(stock_of(&pool, &sku).await, 2);

        let runner = JobRunner::new(pool.clone(), order_service(&pool, api_base), settings());
        let report = runner.run(Job::PaymentReconciliation).await.unwrap();

        assert_eq!(report.examined, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);

        let paid = reload(&pool, &paid).await;
        assert_eq!(paid.status, OrderStatus::Paid);
        assert_eq!(paid.payment_intent_id.as_deref(), Some("pi_cs_paid"));

        let expired = reload(&pool, &expired).await;
        assert_eq!(expired.status, OrderStatus::Cancelled);
        assert!(expired.restocked_at.is_some());

        let open = reload(&pool, &open).await;
        assert_eq!(open.status, OrderStatus::Processing);
        assert_eq!(open.payment_status, PaymentStatus::Pending);

        assert_eq!(stock_of(&pool, &sku).await, 3);
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_reconciliation_counts_provider_errors(pool: PgPool) {
        let api_base = stub_provider(ProviderObjects::default()).await;
        let sku = sku_with_stock(&pool, "scarf", 2).await;
        let order = pending_order(&pool, "ORD-GONE", &sku, Some("cs_missing")).await;

        let runner = JobRunner::new(pool.clone(), order_service(&pool, api_base), settings());
        let report = runner.run(Job::PaymentReconciliation).await.unwrap();

        assert_eq!(report.examined, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(reload(&pool, &order).await.status, OrderStatus::Processing);
    }

    #[sqlx::test(migrator = "atelier_db::MIGRATOR")]
    async fn test_webhook_retry_applies_refetched_event(pool: PgPool) {
        let completed = json!({
            "id": "evt_late",
            "type": "checkout.session.completed",
            "created": 1_760_000_000,
            "data": { "object": session_object("cs_late", "complete", "paid") }
        });
        let mut objects = ProviderObjects::default();
        objects.events.insert("evt_late".to_string(), completed.clone());
        let api_base = stub_provider(objects).await;

        let sku = sku_with_stock(&pool, "beret", 2).await;
        let order = pending_order(&pool, "ORD-LATE", &sku, None).await;
        let orders = order_service(&pool, api_base);
        let webhooks = WebhookProcessor::new(pool.clone(), orders.clone(), 3);

        // The session is not linked to an order yet, so the first delivery fails.
        let first = webhooks
            .receive(completed.to_string().as_bytes())
            .await
            .unwrap();
        assert!(matches!(
            first,
            WebhookOutcome::Failed {
                status: atelier_core::WebhookEventStatus::Pending,
                ..
            }
        ));

        OrderRepository::new(&pool)
            .set_checkout_session(order.id, "cs_late")
            .await
            .unwrap();

        let runner = JobRunner::new(pool.clone(), orders, settings());
        let report = runner.run(Job::WebhookRetry).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(reload(&pool, &order).await.status, OrderStatus::Paid);

        let again = runner.run(Job::WebhookRetry).await.unwrap();
        assert_eq!(again.examined, 0);
    }

    #[test]
    fn test_report_serialization() {
        let report = JobReport {
            examined: 3,
            succeeded: 2,
            skipped: 1,
            ..JobReport::new(Job::PaymentReconciliation)
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "job": "payment-reconciliation",
                "examined": 3,
                "succeeded": 2,
                "failed": 0,
                "skipped": 1
            })
        );
    }
}
