//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use atelier_services::email::EmailError;
use atelier_services::revalidate::RevalidateError;
use atelier_services::{
    CatalogInvalidation, EmailService, JobRunner, OrderService, PaymentClient, PaymentError,
    RevalidationClient, WebhookProcessor,
};

use crate::config::AdminConfig;

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
    #[error("revalidation client: {0}")]
    Revalidation(#[from] RevalidateError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AdminConfig,
    pool: PgPool,
    orders: OrderService,
    webhooks: WebhookProcessor,
    jobs: JobRunner,
    revalidation: RevalidationClient,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an outbound client cannot be built.
    pub fn new(config: AdminConfig, pool: PgPool) -> Result<Self, StateError> {
        let payments = PaymentClient::new(&config.payment)?;
        let email = EmailService::from_config(config.email.as_ref()).map_err(EmailError::from)?;
        if !email.is_enabled() {
            tracing::warn!("SMTP_HOST not set, order status emails disabled");
        }
        if config.revalidation.is_none() {
            tracing::warn!("STOREFRONT_URL not set, catalog changes will not revalidate");
        }

        let revalidation = RevalidationClient::new(config.revalidation.clone())?;
        let orders = OrderService::new(pool.clone(), payments, email)
            .with_catalog(CatalogInvalidation::Remote(revalidation.clone()));
        let webhooks =
            WebhookProcessor::new(pool.clone(), orders.clone(), config.jobs.webhook_max_retries);
        let jobs = JobRunner::new(pool.clone(), orders.clone(), config.jobs);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                orders,
                webhooks,
                jobs,
                revalidation,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &AdminConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Order lifecycle operations.
    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookProcessor {
        &self.inner.webhooks
    }

    #[must_use]
    pub fn jobs(&self) -> &JobRunner {
        &self.inner.jobs
    }

    /// Storefront cache revalidation, a no-op when unconfigured.
    #[must_use]
    pub fn revalidation(&self) -> &RevalidationClient {
        &self.inner.revalidation
    }
}
