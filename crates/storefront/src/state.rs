//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use atelier_services::email::EmailError;
use atelier_services::{
    CatalogInvalidation, EmailService, OrderService, PaymentClient, PaymentError, WebhookProcessor,
};

use crate::cache::CatalogCache;
use crate::config::StorefrontConfig;

/// Error creating application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("email service: {0}")]
    Email(#[from] EmailError),
}

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    orders: OrderService,
    webhooks: WebhookProcessor,
    catalog: CatalogCache,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if the payment or email client cannot be built.
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Result<Self, StateError> {
        let payments = PaymentClient::new(&config.payment)?;
        let email = EmailService::from_config(config.email.as_ref()).map_err(EmailError::from)?;
        if !email.is_enabled() {
            tracing::warn!("SMTP_HOST not set, transactional email disabled");
        }

        let catalog = CatalogCache::new();
        let cache = catalog.clone();
        let orders = OrderService::new(pool.clone(), payments, email)
            .with_catalog(CatalogInvalidation::local(move |tags| cache.invalidate_tags(tags)));
        let webhooks =
            WebhookProcessor::new(pool.clone(), orders.clone(), config.jobs.webhook_max_retries);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                orders,
                webhooks,
                catalog,
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
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
    pub fn email(&self) -> &EmailService {
        self.inner.orders.email()
    }

    #[must_use]
    pub fn webhooks(&self) -> &WebhookProcessor {
        &self.inner.webhooks
    }

    /// Catalog response cache.
    #[must_use]
    pub fn catalog(&self) -> &CatalogCache {
        &self.inner.catalog
    }
}
