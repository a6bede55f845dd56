//! Atelier database layer.
//!
//! # Database
//!
//! One `PostgreSQL` database is shared by the storefront and admin binaries.
//!
//! ## Tables
//!
//! - `users` - Customer and admin accounts (argon2 password hashes)
//! - `products`, `product_skus` - Catalog and per-variant stock
//! - `collections`, `collection_products` - Curated product groupings
//! - `discounts` - Checkout discount codes
//! - `carts`, `cart_items` - Guest and signed-in carts
//! - `wishlist_items`, `newsletter_subscriptions`
//! - `orders`, `order_items`, `refunds`
//! - `webhook_events` - Payment provider events, recorded once per provider id
//!
//! Session tables are owned by `tower-sessions-sqlx-store` and created by its
//! own `migrate()`.
//!
//! # Migrations
//!
//! Migrations live in `crates/db/migrations/` and run via:
//! ```bash
//! cargo run -p atelier-cli -- migrate
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod models;
pub mod repositories;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixtures;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use repositories::*;

/// Embedded schema migrations.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email, insufficient stock).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Map a unique-constraint violation to `Conflict(message)`, passing other
    /// errors through as `Database`.
    pub(crate) fn from_unique(e: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.is_unique_violation()
        {
            return Self::Conflict(message.to_owned());
        }
        Self::Database(e)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run all pending migrations.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails or the history is inconsistent.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use atelier_core::{
        DiscountKind, OrderStatus, PaymentStatus, RefundReason, RefundStatus, SubscriptionStatus,
        UserRole, WebhookEventStatus,
    };

    use super::*;

    const ENUM_MIGRATION: &str =
        include_str!("../migrations/20260301000001_create_enums_and_users.sql");

    fn enum_labels(type_name: &str) -> Vec<String> {
        let start = ENUM_MIGRATION
            .find(&format!("CREATE TYPE {type_name} AS ENUM"))
            .map(|i| &ENUM_MIGRATION[i..]);
        let Some(rest) = start else {
            return Vec::new();
        };
        let body = rest.split_once('(').map_or("", |(_, b)| b);
        let body = body.split_once(')').map_or("", |(b, _)| b);
        body.split(',')
            .map(|label| label.trim().trim_matches('\'').to_owned())
            .collect()
    }

    fn assert_matches(type_name: &str, labels: impl Iterator<Item = &'static str>) {
        let expected: Vec<String> = labels.map(str::to_owned).collect();
        assert_eq!(enum_labels(type_name), expected, "{type_name} drifted");
    }

    #[test]
    fn test_postgres_enums_match_core_labels() {
        assert_matches("user_role", UserRole::ALL.iter().map(|s| s.as_str()));
        assert_matches("order_status", OrderStatus::ALL.iter().map(|s| s.as_str()));
        assert_matches("payment_status", PaymentStatus::ALL.iter().map(|s| s.as_str()));
        assert_matches("refund_status", RefundStatus::ALL.iter().map(|s| s.as_str()));
        assert_matches("refund_reason", RefundReason::ALL.iter().map(|s| s.as_str()));
        assert_matches("discount_kind", DiscountKind::ALL.iter().map(|s| s.as_str()));
        assert_matches(
            "webhook_event_status",
            WebhookEventStatus::ALL.iter().map(|s| s.as_str()),
        );
        assert_matches(
            "subscription_status",
            SubscriptionStatus::ALL.iter().map(|s| s.as_str()),
        );
    }

    #[test]
    fn test_migrations_are_embedded_in_order() {
        let versions: Vec<i64> = MIGRATOR.iter().map(|m| m.version).collect();
        assert!(!versions.is_empty());
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_unique_violation_passthrough() {
        let err = RepositoryError::from_unique(sqlx::Error::RowNotFound, "email already exists");
        assert!(matches!(err, RepositoryError::Database(sqlx::Error::RowNotFound)));
    }
}
