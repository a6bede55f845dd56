//! Newsletter subscription repository.

use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::{Email, PageParams, SubscriptionId, SubscriptionStatus};

use crate::RepositoryError;
use crate::models::{NewsletterSubscription, SubscribeOutcome};

const SUBSCRIPTION_COLUMNS: &str =
    "id, email, status, unsubscribe_token, subscribed_at, unsubscribed_at";

/// Repository for newsletter subscriptions.
pub struct NewsletterRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NewsletterRepository<'a> {
    /// Create a new newsletter repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Subscribe an address. Idempotent; unsubscribed addresses are re-activated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn subscribe(
        &self,
        email: &Email,
    ) -> Result<(NewsletterSubscription, SubscribeOutcome), RepositoryError> {
        let existing = self.get_by_email(email).await?;

        match existing {
            Some(sub) if sub.status == SubscriptionStatus::Subscribed => {
                Ok((sub, SubscribeOutcome::AlreadySubscribed))
            }
            Some(sub) => {
                let sub = sqlx::query_as::<_, NewsletterSubscription>(&format!(
                    r"
                    UPDATE newsletter_subscriptions
                    SET status = 'subscribed', subscribed_at = now(), unsubscribed_at = NULL
                    WHERE id = $1
                    RETURNING {SUBSCRIPTION_COLUMNS}
                    "
                ))
                .bind(sub.id)
                .fetch_one(self.pool)
                .await?;
                Ok((sub, SubscribeOutcome::Resubscribed))
            }
            None => {
                // A concurrent insert for the same address leaves us with the
                // other request's row.
                let inserted = sqlx::query_as::<_, NewsletterSubscription>(&format!(
                    r"
                    INSERT INTO newsletter_subscriptions (email, unsubscribe_token)
                    VALUES ($1, $2)
                    ON CONFLICT (email) DO NOTHING
                    RETURNING {SUBSCRIPTION_COLUMNS}
                    "
                ))
                .bind(email)
                .bind(Uuid::new_v4())
                .fetch_optional(self.pool)
                .await?;

                match inserted {
                    Some(sub) => Ok((sub, SubscribeOutcome::Created)),
                    None => {
                        let sub = self
                            .get_by_email(email)
                            .await?
                            .ok_or(RepositoryError::NotFound)?;
                        Ok((sub, SubscribeOutcome::AlreadySubscribed))
                    }
                }
            }
        }
    }

    /// Unsubscribe by token. Returns `None` for unknown tokens.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn unsubscribe(
        &self,
        token: Uuid,
    ) -> Result<Option<NewsletterSubscription>, RepositoryError> {
        let sub = sqlx::query_as::<_, NewsletterSubscription>(&format!(
            r"
            UPDATE newsletter_subscriptions
            SET status = 'unsubscribed',
                unsubscribed_at = COALESCE(unsubscribed_at, now())
            WHERE unsubscribe_token = $1
            RETURNING {SUBSCRIPTION_COLUMNS}
            "
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await?;

        Ok(sub)
    }

    /// Get a subscription by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<NewsletterSubscription>, RepositoryError> {
        let sub = sqlx::query_as::<_, NewsletterSubscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM newsletter_subscriptions WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        Ok(sub)
    }

    /// List subscriptions, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<SubscriptionStatus>,
        page: PageParams,
    ) -> Result<(Vec<NewsletterSubscription>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM newsletter_subscriptions WHERE $1::subscription_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let subs = sqlx::query_as::<_, NewsletterSubscription>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM newsletter_subscriptions
            WHERE $1::subscription_status IS NULL OR status = $1
            ORDER BY subscribed_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((subs, total))
    }

    /// Every subscription with `status`, oldest first, for CSV export.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn export(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> Result<Vec<NewsletterSubscription>, RepositoryError> {
        let subs = sqlx::query_as::<_, NewsletterSubscription>(&format!(
            r"
            SELECT {SUBSCRIPTION_COLUMNS} FROM newsletter_subscriptions
            WHERE $1::subscription_status IS NULL OR status = $1
            ORDER BY subscribed_at, id
            "
        ))
        .bind(status)
        .fetch_all(self.pool)
        .await?;

        Ok(subs)
    }

    /// Hard-delete a subscription.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the subscription doesn't exist.
    pub async fn delete(&self, id: SubscriptionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM newsletter_subscriptions WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
