//! Webhook event repository.
//!
//! Events are recorded by provider event id before they are applied, so a
//! redelivered event is recognised and a failed one can be retried.

use sqlx::PgPool;

use atelier_core::{PageParams, WebhookEventId, WebhookEventStatus};

use crate::RepositoryError;
use crate::models::{RecordOutcome, WebhookEvent};

const EVENT_COLUMNS: &str = "id, provider_event_id, event_type, payload, status, retry_count, \
     last_error, received_at, processed_at";

/// Repository for recorded payment provider events.
pub struct WebhookEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WebhookEventRepository<'a> {
    /// Create a new webhook event repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record an incoming event, once per provider event id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record(
        &self,
        provider_event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<RecordOutcome, RepositoryError> {
        let inserted = sqlx::query_as::<_, WebhookEvent>(&format!(
            r"
            INSERT INTO webhook_events (provider_event_id, event_type, payload)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider_event_id) DO NOTHING
            RETURNING {EVENT_COLUMNS}
            "
        ))
        .bind(provider_event_id)
        .bind(event_type)
        .bind(payload)
        .fetch_optional(self.pool)
        .await?;

        if let Some(event) = inserted {
            return Ok(RecordOutcome::New(event));
        }

        let existing = sqlx::query_as::<_, WebhookEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE provider_event_id = $1"
        ))
        .bind(provider_event_id)
        .fetch_one(self.pool)
        .await?;

        Ok(RecordOutcome::Duplicate(existing))
    }

    /// Get an event by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: WebhookEventId) -> Result<Option<WebhookEvent>, RepositoryError> {
        let event = sqlx::query_as::<_, WebhookEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM webhook_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(event)
    }

    /// List events, newest first, optionally by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        status: Option<WebhookEventStatus>,
        page: PageParams,
    ) -> Result<(Vec<WebhookEvent>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM webhook_events WHERE $1::webhook_event_status IS NULL OR status = $1",
        )
        .bind(status)
        .fetch_one(self.pool)
        .await?;

        let events = sqlx::query_as::<_, WebhookEvent>(&format!(
            r"
            SELECT {EVENT_COLUMNS} FROM webhook_events
            WHERE $1::webhook_event_status IS NULL OR status = $1
            ORDER BY received_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        ))
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((events, total))
    }

    /// Pending events that have been attempted fewer than `max_retries` times,
    /// oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_retryable(
        &self,
        max_retries: i32,
        limit: i64,
    ) -> Result<Vec<WebhookEvent>, RepositoryError> {
        let events = sqlx::query_as::<_, WebhookEvent>(&format!(
            r"
            SELECT {EVENT_COLUMNS} FROM webhook_events
            WHERE status = 'pending' AND retry_count < $1
            ORDER BY received_at
            LIMIT $2
            "
        ))
        .bind(max_retries)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(events)
    }

    /// Mark an event processed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_processed(&self, id: WebhookEventId) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            UPDATE webhook_events
            SET status = 'processed', processed_at = now(), last_error = NULL
            WHERE id = $1
            ",
        )
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Count a failed attempt. The event becomes `FAILED` once `retry_count`
    /// reaches `max_retries`.
    ///
    /// Returns the updated status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the event doesn't exist.
    pub async fn record_failure(
        &self,
        id: WebhookEventId,
        error: &str,
        max_retries: i32,
    ) -> Result<WebhookEventStatus, RepositoryError> {
        sqlx::query_scalar::<_, WebhookEventStatus>(
            r"
            UPDATE webhook_events SET
                retry_count = retry_count + 1,
                last_error = $2,
                status = CASE
                    WHEN retry_count + 1 >= $3 THEN 'failed'::webhook_event_status
                    ELSE 'pending'::webhook_event_status
                END
            WHERE id = $1
            RETURNING status
            ",
        )
        .bind(id)
        .bind(error)
        .bind(max_retries)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Put an event back in the retry queue with a fresh retry budget.
    ///
    /// Processed events are left alone; returns `None` for them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn reset_for_retry(
        &self,
        id: WebhookEventId,
    ) -> Result<Option<WebhookEvent>, RepositoryError> {
        let event = sqlx::query_as::<_, WebhookEvent>(&format!(
            r"
            UPDATE webhook_events SET status = 'pending', retry_count = 0
            WHERE id = $1 AND status <> 'processed'
            RETURNING {EVENT_COLUMNS}
            "
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(event)
    }

    /// Number of events with `status`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_by_status(&self, status: WebhookEventStatus) -> Result<i64, RepositoryError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM webhook_events WHERE status = $1")
                .bind(status)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn new_event(pool: &PgPool, provider_id: &str) -> WebhookEvent {
        let outcome = WebhookEventRepository::new(pool)
            .record(provider_id, "checkout.session.completed", &json!({"id": provider_id}))
            .await
            .unwrap();
        match outcome {
            RecordOutcome::New(event) => event,
            RecordOutcome::Duplicate(_) => panic!("{provider_id} already recorded"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_redelivery_is_duplicate(pool: PgPool) {
        let event = new_event(&pool, "evt_1").await;

        let again = WebhookEventRepository::new(&pool)
            .record("evt_1", "checkout.session.completed", &json!({}))
            .await
            .unwrap();
        match again {
            RecordOutcome::Duplicate(existing) => {
                assert_eq!(existing.id, event.id);
                assert_eq!(existing.payload, json!({"id": "evt_1"}));
            }
            RecordOutcome::New(_) => panic!("recorded twice"),
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_failures_exhaust_retries(pool: PgPool) {
        let event = new_event(&pool, "evt_flaky").await;
        let events = WebhookEventRepository::new(&pool);

        for attempt in 1..3 {
            let status = events.record_failure(event.id, "order locked", 3).await.unwrap();
            assert_eq!(status, WebhookEventStatus::Pending, "attempt {attempt}");
            assert_eq!(events.list_retryable(3, 10).await.unwrap().len(), 1);
        }

        let status = events.record_failure(event.id, "order locked", 3).await.unwrap();
        assert_eq!(status, WebhookEventStatus::Failed);
        assert!(events.list_retryable(3, 10).await.unwrap().is_empty());

        let stored = events.get(event.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 3);
        assert_eq!(stored.last_error.as_deref(), Some("order locked"));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_reset_for_retry(pool: PgPool) {
        let failed = new_event(&pool, "evt_failed").await;
        let done = new_event(&pool, "evt_done").await;
        let events = WebhookEventRepository::new(&pool);

        events.record_failure(failed.id, "boom", 1).await.unwrap();
        let reset = events.reset_for_retry(failed.id).await.unwrap().unwrap();
        assert_eq!(reset.status, WebhookEventStatus::Pending);
        assert_eq!(reset.retry_count, 0);

        events.mark_processed(done.id).await.unwrap();
        assert!(events.reset_for_retry(done.id).await.unwrap().is_none());
        assert_eq!(
            events.count_by_status(WebhookEventStatus::Processed).await.unwrap(),
            1
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn test_record_failure_unknown_event(pool: PgPool) {
        let result = WebhookEventRepository::new(&pool)
            .record_failure(WebhookEventId::new(999), "boom", 3)
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
