//! Recorded payment provider events.

use chrono::{DateTime, Utc};
use serde::Serialize;

use atelier_core::{WebhookEventId, WebhookEventStatus};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WebhookEvent {
    pub id: WebhookEventId,
    pub provider_event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: WebhookEventStatus,
    pub retry_count: i32,
    pub last_error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Result of recording an incoming event.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// First delivery of this provider event id.
    New(WebhookEvent),
    /// Redelivery; the stored row is returned unchanged.
    Duplicate(WebhookEvent),
}
