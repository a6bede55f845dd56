//! Newsletter subscription model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use atelier_core::{Email, SubscriptionId, SubscriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct NewsletterSubscription {
    pub id: SubscriptionId,
    pub email: Email,
    pub status: SubscriptionStatus,
    #[serde(skip_serializing)]
    pub unsubscribe_token: Uuid,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

/// What `subscribe` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Created,
    Resubscribed,
    AlreadySubscribed,
}

impl SubscribeOutcome {
    /// Whether a welcome email should go out.
    #[must_use]
    pub const fn is_new(self) -> bool {
        !matches!(self, Self::AlreadySubscribed)
    }
}
