//! Newsletter route handlers.
//!
//! Subscribing is idempotent and answers the same way whether or not the
//! address was already on the list.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use atelier_core::Email;
use atelier_db::NewsletterRepository;

use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, QueryParams, done};
use crate::state::AppState;

/// `POST /api/newsletter/subscribe` body.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

/// Unsubscribe token, from a JSON body or the emailed link.
#[derive(Debug, Deserialize)]
pub struct UnsubscribeRequest {
    pub token: Uuid,
}

/// `POST /api/newsletter/subscribe`
#[instrument(skip(state, body))]
pub async fn subscribe(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SubscribeRequest>,
) -> ApiResult<()> {
    let email = Email::parse(&body.email)
        .map_err(|_| AppError::Validation("Invalid email address".to_string()))?;

    let (subscription, outcome) = NewsletterRepository::new(state.pool())
        .subscribe(&email)
        .await?;
    tracing::info!(subscription_id = %subscription.id, ?outcome, "Newsletter subscribe");

    if outcome.is_new() {
        let unsubscribe_url = state.config().url_for(&format!(
            "/api/newsletter/unsubscribe?token={}",
            subscription.unsubscribe_token
        ));
        // Subscription stands even if the welcome email does not go out.
        if let Err(e) = state
            .email()
            .send_newsletter_welcome(email.as_str(), &unsubscribe_url)
            .await
        {
            tracing::error!(error = %e, subscription_id = %subscription.id, "Failed to send welcome email");
        }
    }

    done("You're subscribed")
}

async fn unsubscribe_token(state: &AppState, token: Uuid) -> ApiResult<()> {
    let subscription = NewsletterRepository::new(state.pool())
        .unsubscribe(token)
        .await?
        .ok_or_else(|| AppError::NotFound("subscription".to_string()))?;
    tracing::info!(subscription_id = %subscription.id, "Newsletter unsubscribe");
    done("You have been unsubscribed")
}

/// `POST /api/newsletter/unsubscribe`
#[instrument(skip(state, body))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UnsubscribeRequest>,
) -> ApiResult<()> {
    unsubscribe_token(&state, body.token).await
}

/// `GET /api/newsletter/unsubscribe?token=...`, the link in every email.
#[instrument(skip(state, query))]
pub async fn unsubscribe_link(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<UnsubscribeRequest>,
) -> ApiResult<()> {
    unsubscribe_token(&state, query.token).await
}
