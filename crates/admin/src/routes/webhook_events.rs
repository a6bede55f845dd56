//! Recorded payment webhook events.
//!
//! Lets an admin see what the provider sent and push a stuck or failed
//! event through again once the underlying problem is fixed.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{Page, WebhookEventId, WebhookEventStatus};
use atelier_db::WebhookEventRepository;
use atelier_db::models::WebhookEvent;
use atelier_services::webhooks::WebhookOutcome;

use crate::error::AppError;
use crate::extract::{ApiResult, PathParam, QueryParams, page_params, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Query parameters for `GET /api/webhook-events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub status: Option<WebhookEventStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `GET /api/webhook-events`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_events(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<EventListQuery>,
) -> ApiResult<Page<WebhookEvent>> {
    let params = page_params(query.page, query.per_page);
    let (events, total) = WebhookEventRepository::new(state.pool())
        .list(query.status, params)
        .await?;
    success("Webhook events", Page::new(events, params, total))
}

/// `GET /api/webhook-events/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn get_event(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<WebhookEventId>,
) -> ApiResult<WebhookEvent> {
    let event = WebhookEventRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("webhook event".to_string()))?;
    success("Webhook event", event)
}

/// `POST /api/webhook-events/{id}/retry`
///
/// Resets the retry budget and applies the event now. Processed events
/// are refused.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn retry_event(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<WebhookEventId>,
) -> ApiResult<WebhookOutcome> {
    let repo = WebhookEventRepository::new(state.pool());
    let Some(event) = repo.reset_for_retry(id).await? else {
        return match repo.get(id).await? {
            Some(_) => Err(AppError::Conflict(
                "Event has already been processed".to_string(),
            )),
            None => Err(AppError::NotFound("webhook event".to_string())),
        };
    };

    let outcome = state.webhooks().retry(&event).await?;
    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        ?outcome,
        "Webhook event retried"
    );

    let message = match &outcome {
        WebhookOutcome::Failed { .. } => "Retry failed",
        WebhookOutcome::Processed { .. } | WebhookOutcome::Duplicate => "Event processed",
    };
    success(message, outcome)
}
