//! Payment provider webhook endpoint.
//!
//! The signature is checked against the raw body before anything is parsed.
//! Events whose application fails are still acknowledged with 200; the
//! `webhook-retry` job re-applies them.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use tracing::instrument;

use atelier_services::WebhookError;
use atelier_services::webhooks::{SIGNATURE_HEADER, WebhookOutcome, verify_signature};

use crate::extract::{ApiResult, success};
use crate::state::AppState;

/// `POST /api/webhooks/payments`
#[instrument(skip_all)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookOutcome> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            WebhookError::InvalidSignature(format!("Missing {SIGNATURE_HEADER} header"))
        })?;

    if let Err(e) = verify_signature(
        &state.config().webhook_secret,
        signature,
        &body,
        chrono::Utc::now().timestamp(),
    ) {
        tracing::warn!(error = %e, "Rejected payment webhook");
        return Err(e.into());
    }

    let outcome = state.webhooks().receive(&body).await?;
    match &outcome {
        WebhookOutcome::Failed { error, status } => {
            tracing::warn!(%error, ?status, "Payment webhook not applied");
        }
        other => tracing::info!(outcome = ?other, "Payment webhook handled"),
    }

    success("Webhook received", outcome)
}
