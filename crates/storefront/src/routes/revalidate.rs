//! Catalog cache revalidation endpoint, called by the admin after catalog
//! changes.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::instrument;

use atelier_services::revalidate::RevalidateRequest;
use atelier_services::webhooks::constant_time_compare;

use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, success};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RevalidateResponse {
    pub tags: Vec<String>,
}

/// Check `Authorization: Bearer <secret>`. Without a secret nothing passes.
fn authorize(headers: &HeaderMap, secret: Option<&str>) -> Result<(), AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match (secret, token) {
        (Some(secret), Some(token)) if constant_time_compare(token, secret) => Ok(()),
        _ => Err(AppError::Unauthorized("Invalid revalidation token".to_string())),
    }
}

/// `POST /api/revalidate`
#[instrument(skip(state, headers, body))]
pub async fn revalidate(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RevalidateRequest>,
) -> ApiResult<RevalidateResponse> {
    authorize(
        &headers,
        state
            .config()
            .revalidate_secret
            .as_ref()
            .map(ExposeSecret::expose_secret),
    )?;

    let tags: Vec<String> = body
        .tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        return Err(AppError::Validation("At least one tag is required".to_string()));
    }

    state.catalog().invalidate_tags(&tags);
    tracing::info!(?tags, "Catalog cache revalidated");
    success("Revalidated", RevalidateResponse { tags })
}
