//! Wishlist route handlers.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::ProductId;
use atelier_db::models::WishlistEntry;
use atelier_db::{RepositoryError, WishlistRepository};

use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, success};
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// `POST /api/wishlist/toggle` body.
#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub product_id: ProductId,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    /// Whether the product is now on the wishlist.
    pub added: bool,
}

/// `GET /api/wishlist`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_wishlist(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> ApiResult<Vec<WishlistEntry>> {
    let entries = WishlistRepository::new(state.pool()).list(user.id).await?;
    success("Wishlist", entries)
}

/// `POST /api/wishlist/toggle`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn toggle_item(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    JsonBody(body): JsonBody<ToggleRequest>,
) -> ApiResult<ToggleResponse> {
    let added = WishlistRepository::new(state.pool())
        .toggle(user.id, body.product_id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("product".to_string()),
            other => other.into(),
        })?;
    let message = if added {
        "Added to wishlist"
    } else {
        "Removed from wishlist"
    };
    success(message, ToggleResponse { added })
}
