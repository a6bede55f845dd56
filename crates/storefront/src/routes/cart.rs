//! Cart route handlers.
//!
//! The cart id lives in the session. Guests get a fresh cart on their first
//! add; signed-in customers fall back to the cart they own, and on login a
//! guest cart is merged into it (see [`merge_guest_cart`]).

use axum::extract::{Path, State};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use uuid::Uuid;

use atelier_core::SkuId;
use atelier_core::pricing::MAX_LINE_QUANTITY;
use atelier_db::models::CartSummary;
use atelier_db::{CartRepository, ProductRepository, RepositoryError};

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, JsonBody, success};
use crate::middleware::OptionalAuth;
use crate::middleware::auth::CurrentUser;
use crate::middleware::session::keys;
use crate::state::AppState;

/// `POST /api/cart/items` body.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub sku_id: SkuId,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

const fn default_quantity() -> i32 {
    1
}

/// `PATCH /api/cart/items/{sku_id}` body.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// The cart attached to this session, if there is one.
///
/// # Errors
///
/// Returns an error if the session or database cannot be read.
pub async fn session_cart(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<Option<Uuid>> {
    if let Some(id) = session.get::<Uuid>(keys::CART_ID).await? {
        return Ok(Some(id));
    }

    let Some(user) = user else {
        return Ok(None);
    };
    let owned = CartRepository::new(state.pool())
        .find_for_user(user.id)
        .await?;
    if let Some(id) = owned {
        session.insert(keys::CART_ID, id).await?;
    }
    Ok(owned)
}

/// The session's cart, created on first use.
async fn session_cart_or_create(
    state: &AppState,
    session: &Session,
    user: Option<&CurrentUser>,
) -> Result<Uuid> {
    let id = match session_cart(state, session, user).await? {
        Some(id) => id,
        None => {
            let id = Uuid::new_v4();
            session.insert(keys::CART_ID, id).await?;
            id
        }
    };

    // The row may have been removed by the abandoned-cart job.
    CartRepository::new(state.pool())
        .ensure(id, user.map(|u| u.id))
        .await?;
    Ok(id)
}

async fn summary(state: &AppState, cart_id: Option<Uuid>) -> Result<CartSummary> {
    match cart_id {
        Some(id) => Ok(CartRepository::new(state.pool()).summary(id).await?),
        None => Ok(CartSummary::new(Uuid::nil(), Vec::new())),
    }
}

fn validate_quantity(quantity: i32) -> Result<()> {
    if (1..=MAX_LINE_QUANTITY).contains(&quantity) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Quantity must be between 1 and {MAX_LINE_QUANTITY}"
        )))
    }
}

/// Check that `quantity` units of `sku_id` can be sold.
async fn check_available(state: &AppState, sku_id: SkuId, quantity: i32) -> Result<()> {
    let products = ProductRepository::new(state.pool());
    let sku = products
        .get_sku(sku_id)
        .await?
        .ok_or_else(|| AppError::NotFound("product variant".to_string()))?;
    let product = products
        .get(sku.product_id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;

    if quantity > sku.stock {
        return Err(AppError::Validation(if sku.stock <= 0 {
            format!("{} is out of stock", product.name)
        } else {
            format!("Only {} left of {}", sku.stock, product.name)
        }));
    }
    Ok(())
}

fn map_missing_sku(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("product variant".to_string()),
        other => other.into(),
    }
}

/// `GET /api/cart`
#[instrument(skip(state, session, user))]
pub async fn get_cart(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> ApiResult<CartSummary> {
    let cart_id = session_cart(&state, &session, user.as_ref()).await?;
    success("Cart", summary(&state, cart_id).await?)
}

/// `POST /api/cart/items`
///
/// Adds to any quantity already in the cart.
#[instrument(skip(state, session, user))]
pub async fn add_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    JsonBody(body): JsonBody<AddItemRequest>,
) -> ApiResult<CartSummary> {
    validate_quantity(body.quantity)?;

    let cart_id = session_cart_or_create(&state, &session, user.as_ref()).await?;
    let carts = CartRepository::new(state.pool());
    let quantity = carts.quantity_of(cart_id, body.sku_id).await? + body.quantity;
    if quantity > MAX_LINE_QUANTITY {
        return Err(AppError::Validation(format!(
            "You can add at most {MAX_LINE_QUANTITY} of an item"
        )));
    }
    check_available(&state, body.sku_id, quantity).await?;

    carts
        .set_quantity(cart_id, body.sku_id, quantity)
        .await
        .map_err(map_missing_sku)?;
    tracing::info!(%cart_id, sku_id = %body.sku_id, quantity, "Cart item added");

    success("Added to cart", carts.summary(cart_id).await?)
}

/// `PATCH /api/cart/items/{sku_id}`
///
/// A quantity of 0 removes the line.
#[instrument(skip(state, session, user))]
pub async fn update_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(sku_id): Path<SkuId>,
    JsonBody(body): JsonBody<UpdateItemRequest>,
) -> ApiResult<CartSummary> {
    if body.quantity != 0 {
        validate_quantity(body.quantity)?;
    }

    let cart_id = session_cart(&state, &session, user.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("cart item".to_string()))?;
    let carts = CartRepository::new(state.pool());

    if body.quantity == 0 {
        carts.remove_item(cart_id, sku_id).await?;
        return success("Removed from cart", carts.summary(cart_id).await?);
    }

    if carts.quantity_of(cart_id, sku_id).await? == 0 {
        return Err(AppError::NotFound("cart item".to_string()));
    }
    check_available(&state, sku_id, body.quantity).await?;
    carts
        .set_quantity(cart_id, sku_id, body.quantity)
        .await
        .map_err(map_missing_sku)?;

    success("Cart updated", carts.summary(cart_id).await?)
}

/// `DELETE /api/cart/items/{sku_id}`
#[instrument(skip(state, session, user))]
pub async fn remove_item(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    Path(sku_id): Path<SkuId>,
) -> ApiResult<CartSummary> {
    let cart_id = session_cart(&state, &session, user.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound("cart item".to_string()))?;
    let carts = CartRepository::new(state.pool());

    if !carts.remove_item(cart_id, sku_id).await? {
        return Err(AppError::NotFound("cart item".to_string()));
    }
    success("Removed from cart", carts.summary(cart_id).await?)
}

/// `DELETE /api/cart`
#[instrument(skip(state, session, user))]
pub async fn clear_cart(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
) -> ApiResult<CartSummary> {
    let cart_id = session_cart(&state, &session, user.as_ref()).await?;
    if let Some(id) = cart_id {
        CartRepository::new(state.pool()).clear(id).await?;
    }
    success("Cart cleared", summary(&state, cart_id).await?)
}

/// Attach the session's guest cart to a customer who just signed in.
///
/// A customer who already owns a cart gets the guest lines merged into it;
/// otherwise the guest cart becomes theirs. The session ends up pointing at
/// the customer's cart either way.
///
/// # Errors
///
/// Returns an error if the session or database cannot be updated.
pub async fn merge_guest_cart(
    state: &AppState,
    session: &Session,
    user: &CurrentUser,
) -> Result<()> {
    let carts = CartRepository::new(state.pool());
    let guest = session.get::<Uuid>(keys::CART_ID).await?;
    let owned = carts.find_for_user(user.id).await?;

    let cart_id = match (guest, owned) {
        (Some(guest), Some(owned)) => {
            carts.merge(guest, owned).await?;
            tracing::info!(%guest, %owned, user_id = %user.id, "Guest cart merged");
            Some(owned)
        }
        (Some(guest), None) => {
            carts.assign_to_user(guest, user.id).await?;
            Some(guest)
        }
        (None, owned) => owned,
    };

    match cart_id {
        Some(id) => session.insert(keys::CART_ID, id).await?,
        None => {
            session.remove::<Uuid>(keys::CART_ID).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());
        assert!(matches!(validate_quantity(0), Err(AppError::Validation(_))));
        assert!(matches!(validate_quantity(100), Err(AppError::Validation(_))));
        assert!(matches!(validate_quantity(-3), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_add_request_defaults_to_one() {
        let body: AddItemRequest = serde_json::from_str(r#"{"sku_id": 4}"#).unwrap();
        assert_eq!(body.sku_id, SkuId::new(4));
        assert_eq!(body.quantity, 1);
    }

    #[test]
    fn test_missing_sku_maps_to_not_found() {
        assert!(matches!(
            map_missing_sku(RepositoryError::NotFound),
            AppError::NotFound(_)
        ));
    }
}
