//! Customer order route handlers.
//!
//! Every route requires a signed-in customer and only sees their own orders.

use axum::extract::{Path, State};
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{OrderId, Page, PageParams, RefundReason};
use atelier_db::OrderRepository;
use atelier_db::models::{Order, OrderDetail, Refund};

use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, QueryParams, success};
use crate::middleware::RequireAuth;
use crate::state::AppState;

/// `POST /api/orders/{id}/refund-request` body.
#[derive(Debug, Deserialize)]
pub struct RefundRequestBody {
    pub reason: RefundReason,
    pub note: Option<String>,
}

/// `GET /api/orders`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    QueryParams(params): QueryParams<PageParams>,
) -> ApiResult<Page<Order>> {
    let (orders, total) = OrderRepository::new(state.pool())
        .list_for_user(user.id, params)
        .await?;
    success("Orders", Page::new(orders, params, total))
}

/// `GET /api/orders/{id}`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> ApiResult<OrderDetail> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get_for_user(id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;
    success("Order", repo.detail(order).await?)
}

/// `POST /api/orders/{id}/cancel`
///
/// Only unpaid orders that are still processing can be cancelled here.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
) -> ApiResult<Order> {
    let order = state.orders().cancel_for_customer(id, user.id).await?;
    tracing::info!(order_id = %order.id, "Order cancelled by customer");
    success("Order cancelled", order)
}

/// `POST /api/orders/{id}/refund-request`
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn request_refund(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    Path(id): Path<OrderId>,
    JsonBody(body): JsonBody<RefundRequestBody>,
) -> ApiResult<Refund> {
    let note = body
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let refund = state
        .orders()
        .request_refund(id, user.id, body.reason, note)
        .await?;
    tracing::info!(order_id = %id, refund_id = %refund.id, "Refund requested");
    success("Refund requested", refund)
}
