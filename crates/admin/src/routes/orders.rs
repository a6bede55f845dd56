//! Order management route handlers.
//!
//! Status changes go through [`OrderService`](atelier_services::OrderService)
//! so the transition table, stock and customer emails stay consistent with
//! the webhook path.

use axum::extract::State;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{OrderId, OrderStatus, Page, PageParams, PaymentStatus};
use atelier_db::OrderRepository;
use atelier_db::models::{Order, OrderDetail, OrderFilter, OrderSort};
use atelier_services::orders::CancelOptions;

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, JsonBody, PathParam, QueryParams, page_params, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Query parameters for `GET /api/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub q: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub sort: OrderSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl OrderListQuery {
    fn into_filter(self) -> Result<(OrderFilter, PageParams)> {
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            return Err(AppError::Validation("`from` must not be after `to`".to_string()));
        }

        let filter = OrderFilter {
            status: self.status,
            payment_status: self.payment_status,
            q: self.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
            from: self.from,
            to: self.to,
            sort: self.sort,
        };
        Ok((filter, page_params(self.page, self.per_page)))
    }
}

/// `POST /api/orders/{id}/status` body.
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
}

/// `POST /api/orders/{id}/cancel` body.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    #[serde(default = "default_restock")]
    pub restock: bool,
}

const fn default_restock() -> bool {
    true
}

/// `GET /api/orders`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_orders(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<OrderListQuery>,
) -> ApiResult<Page<Order>> {
    let (filter, params) = query.into_filter()?;
    let (orders, total) = OrderRepository::new(state.pool())
        .list(&filter, params)
        .await?;
    success("Orders", Page::new(orders, params, total))
}

/// `GET /api/orders/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn get_order(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<OrderId>,
) -> ApiResult<OrderDetail> {
    let repo = OrderRepository::new(state.pool());
    let order = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;
    success("Order", repo.detail(order).await?)
}

/// `POST /api/orders/{id}/status`
///
/// Moving to `SHIPPED` records the tracking number and emails the customer.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, to = %body.status))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<OrderId>,
    JsonBody(body): JsonBody<UpdateStatusRequest>,
) -> ApiResult<Order> {
    let tracking = body
        .tracking_number
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let order = state
        .orders()
        .update_status(id, body.status, tracking)
        .await?;
    tracing::info!(order_id = %order.id, status = %order.status, "Order status updated");

    success("Order updated", order)
}

/// `POST /api/orders/{id}/cancel`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<OrderId>,
    JsonBody(body): JsonBody<CancelRequest>,
) -> ApiResult<Order> {
    let order = state
        .orders()
        .cancel_order(
            id,
            CancelOptions {
                restock: body.restock,
                expire_session: true,
            },
        )
        .await?;
    tracing::info!(order_id = %order.id, restock = body.restock, "Order cancelled by admin");

    success("Order cancelled", order)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_parses_statuses_and_dates() {
        let query: OrderListQuery = serde_json::from_str(
            r#"{"status": "PAID", "payment_status": "PENDING", "from": "2026-01-01", "q": "  "}"#,
        )
        .unwrap();
        let (filter, params) = query.into_filter().unwrap();
        assert_eq!(filter.status, Some(OrderStatus::Paid));
        assert_eq!(filter.payment_status, Some(PaymentStatus::Pending));
        assert_eq!(filter.q, None);
        assert_eq!(params.page(), 1);
    }

    #[test]
    fn test_inverted_date_range_rejected() {
        let query = OrderListQuery {
            from: NaiveDate::from_ymd_opt(2026, 3, 1),
            to: NaiveDate::from_ymd_opt(2026, 2, 1),
            ..OrderListQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_cancel_restocks_by_default() {
        let body: CancelRequest = serde_json::from_str("{}").unwrap();
        assert!(body.restock);
    }
}
