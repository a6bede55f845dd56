//! Refund route handlers.
//!
//! Refunds are created `PENDING` (by an admin here, or by the customer from
//! the storefront) and only reach the payment provider on approval.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{OrderId, Page, RefundId, RefundReason, RefundStatus};
use atelier_db::RefundRepository;
use atelier_db::models::{Refund, RefundWithOrder};
use atelier_services::orders::RefundInput;

use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, PathParam, QueryParams, page_params, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Query parameters for `GET /api/refunds`.
#[derive(Debug, Deserialize)]
pub struct RefundListQuery {
    pub status: Option<RefundStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `POST /api/refunds` body.
#[derive(Debug, Deserialize)]
pub struct CreateRefundRequest {
    pub order_id: OrderId,
    /// Everything still refundable when omitted.
    pub amount: Option<Decimal>,
    pub reason: RefundReason,
    pub note: Option<String>,
    pub restock: Option<bool>,
}

/// `POST /api/refunds/{id}/approve` body.
#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    /// Overrides the restock flag chosen when the refund was created.
    pub restock: Option<bool>,
}

/// `POST /api/refunds/{id}/reject` body.
#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub note: Option<String>,
}

fn validate_amount(amount: Option<Decimal>) -> Result<(), AppError> {
    match amount {
        Some(amount) if amount <= Decimal::ZERO => Err(AppError::Validation(
            "Refund amount must be positive".to_string(),
        )),
        Some(amount) if amount.scale() > 2 => Err(AppError::Validation(
            "Refund amount cannot have more than 2 decimal places".to_string(),
        )),
        _ => Ok(()),
    }
}

/// `GET /api/refunds`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_refunds(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<RefundListQuery>,
) -> ApiResult<Page<RefundWithOrder>> {
    let params = page_params(query.page, query.per_page);
    let (refunds, total) = RefundRepository::new(state.pool())
        .list(query.status, params)
        .await?;
    success("Refunds", Page::new(refunds, params, total))
}

/// `POST /api/refunds`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id, order_id = %body.order_id))]
pub async fn create_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(body): JsonBody<CreateRefundRequest>,
) -> ApiResult<Refund> {
    validate_amount(body.amount)?;

    let refund = state
        .orders()
        .create_refund(RefundInput {
            order_id: body.order_id,
            amount: body.amount,
            reason: body.reason,
            note: body.note.filter(|n| !n.trim().is_empty()),
            restock: body.restock,
            requested_by: Some(admin.id),
        })
        .await?;
    tracing::info!(refund_id = %refund.id, amount = %refund.amount, "Refund created");

    success("Refund created", refund)
}

/// `POST /api/refunds/{id}/approve`
///
/// Issues the provider refund. Stock goes back at most once per order.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn approve_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<RefundId>,
    JsonBody(body): JsonBody<ApproveRequest>,
) -> ApiResult<Refund> {
    let refund = state
        .orders()
        .approve_refund(id, body.restock, admin.id)
        .await?;
    tracing::info!(refund_id = %refund.id, status = %refund.status, "Refund approved");

    success("Refund approved", refund)
}

/// `POST /api/refunds/{id}/reject`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn reject_refund(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<RefundId>,
    JsonBody(body): JsonBody<RejectRequest>,
) -> ApiResult<Refund> {
    let refund = state
        .orders()
        .reject_refund(id, body.note.as_deref(), admin.id)
        .await?;
    success("Refund rejected", refund)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_validation() {
        assert!(validate_amount(None).is_ok());
        assert!(validate_amount(Some(Decimal::new(1250, 2))).is_ok());
        assert!(validate_amount(Some(Decimal::ZERO)).is_err());
        assert!(validate_amount(Some(Decimal::new(-5, 0))).is_err());
        assert!(validate_amount(Some(Decimal::new(10_005, 3))).is_err());
    }

    #[test]
    fn test_create_request_shape() {
        let body: CreateRefundRequest = serde_json::from_str(
            r#"{"order_id": 12, "amount": "19.99", "reason": "DAMAGED"}"#,
        )
        .unwrap();
        assert_eq!(body.order_id, OrderId::new(12));
        assert_eq!(body.amount, Some(Decimal::new(1999, 2)));
        assert_eq!(body.reason, RefundReason::Damaged);
        assert!(body.restock.is_none());
    }
}
