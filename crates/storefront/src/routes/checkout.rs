//! Checkout route handler.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use atelier_core::{Email, OrderId};
use atelier_db::models::ShippingAddress;
use atelier_services::orders::CheckoutInput;

use super::cart::session_cart;
use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, success};
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// `POST /api/checkout` body.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Required for guests; ignored for signed-in customers.
    pub email: Option<String>,
    pub shipping: ShippingAddress,
    pub discount_code: Option<String>,
}

/// Where to send the customer to pay.
#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Decimal,
    pub checkout_url: String,
}

fn resolve_email(signed_in: Option<&Email>, provided: Option<&str>) -> Result<Email, AppError> {
    if let Some(email) = signed_in {
        return Ok(email.clone());
    }
    match provided.map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            Email::parse(raw).map_err(|_| AppError::Validation("Invalid email address".to_string()))
        }
        _ => Err(AppError::Validation("Email is required".to_string())),
    }
}

/// `POST /api/checkout`
///
/// Creates the order from the session's cart and returns the provider's
/// hosted checkout URL. The cart is emptied once payment is confirmed.
#[instrument(skip(state, session, user, body))]
pub async fn checkout(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(user): OptionalAuth,
    JsonBody(body): JsonBody<CheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let email = resolve_email(user.as_ref().map(|u| &u.email), body.email.as_deref())?;
    let cart_id = session_cart(&state, &session, user.as_ref())
        .await?
        .ok_or_else(|| AppError::Validation("Your cart is empty".to_string()))?;

    let config = state.config();
    let outcome = state
        .orders()
        .checkout(CheckoutInput {
            cart_id,
            user_id: user.as_ref().map(|u| u.id),
            email,
            shipping: body.shipping,
            discount_code: body.discount_code,
            success_url: config.url_for("/checkout/success?session_id={CHECKOUT_SESSION_ID}"),
            cancel_url: config.url_for("/cart"),
        })
        .await?;

    tracing::info!(
        order_id = %outcome.order.id,
        order_number = %outcome.order.order_number,
        total = %outcome.order.total,
        "Checkout started"
    );

    success(
        "Order created",
        CheckoutResponse {
            order_id: outcome.order.id,
            order_number: outcome.order.order_number,
            total: outcome.order.total,
            checkout_url: outcome.checkout_url,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_in_email_wins() {
        let account = Email::parse("member@example.com").unwrap();
        let email = resolve_email(Some(&account), Some("other@example.com")).unwrap();
        assert_eq!(email, account);
    }

    #[test]
    fn test_guest_email_required_and_parsed() {
        assert!(matches!(
            resolve_email(None, None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve_email(None, Some("   ")),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve_email(None, Some("not-an-email")),
            Err(AppError::Validation(_))
        ));
        assert_eq!(
            resolve_email(None, Some(" Guest@Example.com ")).unwrap().as_str(),
            "guest@example.com"
        );
    }

    #[test]
    fn test_request_shape() {
        let body: CheckoutRequest = serde_json::from_str(
            r#"{
                "email": "guest@example.com",
                "shipping": {
                    "name": "Ada Lovelace",
                    "line1": "12 St James's Square",
                    "line2": null,
                    "city": "London",
                    "postal_code": "SW1Y 4JH",
                    "country": "GB"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(body.shipping.city, "London");
        assert!(body.discount_code.is_none());
    }
}
