//! Client for the payment provider's REST API.
//!
//! Requests are form-encoded and authenticated with the secret key as a
//! bearer token. Every mutating call carries an `Idempotency-Key` derived
//! from the Atelier row it acts on, so retries never charge or refund twice.

mod types;

pub use types::*;

use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use atelier_core::{CurrencyCode, OrderId, Price, RefundId, RefundReason};

use crate::config::PaymentConfig;

/// Errors that can occur when calling the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Amount cannot be expressed in minor units.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

/// What to charge for one order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub order_id: OrderId,
    pub order_number: &'a str,
    pub email: &'a str,
    pub total: Decimal,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

/// A refund against a captured payment.
#[derive(Debug, Clone)]
pub struct RefundRequest<'a> {
    pub refund_id: RefundId,
    pub order_id: OrderId,
    pub payment_intent: &'a str,
    pub amount: Decimal,
    pub reason: RefundReason,
    /// Failed attempts before this one.
    pub attempt: i32,
}

impl RefundRequest<'_> {
    /// Idempotency key for this attempt. A failed refund approved again
    /// gets a fresh key so the provider does not replay the earlier decline.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        format!("refund-{}-{}", self.refund_id, self.attempt)
    }
}

/// Payment provider API client.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_base: String,
    currency: CurrencyCode,
}

impl PaymentClient {
    /// Create a new payment client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let mut auth_value =
            HeaderValue::from_str(&format!("Bearer {}", config.secret_key.expose_secret()))
                .map_err(|e| PaymentError::Parse(format!("Invalid API key format: {e}")))?;
        auth_value.set_sensitive(true);
        headers.insert("Authorization", auth_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.as_str().trim_end_matches('/').to_owned(),
            currency: config.currency,
        })
    }

    /// Currency orders are charged in.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.currency
    }

    /// Create a hosted checkout session for an order.
    ///
    /// # Errors
    ///
    /// Returns error if the total is invalid or the API request fails.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = checkout_form(request, self.currency)?;
        self.post(
            "/v1/checkout/sessions",
            &form,
            Some(&format!("checkout-{}", request.order_id)),
        )
        .await
    }

    /// Fetch a checkout session.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        self.get(&format!("/v1/checkout/sessions/{session_id}")).await
    }

    /// Expire an open checkout session so it can no longer be paid.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails, including when the session
    /// is already complete.
    pub async fn expire_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        self.post(
            &format!("/v1/checkout/sessions/{session_id}/expire"),
            &[],
            None,
        )
        .await
    }

    /// Refund part or all of a captured payment.
    ///
    /// # Errors
    ///
    /// Returns error if the amount is invalid or the API request fails.
    #[tracing::instrument(skip(self, request), fields(refund_id = %request.refund_id))]
    pub async fn create_refund(
        &self,
        request: &RefundRequest<'_>,
    ) -> Result<ProviderRefund, PaymentError> {
        let form = refund_form(request, self.currency)?;
        self.post(
            "/v1/refunds",
            &form,
            Some(&request.idempotency_key()),
        )
        .await
    }

    /// Fetch an event by its provider id.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails.
    pub async fn retrieve_event(&self, event_id: &str) -> Result<PaymentEvent, PaymentError> {
        self.get(&format!("/v1/events/{event_id}")).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, PaymentError> {
        let response = self
            .client
            .get(format!("{}{path}", self.api_base))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, PaymentError> {
        let mut request = self
            .client
            .post(format!("{}{path}", self.api_base))
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, PaymentError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| {
                    let kind = envelope.error.error_type.unwrap_or_default();
                    envelope
                        .error
                        .message
                        .map(|m| if kind.is_empty() { m } else { format!("{kind}: {m}") })
                })
                .unwrap_or(body);
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|e| PaymentError::Parse(e.to_string()))
    }
}

/// Convert a decimal amount into provider minor units.
///
/// # Errors
///
/// Returns `PaymentError::InvalidAmount` for negative or oversized amounts.
pub fn to_minor_units(amount: Decimal, currency: CurrencyCode) -> Result<i64, PaymentError> {
    Price::new(amount, currency)
        .minor_units()
        .filter(|minor| *minor >= 0)
        .ok_or(PaymentError::InvalidAmount(amount))
}

fn checkout_form(
    request: &CheckoutRequest<'_>,
    currency: CurrencyCode,
) -> Result<Vec<(String, String)>, PaymentError> {
    let unit_amount = to_minor_units(request.total, currency)?;
    let order_id = request.order_id.to_string();

    Ok(vec![
        ("mode".into(), "payment".into()),
        ("client_reference_id".into(), order_id.clone()),
        ("customer_email".into(), request.email.to_owned()),
        ("success_url".into(), request.success_url.to_owned()),
        ("cancel_url".into(), request.cancel_url.to_owned()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            currency.provider_code().to_owned(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            unit_amount.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            format!("Order {}", request.order_number),
        ),
        (format!("metadata[{ORDER_ID_METADATA_KEY}]"), order_id.clone()),
        ("metadata[order_number]".into(), request.order_number.to_owned()),
        (
            format!("payment_intent_data[metadata][{ORDER_ID_METADATA_KEY}]"),
            order_id,
        ),
    ])
}

fn refund_form(
    request: &RefundRequest<'_>,
    currency: CurrencyCode,
) -> Result<Vec<(String, String)>, PaymentError> {
    let amount = to_minor_units(request.amount, currency)?;
    if amount == 0 {
        return Err(PaymentError::InvalidAmount(request.amount));
    }

    Ok(vec![
        ("payment_intent".into(), request.payment_intent.to_owned()),
        ("amount".into(), amount.to_string()),
        ("reason".into(), request.reason.provider_reason().to_owned()),
        ("metadata[refund_id]".into(), request.refund_id.to_string()),
        (
            format!("metadata[{ORDER_ID_METADATA_KEY}]"),
            request.order_id.to_string(),
        ),
    ])
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn field<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
        form.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_checkout_form_charges_order_total() {
        let request = CheckoutRequest {
            order_id: OrderId::new(42),
            order_number: "ORD-20260101-ABC123",
            email: "ada@example.com",
            total: Decimal::new(5_000, 2),
            success_url: "https://shop.test/checkout/success",
            cancel_url: "https://shop.test/cart",
        };

        let form = checkout_form(&request, CurrencyCode::GBP).unwrap();

        assert_eq!(field(&form, "mode"), Some("payment"));
        assert_eq!(field(&form, "line_items[0][price_data][unit_amount]"), Some("5000"));
        assert_eq!(field(&form, "line_items[0][price_data][currency]"), Some("gbp"));
        assert_eq!(field(&form, "metadata[order_id]"), Some("42"));
        assert_eq!(field(&form, "payment_intent_data[metadata][order_id]"), Some("42"));
        assert_eq!(field(&form, "client_reference_id"), Some("42"));
    }

    #[test]
    fn test_refund_form_uses_provider_reason() {
        let request = RefundRequest {
            refund_id: RefundId::new(9),
            order_id: OrderId::new(42),
            payment_intent: "pi_123",
            amount: Decimal::new(1_999, 2),
            reason: RefundReason::Fraudulent,
            attempt: 0,
        };

        let form = refund_form(&request, CurrencyCode::GBP).unwrap();

        assert_eq!(field(&form, "amount"), Some("1999"));
        assert_eq!(field(&form, "reason"), Some("fraudulent"));
        assert_eq!(field(&form, "metadata[refund_id]"), Some("9"));
    }

    #[test]
    fn test_refund_key_changes_per_attempt() {
        let mut request = RefundRequest {
            refund_id: RefundId::new(7),
            order_id: OrderId::new(3),
            payment_intent: "pi_123",
            amount: Decimal::new(500, 2),
            reason: RefundReason::Damaged,
            attempt: 0,
        };
        let first = request.idempotency_key();
        assert_eq!(first, "refund-7-0");

        request.attempt = 1;
        assert_eq!(request.idempotency_key(), "refund-7-1");
        assert_ne!(request.idempotency_key(), first);
    }

    #[test]
    fn test_zero_refund_rejected() {
        let request = RefundRequest {
            refund_id: RefundId::new(1),
            order_id: OrderId::new(1),
            payment_intent: "pi_123",
            amount: Decimal::ZERO,
            reason: RefundReason::Other,
            attempt: 0,
        };
        assert!(matches!(
            refund_form(&request, CurrencyCode::GBP),
            Err(PaymentError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(to_minor_units(Decimal::new(-100, 2), CurrencyCode::GBP).is_err());
        assert_eq!(to_minor_units(Decimal::new(1_050, 2), CurrencyCode::GBP).unwrap(), 1050);
    }
}
