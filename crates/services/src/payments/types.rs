//! Payment provider API objects.
//!
//! Only the fields Atelier reads are modelled. Unknown enum values
//! deserialize to an `Unknown` variant so new provider states never break
//! webhook handling.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

use atelier_core::OrderId;

/// Metadata key carrying the Atelier order id on sessions, intents and charges.
pub const ORDER_ID_METADATA_KEY: &str = "order_id";

fn order_id_from(metadata: &HashMap<String, String>) -> Option<OrderId> {
    metadata
        .get(ORDER_ID_METADATA_KEY)
        .and_then(|raw| raw.parse::<i32>().ok())
        .map(OrderId::new)
}

/// Convert provider minor units into a decimal amount.
#[must_use]
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSessionStatus {
    Open,
    Complete,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

/// A hosted checkout session.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub status: Option<CheckoutSessionStatus>,
    pub payment_status: SessionPaymentStatus,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
}

impl CheckoutSession {
    /// The Atelier order this session pays for.
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        order_id_from(&self.metadata).or_else(|| {
            self.client_reference_id
                .as_deref()
                .and_then(|raw| raw.parse::<i32>().ok())
                .map(OrderId::new)
        })
    }

    /// Whether the customer has paid (or nothing was due).
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(
            self.payment_status,
            SessionPaymentStatus::Paid | SessionPaymentStatus::NoPaymentRequired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderRefundStatus {
    Pending,
    RequiresAction,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl ProviderRefundStatus {
    /// Whether the provider rejected the refund outright.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::Canceled)
    }
}

/// A refund created at the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    pub status: ProviderRefundStatus,
    pub amount: i64,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

/// The object of a `payment_intent.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub last_payment_error: Option<PaymentErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentErrorDetail {
    #[serde(default)]
    pub message: Option<String>,
}

impl PaymentIntentObject {
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        order_id_from(&self.metadata)
    }
}

/// The object of a `charge.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Cumulative refunded amount in minor units.
    #[serde(default)]
    pub amount_refunded: i64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ChargeObject {
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        order_id_from(&self.metadata)
    }
}

/// The object of a `charge.dispute.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct DisputeObject {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl DisputeObject {
    #[must_use]
    pub fn order_id(&self) -> Option<OrderId> {
        order_id_from(&self.metadata)
    }
}

/// A webhook event envelope, as delivered or as fetched from `/v1/events/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// The event types Atelier acts on, with their typed payloads.
#[derive(Debug, Clone)]
pub enum EventKind {
    CheckoutCompleted(CheckoutSession),
    CheckoutExpired(CheckoutSession),
    PaymentFailed(PaymentIntentObject),
    ChargeRefunded(ChargeObject),
    DisputeCreated(DisputeObject),
    /// Recorded and acknowledged, nothing else.
    Other(String),
}

impl PaymentEvent {
    /// Decode the event object according to the event type.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the object does not match its type.
    pub fn kind(&self) -> Result<EventKind, serde_json::Error> {
        let object = self.data.object.clone();
        Ok(match self.event_type.as_str() {
            "checkout.session.completed" => EventKind::CheckoutCompleted(serde_json::from_value(object)?),
            "checkout.session.expired" => EventKind::CheckoutExpired(serde_json::from_value(object)?),
            "payment_intent.payment_failed" => EventKind::PaymentFailed(serde_json::from_value(object)?),
            "charge.refunded" => EventKind::ChargeRefunded(serde_json::from_value(object)?),
            "charge.dispute.created" => EventKind::DisputeCreated(serde_json::from_value(object)?),
            other => EventKind::Other(other.to_owned()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn event(event_type: &str, object: serde_json::Value) -> PaymentEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "created": 1_760_000_000,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_checkout_completed_decodes_order_id() {
        let ev = event(
            "checkout.session.completed",
            json!({
                "id": "cs_test_1",
                "status": "complete",
                "payment_status": "paid",
                "payment_intent": "pi_1",
                "metadata": { "order_id": "42" }
            }),
        );

        let EventKind::CheckoutCompleted(session) = ev.kind().unwrap() else {
            panic!("expected checkout completion");
        };
        assert_eq!(session.order_id(), Some(OrderId::new(42)));
        assert!(session.is_paid());
        assert_eq!(session.status, Some(CheckoutSessionStatus::Complete));
    }

    #[test]
    fn test_client_reference_id_fallback() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_test_2",
            "payment_status": "unpaid",
            "client_reference_id": "7"
        }))
        .unwrap();
        assert_eq!(session.order_id(), Some(OrderId::new(7)));
        assert!(!session.is_paid());
    }

    #[test]
    fn test_unknown_states_do_not_fail() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_test_3",
            "status": "something_new",
            "payment_status": "also_new"
        }))
        .unwrap();
        assert_eq!(session.status, Some(CheckoutSessionStatus::Unknown));
        assert_eq!(session.payment_status, SessionPaymentStatus::Unknown);
    }

    #[test]
    fn test_charge_refunded_amount() {
        let ev = event(
            "charge.refunded",
            json!({ "id": "ch_1", "payment_intent": "pi_1", "amount_refunded": 1250 }),
        );
        let EventKind::ChargeRefunded(charge) = ev.kind().unwrap() else {
            panic!("expected charge refund");
        };
        assert_eq!(from_minor_units(charge.amount_refunded), Decimal::new(1250, 2));
        assert_eq!(charge.order_id(), None);
    }

    #[test]
    fn test_unhandled_type_is_other() {
        let ev = event("customer.created", json!({ "id": "cus_1" }));
        assert!(matches!(ev.kind().unwrap(), EventKind::Other(t) if t == "customer.created"));
    }

    #[test]
    fn test_malformed_object_is_an_error() {
        let ev = event("charge.refunded", json!({ "amount_refunded": 10 }));
        assert!(ev.kind().is_err());
    }
}
