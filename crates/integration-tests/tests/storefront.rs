//! Storefront router tests.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use secrecy::SecretString;
use serde_json::json;

use atelier_integration_tests::{
    REVALIDATE_SECRET, WEBHOOK_SECRET, empty_request, json_request, send, storefront,
};
use atelier_services::webhooks::{SIGNATURE_HEADER, compute_signature};
use atelier_storefront::config::FeatureFlags;

fn signed_webhook(body: &str, timestamp: i64) -> Request<Body> {
    let signature =
        compute_signature(&SecretString::from(WEBHOOK_SECRET), timestamp, body.as_bytes())
            .unwrap();
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/payments")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, format!("t={timestamp},v1={signature}"))
        .body(Body::from(body.to_owned()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = storefront(FeatureFlags::default());
    let response = send(app, empty_request("GET", "/health")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "ok");
    assert!(response.header("x-request-id").is_some());
    assert_eq!(response.header("x-frame-options"), Some("DENY"));
    assert_eq!(response.header("x-content-type-options"), Some("nosniff"));
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let app = storefront(FeatureFlags::default());
    let response = send(app, empty_request("GET", "/health/ready")).await;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = storefront(FeatureFlags::default());
    let response = send(app, empty_request("GET", "/api/does-not-exist")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_profile_requires_sign_in() {
    let app = storefront(FeatureFlags::default());
    let response = send(app, empty_request("GET", "/api/account/profile")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    let body = response.json();
    assert_eq!(body["status"], "unauthorized");
    assert_eq!(body["message"], "Please sign in to continue");
}

#[tokio::test]
async fn test_order_history_requires_sign_in() {
    let app = storefront(FeatureFlags::default());
    let response = send(app, empty_request("GET", "/api/orders")).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cart_rejects_out_of_range_quantity() {
    let app = storefront(FeatureFlags::default());
    let response = send(
        app,
        json_request("POST", "/api/cart/items", &json!({ "sku_id": 1, "quantity": 0 })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["status"], "validation_error");
}

#[tokio::test]
async fn test_cart_rejects_malformed_body() {
    let app = storefront(FeatureFlags::default());
    let response = send(
        app,
        json_request("POST", "/api/cart/items", &json!({ "sku_id": "blue" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["status"], "validation_error");
}

#[tokio::test]
async fn test_newsletter_rejects_invalid_email() {
    let app = storefront(FeatureFlags::default());
    let response = send(
        app,
        json_request(
            "POST",
            "/api/newsletter/subscribe",
            &json!({ "email": "not-an-email" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["message"], "Invalid email address");
}

#[tokio::test]
async fn test_disabled_features_are_not_mounted() {
    let features = FeatureFlags {
        wishlist: false,
        newsletter: false,
    };

    let response = send(storefront(features), empty_request("GET", "/api/wishlist")).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = send(
        storefront(features),
        json_request(
            "POST",
            "/api/newsletter/subscribe",
            &json!({ "email": "reader@example.com" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_webhook_without_signature_is_rejected() {
    let app = storefront(FeatureFlags::default());
    let response = send(
        app,
        json_request(
            "POST",
            "/api/webhooks/payments",
            &json!({ "id": "evt_1", "type": "checkout.session.completed" }),
        ),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["message"], "Invalid signature");
}

#[tokio::test]
async fn test_webhook_with_wrong_signature_is_rejected() {
    let app = storefront(FeatureFlags::default());
    let now = chrono::Utc::now().timestamp();
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/payments")
        .header(SIGNATURE_HEADER, format!("t={now},v1={}", "0".repeat(64)))
        .body(Body::from(r#"{"id":"evt_1"}"#))
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_with_stale_signature_is_rejected() {
    let app = storefront(FeatureFlags::default());
    let stale = chrono::Utc::now().timestamp() - 3600;
    let response = send(app, signed_webhook(r#"{"id":"evt_1"}"#, stale)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_webhook_with_bad_payload_is_bad_request() {
    let app = storefront(FeatureFlags::default());
    let now = chrono::Utc::now().timestamp();
    let response = send(app, signed_webhook("not json", now)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["status"], "validation_error");
}

#[tokio::test]
async fn test_revalidate_requires_bearer_secret() {
    let app = storefront(FeatureFlags::default());
    let response = send(
        app,
        json_request("POST", "/api/revalidate", &json!({ "tags": ["products"] })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_revalidate_drops_tags() {
    let app = storefront(FeatureFlags::default());
    let request = Request::builder()
        .method("POST")
        .uri("/api/revalidate")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {REVALIDATE_SECRET}"))
        .body(Body::from(
            json!({ "tags": [" products ", "", "product:linen-shirt"] }).to_string(),
        ))
        .unwrap();
    let response = send(app, request).await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["tags"], json!(["products", "product:linen-shirt"]));
}
