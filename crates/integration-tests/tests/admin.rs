//! Admin router tests.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;

use atelier_integration_tests::{CRON_SECRET, admin, empty_request, json_request, send};

fn cron_request(method: &str, job: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(format!("/api/cron/{job}"));
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = send(admin(), empty_request("GET", "/health")).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn test_responses_are_never_cached() {
    let response = send(admin(), empty_request("GET", "/health")).await;

    assert_eq!(response.header("cache-control"), Some("no-store, private"));
    assert!(response.header("strict-transport-security").is_some());
}

#[tokio::test]
async fn test_request_id_is_generated_not_echoed() {
    let mut request = empty_request("GET", "/health");
    request
        .headers_mut()
        .insert("x-request-id", "client-chosen".parse().unwrap());
    let response = send(admin(), request).await;

    let id = response.header("x-request-id").unwrap();
    assert_ne!(id, "client-chosen");
    assert!(uuid_like(id));
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = send(admin(), empty_request("GET", "/api/customers")).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_requires_admin_session() {
    for uri in [
        "/api/auth/me",
        "/api/dashboard",
        "/api/orders",
        "/api/refunds",
        "/api/products",
        "/api/collections",
        "/api/discounts",
        "/api/newsletter",
        "/api/newsletter/export",
        "/api/users",
        "/api/webhook-events",
    ] {
        let response = send(admin(), empty_request("GET", uri)).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.json()["status"], "unauthorized", "{uri}");
    }
}

#[tokio::test]
async fn test_mutations_require_admin_session() {
    let response = send(
        admin(),
        json_request(
            "POST",
            "/api/products",
            &json!({ "name": "Linen Shirt", "price": "65.00" }),
        ),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(
        admin(),
        json_request("POST", "/api/orders/1/cancel", &json!({ "restock": true })),
    )
    .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_rejects_malformed_body() {
    let response = send(
        admin(),
        json_request("POST", "/api/auth/login", &json!({ "email": "a@example.com" })),
    )
    .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.json()["status"], "validation_error");
}

#[tokio::test]
async fn test_cron_requires_bearer_secret() {
    let response = send(admin(), cron_request("POST", "sessions", None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(admin(), cron_request("GET", "sessions", Some("wrong-secret"))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cron_unknown_job_is_not_found() {
    let response = send(admin(), cron_request("POST", "backup", Some(CRON_SECRET))).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["message"], "Unknown job: backup");
}
