//! A stub payment provider and seeded orders for service tests.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::PgPool;
use url::Url;

use atelier_core::pricing::OrderTotals;
use atelier_core::{CurrencyCode, Email};
use atelier_db::models::{NewOrder, NewOrderItem, NewProduct, NewSku, Order, ShippingAddress, Sku};
use atelier_db::{OrderRepository, ProductRepository};

use crate::config::PaymentConfig;
use crate::email::EmailService;
use crate::orders::OrderService;
use crate::payments::PaymentClient;

/// Objects the stub serves, keyed by id.
#[derive(Default)]
pub struct ProviderObjects {
    pub sessions: HashMap<String, Value>,
    pub events: HashMap<String, Value>,
}

type Objects = Arc<ProviderObjects>;

fn lookup(objects: &HashMap<String, Value>, id: &str) -> (StatusCode, Json<Value>) {
    objects.get(id).map_or_else(
        || {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": { "type": "invalid_request_error", "message": "No such object" } })),
            )
        },
        |object| (StatusCode::OK, Json(object.clone())),
    )
}

async fn session(
    State(objects): State<Objects>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    lookup(&objects.sessions, &id)
}

async fn event(
    State(objects): State<Objects>,
    Path(id): Path<String>,
) -> (StatusCode, Json<Value>) {
    lookup(&objects.events, &id)
}

/// Serve `objects` on a local port and return its base URL.
pub async fn stub_provider(objects: ProviderObjects) -> Url {
    let app = Router::new()
        .route("/v1/checkout/sessions/{id}", get(session))
        .route("/v1/events/{id}", get(event))
        .with_state(Arc::new(objects));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Url::parse(&format!("http://{addr}")).unwrap()
}

pub fn order_service(pool: &PgPool, api_base: Url) -> OrderService {
    let payments = PaymentClient::new(&PaymentConfig {
        secret_key: SecretString::from("sk_test_Zq81nZd0aLp3xYkT4vB7"),
        api_base,
        currency: CurrencyCode::GBP,
    })
    .unwrap();
    OrderService::new(pool.clone(), payments, EmailService::disabled())
}

pub fn session_object(id: &str, status: &str, payment_status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "payment_status": payment_status,
        "payment_intent": if payment_status == "paid" { Some(format!("pi_{id}")) } else { None },
    })
}

pub async fn sku_with_stock(pool: &PgPool, slug: &str, stock: i32) -> Sku {
    let products = ProductRepository::new(pool);
    let product = products
        .create(&NewProduct {
            name: format!("Product {slug}"),
            slug: slug.to_string(),
            description: String::new(),
            price: Decimal::new(2_500, 2),
            is_active: true,
        })
        .await
        .unwrap();
    products
        .create_sku(
            product.id,
            &NewSku {
                code: format!("SKU-{}", slug.to_uppercase()),
                color: None,
                size: None,
                material: None,
                price: None,
                stock,
            },
        )
        .await
        .unwrap()
}

pub async fn stock_of(pool: &PgPool, sku: &Sku) -> i32 {
    ProductRepository::new(pool)
        .get_sku(sku.id)
        .await
        .unwrap()
        .unwrap()
        .stock
}

/// An unpaid order for one unit of `sku`, optionally linked to a checkout session.
pub async fn pending_order(
    pool: &PgPool,
    order_number: &str,
    sku: &Sku,
    session_id: Option<&str>,
) -> Order {
    let total = Decimal::new(2_500, 2);
    let orders = OrderRepository::new(pool);
    let order = orders
        .create_with_items(
            &NewOrder {
                order_number: order_number.to_string(),
                user_id: None,
                cart_id: None,
                email: Email::parse("buyer@example.com").unwrap(),
                totals: OrderTotals {
                    subtotal: total,
                    discount_total: Decimal::ZERO,
                    tax_total: Decimal::ZERO,
                    total,
                },
                currency: "GBP".to_string(),
                discount_code: None,
                shipping: ShippingAddress {
                    name: "Ada Buyer".to_string(),
                    line1: "1 High Street".to_string(),
                    line2: None,
                    city: "Leeds".to_string(),
                    postal_code: "LS1 1AA".to_string(),
                    country: "GB".to_string(),
                },
            },
            &[NewOrderItem {
                sku_id: sku.id,
                product_name: "Product".to_string(),
                sku_code: sku.code.clone(),
                quantity: 1,
                unit_price: total,
            }],
        )
        .await
        .unwrap();

    if let Some(session_id) = session_id {
        orders.set_checkout_session(order.id, session_id).await.unwrap();
    }
    order
}

pub async fn reload(pool: &PgPool, order: &Order) -> Order {
    OrderRepository::new(pool).get(order.id).await.unwrap().unwrap()
}
