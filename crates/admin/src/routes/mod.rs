//! HTTP route handlers for admin.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                                   - Health check
//!
//! # Auth
//! POST   /api/auth/login                           - Password login (admins only)
//! POST   /api/auth/logout                          - Logout
//! GET    /api/auth/me                              - Signed-in admin
//!
//! # Dashboard
//! GET    /api/dashboard                            - Headline numbers
//!
//! # Orders
//! GET    /api/orders                               - Filtered order listing
//! GET    /api/orders/{id}                          - Order with items and refunds
//! POST   /api/orders/{id}/status                   - Move to a new status
//! POST   /api/orders/{id}/cancel                   - Cancel, optionally restocking
//!
//! # Refunds
//! GET    /api/refunds                              - Refund listing
//! POST   /api/refunds                              - Create a pending refund
//! POST   /api/refunds/{id}/approve                 - Issue the refund
//! POST   /api/refunds/{id}/reject                  - Reject
//!
//! # Catalog (changes revalidate the storefront cache)
//! GET    /api/products                             - Products, inactive included
//! POST   /api/products                             - Create product
//! GET    /api/products/{id}                        - Product with SKUs
//! PATCH  /api/products/{id}                        - Update product
//! DELETE /api/products/{id}                        - Delete product
//! POST   /api/products/{id}/skus                   - Create SKU
//! PATCH  /api/skus/{id}                            - Update SKU
//! DELETE /api/skus/{id}                            - Delete SKU
//! POST   /api/skus/{id}/inventory                  - Adjust stock by a delta
//! GET    /api/collections                          - Collections
//! POST   /api/collections                          - Create collection
//! GET    /api/collections/{id}                     - Collection with products
//! PATCH  /api/collections/{id}                     - Update collection
//! DELETE /api/collections/{id}                     - Delete collection
//! POST   /api/collections/{id}/products            - Add or reposition a product
//! DELETE /api/collections/{id}/products/{pid}      - Remove a product
//!
//! # Discounts
//! GET    /api/discounts                            - Discount codes
//! POST   /api/discounts                            - Create
//! GET    /api/discounts/{id}                       - Detail
//! PUT    /api/discounts/{id}                       - Replace
//! DELETE /api/discounts/{id}                       - Delete
//!
//! # Newsletter
//! GET    /api/newsletter                           - Subscribers
//! GET    /api/newsletter/export                    - CSV download
//! DELETE /api/newsletter/{id}                      - Delete subscriber
//!
//! # Users
//! GET    /api/users                                - Users
//! PUT    /api/users/{id}/role                      - Change role
//!
//! # Webhook events
//! GET    /api/webhook-events                       - Recorded events
//! GET    /api/webhook-events/{id}                  - Event with payload
//! POST   /api/webhook-events/{id}/retry            - Apply again
//!
//! # Cron (bearer CRON_SECRET, no session)
//! GET    /api/cron/{job}                           - Run a scheduled job
//! POST   /api/cron/{job}                           - Run a scheduled job
//! ```

pub mod auth;
pub mod collections;
pub mod cron;
pub mod dashboard;
pub mod discounts;
pub mod health;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod refunds;
pub mod users;
pub mod webhook_events;

use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};

use crate::state::AppState;

/// Ask the storefront to drop cache `tags` without holding up the response.
pub(crate) fn revalidate_catalog(state: &AppState, tags: Vec<String>) {
    let client = state.revalidation().clone();
    tokio::spawn(async move {
        client.revalidate_best_effort(tags).await;
    });
}

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the order and refund routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(orders::list_orders))
        .route("/orders/{id}", get(orders::get_order))
        .route("/orders/{id}/status", post(orders::update_status))
        .route("/orders/{id}/cancel", post(orders::cancel_order))
        .route(
            "/refunds",
            get(refunds::list_refunds).post(refunds::create_refund),
        )
        .route("/refunds/{id}/approve", post(refunds::approve_refund))
        .route("/refunds/{id}/reject", post(refunds::reject_refund))
}

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/products",
            get(products::list_products).post(products::create_product),
        )
        .route(
            "/products/{id}",
            get(products::get_product)
                .patch(products::update_product)
                .delete(products::delete_product),
        )
        .route("/products/{id}/skus", post(products::create_sku))
        .route(
            "/skus/{id}",
            patch(products::update_sku).delete(products::delete_sku),
        )
        .route("/skus/{id}/inventory", post(products::adjust_inventory))
        .route(
            "/collections",
            get(collections::list_collections).post(collections::create_collection),
        )
        .route(
            "/collections/{id}",
            get(collections::get_collection)
                .patch(collections::update_collection)
                .delete(collections::delete_collection),
        )
        .route("/collections/{id}/products", post(collections::add_product))
        .route(
            "/collections/{id}/products/{product_id}",
            delete(collections::remove_product),
        )
        .route(
            "/discounts",
            get(discounts::list_discounts).post(discounts::create_discount),
        )
        .route(
            "/discounts/{id}",
            get(discounts::get_discount)
                .put(discounts::update_discount)
                .delete(discounts::delete_discount),
        )
}

/// Create the customer-facing data routes router.
pub fn audience_routes() -> Router<AppState> {
    Router::new()
        .route("/newsletter", get(newsletter::list_subscribers))
        .route("/newsletter/export", get(newsletter::export_subscribers))
        .route("/newsletter/{id}", delete(newsletter::delete_subscriber))
        .route("/users", get(users::list_users))
        .route("/users/{id}/role", put(users::set_user_role))
}

/// Create the webhook event routes router.
pub fn webhook_event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(webhook_events::list_events))
        .route("/{id}", get(webhook_events::get_event))
        .route("/{id}/retry", post(webhook_events::retry_event))
}

/// Create all routes for admin.
pub fn routes() -> Router<AppState> {
    let api = Router::new()
        .nest("/auth", auth_routes())
        .route("/dashboard", get(dashboard::stats))
        .merge(order_routes())
        .merge(catalog_routes())
        .merge(audience_routes())
        .nest("/webhook-events", webhook_event_routes())
        .route("/cron/{job}", get(cron::run_job).post(cron::run_job));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api)
}
