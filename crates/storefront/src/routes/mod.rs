//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                          - Liveness check
//! GET    /health/ready                    - Readiness check (database)
//!
//! # Catalog (cached)
//! GET    /api/products                    - Product listing with filters
//! GET    /api/products/{slug}             - Product detail with SKUs
//! GET    /api/collections                 - Collection listing
//! GET    /api/collections/{slug}          - Collection with a page of products
//!
//! # Cart
//! GET    /api/cart                        - Current cart
//! DELETE /api/cart                        - Empty the cart
//! POST   /api/cart/items                  - Add a SKU
//! PATCH  /api/cart/items/{sku_id}         - Set quantity (0 removes)
//! DELETE /api/cart/items/{sku_id}         - Remove a SKU
//!
//! # Checkout
//! POST   /api/checkout                    - Create order and payment session
//!
//! # Account
//! POST   /api/account/register            - Register (rate limited)
//! POST   /api/account/login               - Sign in (rate limited)
//! POST   /api/account/logout              - Sign out
//! GET    /api/account/profile             - Profile (requires auth)
//! PATCH  /api/account/profile             - Update name/email (requires auth)
//! POST   /api/account/password            - Change password (rate limited, requires auth)
//!
//! # Orders (requires auth)
//! GET    /api/orders                      - Order history
//! GET    /api/orders/{id}                 - Order detail
//! POST   /api/orders/{id}/cancel          - Cancel an unpaid order
//! POST   /api/orders/{id}/refund-request  - Ask for a refund
//!
//! # Wishlist (FEATURE_WISHLIST, requires auth)
//! GET    /api/wishlist                    - Wishlist
//! POST   /api/wishlist/toggle             - Add or remove a product
//!
//! # Newsletter (FEATURE_NEWSLETTER)
//! POST   /api/newsletter/subscribe        - Subscribe
//! POST   /api/newsletter/unsubscribe      - Unsubscribe by token
//! GET    /api/newsletter/unsubscribe      - Unsubscribe link from emails
//!
//! # Integrations
//! POST   /api/webhooks/payments           - Payment provider webhook
//! POST   /api/revalidate                  - Drop catalog cache tags
//! ```

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod health;
pub mod newsletter;
pub mod orders;
pub mod revalidate;
pub mod webhooks;
pub mod wishlist;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::config::FeatureFlags;
use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::list_products))
        .route("/products/{slug}", get(catalog::get_product))
        .route("/collections", get(catalog::list_collections))
        .route("/collections/{slug}", get(catalog::get_collection))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::get_cart).delete(cart::clear_cart))
        .route("/items", post(cart::add_item))
        .route(
            "/items/{sku_id}",
            patch(cart::update_item).delete(cart::remove_item),
        )
}

/// Create the account routes router.
///
/// Credential-handling routes get the strict limiter.
pub fn account_routes() -> Router<AppState> {
    let credentials = Router::new()
        .route("/register", post(account::register))
        .route("/login", post(account::login))
        .route("/password", post(account::change_password))
        .route_layer(auth_rate_limiter());

    Router::new()
        .route("/logout", post(account::logout))
        .route(
            "/profile",
            get(account::get_profile).patch(account::update_profile),
        )
        .merge(credentials)
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list_orders))
        .route("/{id}", get(orders::get_order))
        .route("/{id}/cancel", post(orders::cancel_order))
        .route("/{id}/refund-request", post(orders::request_refund))
}

/// Create the wishlist routes router.
pub fn wishlist_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(wishlist::list_wishlist))
        .route("/toggle", post(wishlist::toggle_item))
}

/// Create the newsletter routes router.
pub fn newsletter_routes() -> Router<AppState> {
    Router::new()
        .route("/subscribe", post(newsletter::subscribe))
        .route(
            "/unsubscribe",
            get(newsletter::unsubscribe_link).post(newsletter::unsubscribe),
        )
}

/// Create all routes for the storefront.
///
/// Disabled features are not mounted and answer 404.
pub fn routes(features: FeatureFlags) -> Router<AppState> {
    let mut api = Router::new()
        .merge(catalog_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::checkout))
        .nest("/account", account_routes())
        .nest("/orders", order_routes());

    if features.wishlist {
        api = api.nest("/wishlist", wishlist_routes());
    }
    if features.newsletter {
        api = api.nest("/newsletter", newsletter_routes());
    }

    // Server-to-server endpoints are not rate limited per client IP.
    let integrations = Router::new()
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        .route("/revalidate", post(revalidate::revalidate));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api.route_layer(api_rate_limiter()).merge(integrations))
}
