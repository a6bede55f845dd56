//! Repositories, one per aggregate.
//!
//! Each repository borrows the pool; construct one per request:
//!
//! ```rust,ignore
//! let user = UserRepository::new(state.pool()).get_by_id(id).await?;
//! ```

pub mod carts;
pub mod collections;
pub mod dashboard;
pub mod discounts;
pub mod newsletter;
pub mod orders;
pub mod products;
pub mod refunds;
pub mod sessions;
pub mod users;
pub mod webhook_events;
pub mod wishlist;

pub use carts::CartRepository;
pub use collections::CollectionRepository;
pub use dashboard::DashboardRepository;
pub use discounts::DiscountRepository;
pub use newsletter::NewsletterRepository;
pub use orders::OrderRepository;
pub use products::ProductRepository;
pub use refunds::{RefundRepository, RefundUpdate};
pub use sessions::{ADMIN_SESSION_TABLE, STOREFRONT_SESSION_TABLE, SessionRepository};
pub use users::UserRepository;
pub use webhook_events::WebhookEventRepository;
pub use wishlist::WishlistRepository;
