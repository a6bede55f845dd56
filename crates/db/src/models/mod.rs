//! Row models shared by the repositories and the HTTP layers.
//!
//! Models derive `sqlx::FromRow` and decode straight into the typed ids and
//! status enums from `atelier-core`.

pub mod cart;
pub mod catalog;
pub mod dashboard;
pub mod discount;
pub mod newsletter;
pub mod order;
pub mod refund;
pub mod user;
pub mod webhook_event;
pub mod wishlist;

pub use cart::{CartLine, CartSummary};
pub use catalog::{
    Collection, NewCollection, NewProduct, NewSku, Product, ProductDetail, ProductFilter,
    ProductSort, ProductSummary, Sku, UpdateCollection, UpdateProduct, UpdateSku,
};
pub use dashboard::DashboardStats;
pub use discount::{Discount, DiscountInput};
pub use newsletter::{NewsletterSubscription, SubscribeOutcome};
pub use order::{
    NewOrder, NewOrderItem, Order, OrderDetail, OrderFilter, OrderItem, OrderSort,
    ShippingAddress,
};
pub use refund::{NewRefund, Refund, RefundWithOrder};
pub use user::User;
pub use webhook_event::{RecordOutcome, WebhookEvent};
pub use wishlist::WishlistEntry;
