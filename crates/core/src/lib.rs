//! Atelier Core - Shared domain types library.
//!
//! This crate provides common types used across all Atelier components:
//! - `storefront` - Public-facing JSON API (catalog, cart, checkout, accounts)
//! - `admin` - Back-office API (orders, refunds, catalog management, cron jobs)
//! - `services` - Payment, email and order lifecycle operations
//! - `cli` - Command-line tools for migrations and management
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and easy to test.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, money and statuses
//! - [`pricing`] - VAT arithmetic, discounts and order totals
//! - [`codes`] - SKU codes, slugs and order numbers
//! - [`pagination`] - Page/offset math shared by every list endpoint
//! - [`result`] - The tagged result returned by every mutation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod codes;
pub mod pagination;
pub mod pricing;
pub mod result;
pub mod types;

pub use codes::{generate_order_number, generate_sku_code, slugify};
pub use pagination::{Page, PageParams};
pub use result::{ActionResult, ActionStatus};
pub use types::*;
