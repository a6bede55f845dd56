//! Atelier services: the parts of the system that talk to the outside world
//! or span several repositories.
//!
//! # Modules
//!
//! - [`auth`] - Password accounts (argon2id)
//! - [`config`] - Environment configuration shared by every binary
//! - [`payments`] - Payment provider REST client and API objects
//! - [`webhooks`] - Signature verification and idempotent event application
//! - [`orders`] - Checkout, payment confirmation, cancellation and refunds
//! - [`email`] - Transactional email via SMTP
//! - [`revalidate`] - Catalog cache tags and storefront revalidation
//! - [`jobs`] - Scheduled maintenance jobs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod email;
pub mod jobs;
pub mod orders;
pub mod payments;
pub mod revalidate;
pub mod webhooks;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod fixtures;

pub use auth::{AuthError, AuthService};
pub use email::{EmailError, EmailService};
pub use jobs::{Job, JobError, JobReport, JobRunner};
pub use orders::{OrderOpsError, OrderService};
pub use payments::{PaymentClient, PaymentError};
pub use revalidate::{CatalogInvalidation, RevalidationClient};
pub use webhooks::{WebhookError, WebhookProcessor};
