//! Catalog cache tags and the client that asks the storefront to drop them.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::RevalidationConfig;

/// Cache tag names shared by the storefront cache and the admin.
pub mod tags {
    /// Every product listing.
    pub const PRODUCTS: &str = "products";
    /// Every collection listing.
    pub const COLLECTIONS: &str = "collections";

    /// A single product page.
    #[must_use]
    pub fn product(slug: &str) -> String {
        format!("product:{slug}")
    }

    /// A single collection page.
    #[must_use]
    pub fn collection(slug: &str) -> String {
        format!("collection:{slug}")
    }

    /// Tags to drop when the stock of these products changed. Listings are
    /// included since they filter on availability.
    #[must_use]
    pub fn stock_changed(slugs: &[String]) -> Vec<String> {
        let mut tags = vec![PRODUCTS.to_string()];
        tags.extend(slugs.iter().map(|slug| product(slug)));
        tags
    }
}

/// Body of `POST /api/revalidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevalidateRequest {
    pub tags: Vec<String>,
}

#[derive(Debug, Error)]
pub enum RevalidateError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storefront returned {0}")]
    Status(u16),

    #[error("invalid storefront URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Client for the storefront's revalidation endpoint.
///
/// Without configuration every call is a no-op.
#[derive(Clone)]
pub struct RevalidationClient {
    inner: Option<Inner>,
}

#[derive(Clone)]
struct Inner {
    client: reqwest::Client,
    endpoint: Url,
    config: RevalidationConfig,
}

impl RevalidationClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: Option<RevalidationConfig>) -> Result<Self, RevalidateError> {
        let Some(config) = config else {
            return Ok(Self { inner: None });
        };

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;
        let endpoint = config.storefront_url.join("/api/revalidate")?;

        Ok(Self {
            inner: Some(Inner {
                client,
                endpoint,
                config,
            }),
        })
    }

    /// Invalidate `tags` on the storefront.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the storefront rejects it.
    pub async fn revalidate(&self, tags: Vec<String>) -> Result<(), RevalidateError> {
        let Some(inner) = &self.inner else {
            tracing::debug!(?tags, "Revalidation disabled, skipping");
            return Ok(());
        };

        let response = inner
            .client
            .post(inner.endpoint.clone())
            .bearer_auth(inner.config.secret.expose_secret())
            .json(&RevalidateRequest { tags })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RevalidateError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    /// Invalidate `tags`, logging instead of failing.
    pub async fn revalidate_best_effort(&self, tags: Vec<String>) {
        if let Err(e) = self.revalidate(tags).await {
            tracing::warn!(error = %e, "Storefront revalidation failed");
        }
    }
}

/// Where catalog tags go when an order changes stock.
///
/// The storefront drops them from its own cache; the admin and the CLI ask
/// the storefront over HTTP.
#[derive(Clone, Default)]
pub enum CatalogInvalidation {
    #[default]
    Disabled,
    Local(Arc<dyn Fn(&[String]) + Send + Sync>),
    Remote(RevalidationClient),
}

impl CatalogInvalidation {
    /// Invalidate through an in-process callback.
    pub fn local(invalidate: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        Self::Local(Arc::new(invalidate))
    }

    /// Drop `tags`. Never fails; remote errors are logged.
    pub async fn invalidate(&self, tags: Vec<String>) {
        match self {
            Self::Disabled => {}
            Self::Local(invalidate) => invalidate(&tags),
            Self::Remote(client) => client.revalidate_best_effort(tags).await,
        }
    }
}

impl std::fmt::Debug for CatalogInvalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Disabled => "Disabled",
            Self::Local(_) => "Local",
            Self::Remote(_) => "Remote",
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    #[test]
    fn test_tag_names() {
        assert_eq!(tags::product("wool-coat"), "product:wool-coat");
        assert_eq!(tags::collection("spring"), "collection:spring");
    }

    #[test]
    fn test_endpoint_ignores_base_path() {
        let client = RevalidationClient::new(Some(RevalidationConfig {
            storefront_url: Url::parse("https://shop.test/some/path").unwrap(),
            secret: SecretString::from("rv_Kq81nZd0aLp3xY"),
        }))
        .unwrap();

        let endpoint = client.inner.map(|i| i.endpoint.to_string());
        assert_eq!(endpoint.as_deref(), Some("https://shop.test/api/revalidate"));
    }

    #[test]
    fn test_stock_changed_tags() {
        let tags = tags::stock_changed(&["linen-shirt".to_string(), "wool-coat".to_string()]);
        assert_eq!(
            tags,
            vec!["products", "product:linen-shirt", "product:wool-coat"]
        );
    }

    #[tokio::test]
    async fn test_local_invalidation_receives_tags() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let invalidation = CatalogInvalidation::local(move |tags| {
            sink.lock().unwrap().extend_from_slice(tags);
        });

        invalidation
            .invalidate(tags::stock_changed(&["scarf".to_string()]))
            .await;

        assert_eq!(*seen.lock().unwrap(), vec!["products", "product:scarf"]);
    }

    #[tokio::test]
    async fn test_disabled_client_is_noop() {
        let client = RevalidationClient::new(None).unwrap();
        client.revalidate(vec![tags::PRODUCTS.to_string()]).await.unwrap();
    }
}
