//! In-process catalog cache with tag invalidation.
//!
//! Catalog responses are cached for 5 minutes. Each entry carries the cache
//! tags from [`atelier_services::revalidate::tags`]; `POST /api/revalidate`
//! drops every entry carrying any of the given tags.

use std::time::Duration;

use moka::future::Cache;

use atelier_core::Page;
use atelier_db::models::{Collection, ProductFilter, ProductSummary};
use atelier_services::revalidate::tags;

use crate::routes::catalog::{CollectionView, ProductView};

const CACHE_TTL: Duration = Duration::from_secs(300);
const CACHE_CAPACITY: u64 = 1000;

/// Cache key for catalog responses.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Products {
        filter: ProductFilter,
        page: u32,
        per_page: u32,
    },
    Product(String),
    Collections,
    Collection {
        slug: String,
        page: u32,
        per_page: u32,
    },
}

impl CacheKey {
    /// Tags that invalidate this entry.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        match self {
            Self::Products { filter, .. } => {
                let mut tags = vec![tags::PRODUCTS.to_string()];
                if let Some(slug) = &filter.collection {
                    tags.push(tags::collection(slug));
                }
                tags
            }
            Self::Product(slug) => vec![tags::product(slug)],
            Self::Collections => vec![tags::COLLECTIONS.to_string()],
            // Collection pages embed product summaries, so product changes
            // invalidate them too.
            Self::Collection { slug, .. } => vec![
                tags::COLLECTIONS.to_string(),
                tags::collection(slug),
                tags::PRODUCTS.to_string(),
            ],
        }
    }

    fn matches_any(&self, invalidated: &[String]) -> bool {
        self.tags().iter().any(|tag| invalidated.contains(tag))
    }
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CacheValue {
    Products(Page<ProductSummary>),
    Product(Box<ProductView>),
    Collections(Vec<Collection>),
    Collection(Box<CollectionView>),
}

/// Tag-aware catalog cache.
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<CacheKey, CacheValue>,
}

impl Default for CatalogCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogCache {
    #[must_use]
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .support_invalidation_closures()
            .build();
        Self { cache }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, value: CacheValue) {
        self.cache.insert(key, value).await;
    }

    /// Drop every entry tagged with any of `invalidated`.
    pub fn invalidate_tags(&self, invalidated: &[String]) {
        if invalidated.is_empty() {
            return;
        }
        let invalidated = invalidated.to_vec();
        match self
            .cache
            .invalidate_entries_if(move |key, _| key.matches_any(&invalidated))
        {
            Ok(_) => tracing::debug!("Catalog cache tags invalidated"),
            Err(e) => {
                // Only possible when closures are unsupported; fall back to a full flush.
                tracing::warn!(error = %e, "Tag invalidation unavailable, clearing catalog cache");
                self.cache.invalidate_all();
            }
        }
    }

    /// Entries currently cached. Pending maintenance may lag behind.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn products_key(collection: Option<&str>) -> CacheKey {
        CacheKey::Products {
            filter: ProductFilter {
                collection: collection.map(str::to_string),
                ..ProductFilter::default()
            },
            page: 1,
            per_page: 20,
        }
    }

    #[test]
    fn test_listing_tags() {
        assert_eq!(products_key(None).tags(), vec!["products"]);
        assert_eq!(
            products_key(Some("spring")).tags(),
            vec!["products", "collection:spring"]
        );
        assert_eq!(
            CacheKey::Product("wool-coat".to_string()).tags(),
            vec!["product:wool-coat"]
        );
    }

    #[test]
    fn test_collection_page_follows_product_changes() {
        let key = CacheKey::Collection {
            slug: "spring".to_string(),
            page: 1,
            per_page: 20,
        };
        assert!(key.matches_any(&["products".to_string()]));
        assert!(key.matches_any(&["collection:spring".to_string()]));
        assert!(!key.matches_any(&["collection:autumn".to_string()]));
    }

    #[test]
    fn test_stock_change_reaches_product_pages_and_listings() {
        let stale = tags::stock_changed(&["linen-shirt".to_string()]);
        assert!(CacheKey::Product("linen-shirt".to_string()).matches_any(&stale));
        assert!(products_key(Some("spring")).matches_any(&stale));
        assert!(!CacheKey::Product("wool-coat".to_string()).matches_any(&stale));
        assert!(!CacheKey::Collections.matches_any(&stale));
    }

    #[tokio::test]
    async fn test_local_invalidation_clears_cache() {
        let cache = CatalogCache::new();
        cache
            .insert(
                products_key(None),
                CacheValue::Products(Page::new(
                    Vec::new(),
                    atelier_core::PageParams::default(),
                    0,
                )),
            )
            .await;

        let target = cache.clone();
        let invalidation = atelier_services::CatalogInvalidation::local(move |tags| {
            target.invalidate_tags(tags);
        });
        invalidation
            .invalidate(tags::stock_changed(&["linen-shirt".to_string()]))
            .await;

        assert!(cache.get(&products_key(None)).await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_tags_drops_only_tagged_entries() {
        let cache = CatalogCache::new();
        cache
            .insert(
                CacheKey::Collections,
                CacheValue::Collections(Vec::new()),
            )
            .await;
        cache
            .insert(
                products_key(None),
                CacheValue::Products(Page::new(
                    Vec::new(),
                    atelier_core::PageParams::default(),
                    0,
                )),
            )
            .await;

        cache.invalidate_tags(&["products".to_string()]);

        assert!(cache.get(&products_key(None)).await.is_none());
        assert!(cache.get(&CacheKey::Collections).await.is_some());
    }
}
