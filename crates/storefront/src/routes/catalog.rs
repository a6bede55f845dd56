//! Catalog route handlers.
//!
//! Responses are served from the [`CatalogCache`](crate::cache::CatalogCache)
//! when possible. Only active products are visible.

use axum::extract::{Path, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::pagination::DEFAULT_PER_PAGE;
use atelier_core::pricing::calculate_price_excl_tax;
use atelier_core::{Page, PageParams, ProductId, SkuId};
use atelier_db::models::{
    Collection, Product, ProductDetail, ProductFilter, ProductSort, ProductSummary, Sku,
};
use atelier_db::{CollectionRepository, ProductRepository};

use crate::cache::{CacheKey, CacheValue};
use crate::error::AppError;
use crate::extract::{ApiResult, QueryParams, success};
use crate::state::AppState;

/// Longest accepted search query.
const MAX_QUERY_LEN: usize = 100;

/// Query parameters for `GET /api/products`.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub collection: Option<String>,
    pub q: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductListQuery {
    /// Normalise into a repository filter, rejecting impossible ranges.
    fn into_filter(self) -> Result<(ProductFilter, PageParams), AppError> {
        for price in [self.min_price, self.max_price].into_iter().flatten() {
            if price.is_sign_negative() {
                return Err(AppError::Validation("Prices cannot be negative".to_string()));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price)
            && min > max
        {
            return Err(AppError::Validation(
                "min_price cannot exceed max_price".to_string(),
            ));
        }

        let q = non_empty(self.q);
        if q.as_ref().is_some_and(|q| q.chars().count() > MAX_QUERY_LEN) {
            return Err(AppError::Validation(format!(
                "Search query must be at most {MAX_QUERY_LEN} characters"
            )));
        }

        let filter = ProductFilter {
            collection: non_empty(self.collection),
            q,
            min_price: self.min_price,
            max_price: self.max_price,
            in_stock: self.in_stock,
            include_inactive: false,
            sort: self.sort,
        };
        Ok((filter, page_params(self.page, self.per_page)))
    }
}

/// Query parameters for paginated collection pages.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn page_params(page: Option<u32>, per_page: Option<u32>) -> PageParams {
    PageParams::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A SKU as shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkuView {
    pub id: SkuId,
    pub code: String,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    /// VAT-inclusive unit price.
    pub price: Decimal,
    pub price_excl_tax: Decimal,
    pub stock: i32,
    pub in_stock: bool,
}

/// Product detail as shown to shoppers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub price: Decimal,
    pub price_excl_tax: Decimal,
    pub in_stock: bool,
    pub skus: Vec<SkuView>,
}

impl SkuView {
    fn new(sku: Sku, product: &Product) -> Self {
        let price = sku.effective_price(product);
        Self {
            id: sku.id,
            code: sku.code,
            color: sku.color,
            size: sku.size,
            material: sku.material,
            price,
            price_excl_tax: calculate_price_excl_tax(price),
            stock: sku.stock,
            in_stock: sku.stock > 0,
        }
    }
}

impl From<ProductDetail> for ProductView {
    fn from(detail: ProductDetail) -> Self {
        let ProductDetail { product, skus } = detail;
        let skus: Vec<SkuView> = skus
            .into_iter()
            .map(|sku| SkuView::new(sku, &product))
            .collect();

        Self {
            id: product.id,
            in_stock: skus.iter().any(|s| s.in_stock),
            price_excl_tax: calculate_price_excl_tax(product.price),
            price: product.price,
            name: product.name,
            slug: product.slug,
            description: product.description,
            skus,
        }
    }
}

/// A collection with one page of its products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionView {
    #[serde(flatten)]
    pub collection: Collection,
    pub products: Page<ProductSummary>,
}

/// `GET /api/products`
#[instrument(skip(state))]
pub async fn list_products(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ProductListQuery>,
) -> ApiResult<Page<ProductSummary>> {
    let (filter, params) = query.into_filter()?;
    let key = CacheKey::Products {
        filter: filter.clone(),
        page: params.page(),
        per_page: params.per_page(),
    };

    if let Some(CacheValue::Products(page)) = state.catalog().get(&key).await {
        return success("Products", page);
    }

    let (items, total) = ProductRepository::new(state.pool())
        .list(&filter, params)
        .await?;
    let page = Page::new(items, params, total);
    state
        .catalog()
        .insert(key, CacheValue::Products(page.clone()))
        .await;

    success("Products", page)
}

/// `GET /api/products/{slug}`
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<ProductView> {
    let key = CacheKey::Product(slug.clone());
    if let Some(CacheValue::Product(view)) = state.catalog().get(&key).await {
        return success("Product", *view);
    }

    let detail = ProductRepository::new(state.pool())
        .get_active_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;
    let view = ProductView::from(detail);
    state
        .catalog()
        .insert(key, CacheValue::Product(Box::new(view.clone())))
        .await;

    success("Product", view)
}

/// `GET /api/collections`
#[instrument(skip(state))]
pub async fn list_collections(State(state): State<AppState>) -> ApiResult<Vec<Collection>> {
    if let Some(CacheValue::Collections(collections)) =
        state.catalog().get(&CacheKey::Collections).await
    {
        return success("Collections", collections);
    }

    let collections = CollectionRepository::new(state.pool()).list().await?;
    state
        .catalog()
        .insert(
            CacheKey::Collections,
            CacheValue::Collections(collections.clone()),
        )
        .await;

    success("Collections", collections)
}

/// `GET /api/collections/{slug}`
#[instrument(skip(state))]
pub async fn get_collection(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<CollectionView> {
    let params = page_params(query.page, query.per_page);
    let key = CacheKey::Collection {
        slug: slug.clone(),
        page: params.page(),
        per_page: params.per_page(),
    };
    if let Some(CacheValue::Collection(view)) = state.catalog().get(&key).await {
        return success("Collection", *view);
    }

    let repo = CollectionRepository::new(state.pool());
    let collection = repo
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| AppError::NotFound("collection".to_string()))?;
    let (items, total) = repo.products(collection.id, params).await?;
    let view = CollectionView {
        collection,
        products: Page::new(items, params, total),
    };
    state
        .catalog()
        .insert(key, CacheValue::Collection(Box::new(view.clone())))
        .await;

    success("Collection", view)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    #[test]
    fn test_query_normalisation() {
        let query = ProductListQuery {
            collection: Some("  ".to_string()),
            q: Some(" linen ".to_string()),
            page: Some(0),
            per_page: Some(500),
            ..ProductListQuery::default()
        };
        let (filter, params) = query.into_filter().unwrap();
        assert_eq!(filter.collection, None);
        assert_eq!(filter.q.as_deref(), Some("linen"));
        assert!(!filter.include_inactive);
        assert_eq!(params.page(), 1);
        assert_eq!(params.per_page(), atelier_core::pagination::MAX_PER_PAGE);
    }

    #[test]
    fn test_inverted_price_range_rejected() {
        let query = ProductListQuery {
            min_price: Some(dec(50)),
            max_price: Some(dec(10)),
            ..ProductListQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_negative_price_rejected() {
        let query = ProductListQuery {
            min_price: Some(dec(-1)),
            ..ProductListQuery::default()
        };
        assert!(matches!(query.into_filter(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_product_view_prices() {
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(1),
            name: "Wool Coat".to_string(),
            slug: "wool-coat".to_string(),
            description: String::new(),
            price: dec(120),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let sku = |id, price, stock| Sku {
            id: SkuId::new(id),
            product_id: product.id,
            code: format!("SKU-{id}"),
            color: None,
            size: None,
            material: None,
            price,
            stock,
            created_at: now,
            updated_at: now,
        };

        let view = ProductView::from(ProductDetail {
            product: product.clone(),
            skus: vec![sku(1, None, 0), sku(2, Some(dec(144)), 3)],
        });

        assert_eq!(view.price_excl_tax, dec(100));
        assert!(view.in_stock);
        assert_eq!(view.skus[0].price, dec(120));
        assert!(!view.skus[0].in_stock);
        assert_eq!(view.skus[1].price_excl_tax, dec(120));
    }
}
