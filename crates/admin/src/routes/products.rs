//! Product, SKU and inventory route handlers.
//!
//! Every change asks the storefront to drop the affected cache tags.

use axum::extract::State;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::codes::is_valid_slug;
use atelier_core::{Page, ProductId, SkuId, generate_sku_code, slugify};
use atelier_db::models::{
    NewProduct, NewSku, Product, ProductDetail, ProductFilter, ProductSort, ProductSummary, Sku,
    UpdateProduct, UpdateSku,
};
use atelier_db::{ProductRepository, RepositoryError};
use atelier_services::revalidate::tags;

use super::revalidate_catalog;
use crate::error::{AppError, Result};
use crate::extract::{ApiResult, JsonBody, PathParam, QueryParams, done, page_params, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Query parameters for `GET /api/products`.
///
/// Unlike the storefront, inactive products are listed too.
#[derive(Debug, Default, Deserialize)]
pub struct ProductListQuery {
    pub q: Option<String>,
    pub collection: Option<String>,
    #[serde(default)]
    pub in_stock: bool,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `POST /api/products` body.
#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    /// Generated from the name when omitted.
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

const fn default_active() -> bool {
    true
}

/// `POST /api/products/{id}/skus` body.
#[derive(Debug, Deserialize)]
pub struct CreateSkuRequest {
    /// Generated when omitted.
    pub code: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub material: Option<String>,
    pub price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
}

/// `POST /api/skus/{id}/inventory` body.
#[derive(Debug, Deserialize)]
pub struct AdjustInventoryRequest {
    pub delta: i32,
}

fn validate_price(price: Decimal) -> Result<()> {
    if price.is_sign_negative() {
        return Err(AppError::Validation("Price cannot be negative".to_string()));
    }
    if price.scale() > 2 {
        return Err(AppError::Validation(
            "Price cannot have more than 2 decimal places".to_string(),
        ));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    Ok(name.to_string())
}

/// Use `slug` if given, otherwise derive one from `name`.
///
/// A given slug must already be in canonical form.
pub(crate) fn resolve_slug(slug: Option<&str>, name: &str) -> Result<String> {
    match slug.map(str::trim).filter(|s| !s.is_empty()) {
        Some(slug) => check_slug(slug).map(|()| slug.to_string()),
        None => {
            let slug = slugify(name);
            if slug.is_empty() {
                return Err(AppError::Validation(
                    "Cannot derive a slug from this name".to_string(),
                ));
            }
            Ok(slug)
        }
    }
}

pub(crate) fn check_slug(slug: &str) -> Result<()> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(AppError::Validation(
            "Slug may only contain lowercase letters, digits and hyphens".to_string(),
        ))
    }
}

fn product_tags(slugs: &[&str]) -> Vec<String> {
    let mut stale: Vec<String> = slugs.iter().map(|slug| tags::product(slug)).collect();
    stale.dedup();
    stale.push(tags::PRODUCTS.to_string());
    stale
}

/// Revalidate the product page and listings a SKU appears in.
async fn revalidate_sku(state: &AppState, sku: &Sku) -> Result<()> {
    if let Some(product) = ProductRepository::new(state.pool())
        .get(sku.product_id)
        .await?
    {
        revalidate_catalog(state, product_tags(&[&product.slug]));
    }
    Ok(())
}

fn map_missing_product(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("product".to_string()),
        other => other.into(),
    }
}

fn map_missing_sku(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("SKU".to_string()),
        other => other.into(),
    }
}

/// `GET /api/products`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_products(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<ProductListQuery>,
) -> ApiResult<Page<ProductSummary>> {
    let filter = ProductFilter {
        collection: query.collection.filter(|c| !c.trim().is_empty()),
        q: query.q.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
        min_price: None,
        max_price: None,
        in_stock: query.in_stock,
        include_inactive: true,
        sort: query.sort,
    };
    let params = page_params(query.page, query.per_page);
    let (items, total) = ProductRepository::new(state.pool())
        .list(&filter, params)
        .await?;
    success("Products", Page::new(items, params, total))
}

/// `POST /api/products`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(body): JsonBody<CreateProductRequest>,
) -> ApiResult<Product> {
    let name = validate_name(&body.name)?;
    validate_price(body.price)?;
    let slug = resolve_slug(body.slug.as_deref(), &name)?;

    let product = ProductRepository::new(state.pool())
        .create(&NewProduct {
            name,
            slug,
            description: body.description,
            price: body.price,
            is_active: body.is_active,
        })
        .await?;
    tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");

    revalidate_catalog(&state, product_tags(&[&product.slug]));
    success("Product created", product)
}

/// `GET /api/products/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn get_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<ProductId>,
) -> ApiResult<ProductDetail> {
    let detail = ProductRepository::new(state.pool())
        .get_detail(id)
        .await?
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;
    success("Product", detail)
}

/// `PATCH /api/products/{id}`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<ProductId>,
    JsonBody(mut body): JsonBody<UpdateProduct>,
) -> ApiResult<Product> {
    if let Some(name) = &body.name {
        body.name = Some(validate_name(name)?);
    }
    if let Some(price) = body.price {
        validate_price(price)?;
    }
    if let Some(slug) = &body.slug {
        check_slug(slug)?;
    }

    let repo = ProductRepository::new(state.pool());
    let before = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;
    let product = repo.update(id, &body).await.map_err(map_missing_product)?;

    revalidate_catalog(&state, product_tags(&[&before.slug, &product.slug]));
    success("Product updated", product)
}

/// `DELETE /api/products/{id}`
///
/// SKUs go with the product; past order lines keep their snapshot.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<ProductId>,
) -> ApiResult<()> {
    let product = ProductRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(map_missing_product)?;
    tracing::info!(product_id = %product.id, "Product deleted");

    let mut stale = product_tags(&[&product.slug]);
    stale.push(tags::COLLECTIONS.to_string());
    revalidate_catalog(&state, stale);
    done("Product deleted")
}

/// `POST /api/products/{id}/skus`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn create_sku(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<ProductId>,
    JsonBody(body): JsonBody<CreateSkuRequest>,
) -> ApiResult<Sku> {
    if let Some(price) = body.price {
        validate_price(price)?;
    }
    if body.stock < 0 {
        return Err(AppError::Validation("Stock cannot be negative".to_string()));
    }
    let code = body
        .code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(generate_sku_code);

    let repo = ProductRepository::new(state.pool());
    let product = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("product".to_string()))?;
    let sku = repo
        .create_sku(
            id,
            &NewSku {
                code,
                color: body.color,
                size: body.size,
                material: body.material,
                price: body.price,
                stock: body.stock,
            },
        )
        .await
        .map_err(map_missing_product)?;
    tracing::info!(sku_id = %sku.id, code = %sku.code, "SKU created");

    revalidate_catalog(&state, product_tags(&[&product.slug]));
    success("SKU created", sku)
}

/// `PATCH /api/skus/{id}`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_sku(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<SkuId>,
    JsonBody(body): JsonBody<UpdateSku>,
) -> ApiResult<Sku> {
    if let Some(price) = body.price {
        validate_price(price)?;
    }
    if body.code.as_deref().is_some_and(|c| c.trim().is_empty()) {
        return Err(AppError::Validation("SKU code cannot be empty".to_string()));
    }

    let sku = ProductRepository::new(state.pool())
        .update_sku(id, &body)
        .await
        .map_err(map_missing_sku)?;

    revalidate_sku(&state, &sku).await?;
    success("SKU updated", sku)
}

/// `DELETE /api/skus/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_sku(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<SkuId>,
) -> ApiResult<()> {
    let sku = ProductRepository::new(state.pool())
        .delete_sku(id)
        .await
        .map_err(map_missing_sku)?;

    revalidate_sku(&state, &sku).await?;
    done("SKU deleted")
}

/// `POST /api/skus/{id}/inventory`
///
/// Applies a relative change. Stock never goes below zero.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn adjust_inventory(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<SkuId>,
    JsonBody(body): JsonBody<AdjustInventoryRequest>,
) -> ApiResult<Sku> {
    if body.delta == 0 {
        return Err(AppError::Validation("Delta cannot be zero".to_string()));
    }

    let sku = ProductRepository::new(state.pool())
        .adjust_stock(id, body.delta)
        .await
        .map_err(map_missing_sku)?;
    tracing::info!(sku_id = %sku.id, delta = body.delta, stock = sku.stock, "Inventory adjusted");

    revalidate_sku(&state, &sku).await?;
    success("Inventory adjusted", sku)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_generated_from_name() {
        assert_eq!(resolve_slug(None, "Linen Shirt").unwrap(), "linen-shirt");
        assert_eq!(resolve_slug(Some("  "), "Linen Shirt").unwrap(), "linen-shirt");
    }

    #[test]
    fn test_explicit_slug_must_be_canonical() {
        assert_eq!(resolve_slug(Some("shirt-2"), "x").unwrap(), "shirt-2");
        assert!(matches!(
            resolve_slug(Some("Linen Shirt"), "x"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_unsluggable_name_rejected() {
        assert!(matches!(resolve_slug(None, "!!!"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_price_validation() {
        assert!(validate_price(Decimal::new(4999, 2)).is_ok());
        assert!(validate_price(Decimal::ZERO).is_ok());
        assert!(validate_price(Decimal::new(-1, 0)).is_err());
        assert!(validate_price(Decimal::new(1_001, 3)).is_err());
    }

    #[test]
    fn test_product_tags_dedupe_unchanged_slug() {
        assert_eq!(
            product_tags(&["coat", "coat"]),
            vec!["product:coat".to_string(), "products".to_string()]
        );
        assert_eq!(product_tags(&["coat", "wool-coat"]).len(), 3);
    }

    #[test]
    fn test_create_request_defaults() {
        let body: CreateProductRequest =
            serde_json::from_str(r#"{"name": "Coat", "price": "120.00"}"#).unwrap();
        assert!(body.is_active);
        assert!(body.slug.is_none());
        assert!(body.description.is_empty());
    }
}
