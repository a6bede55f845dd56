//! Collection route handlers.

use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use atelier_core::{CollectionId, Page, ProductId};
use atelier_db::models::{Collection, NewCollection, ProductSummary, UpdateCollection};
use atelier_db::{CollectionRepository, RepositoryError};
use atelier_services::revalidate::tags;

use super::products::{check_slug, resolve_slug};
use super::revalidate_catalog;
use crate::error::AppError;
use crate::extract::{ApiResult, JsonBody, PageQuery, PathParam, QueryParams, done, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// `POST /api/collections` body.
#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// `POST /api/collections/{id}/products` body.
#[derive(Debug, Deserialize)]
pub struct AddProductRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub position: i32,
}

/// A collection with one page of its products, including inactive ones.
#[derive(Debug, Serialize)]
pub struct CollectionDetail {
    #[serde(flatten)]
    pub collection: Collection,
    pub products: Page<ProductSummary>,
}

fn collection_tags(slugs: &[&str]) -> Vec<String> {
    let mut stale = vec![tags::COLLECTIONS.to_string()];
    for slug in slugs {
        let tag = tags::collection(slug);
        if !stale.contains(&tag) {
            stale.push(tag);
        }
    }
    stale
}

fn map_missing(err: RepositoryError, what: &str) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound(what.to_string()),
        other => other.into(),
    }
}

/// `GET /api/collections`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_collections(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> ApiResult<Vec<Collection>> {
    let collections = CollectionRepository::new(state.pool()).list().await?;
    success("Collections", collections)
}

/// `POST /api/collections`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn create_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(body): JsonBody<CreateCollectionRequest>,
) -> ApiResult<Collection> {
    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    let slug = resolve_slug(body.slug.as_deref(), &name)?;

    let collection = CollectionRepository::new(state.pool())
        .create(&NewCollection {
            name,
            slug,
            description: body.description,
        })
        .await?;
    tracing::info!(collection_id = %collection.id, "Collection created");

    revalidate_catalog(&state, collection_tags(&[&collection.slug]));
    success("Collection created", collection)
}

/// `GET /api/collections/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn get_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<CollectionId>,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<CollectionDetail> {
    let repo = CollectionRepository::new(state.pool());
    let collection = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("collection".to_string()))?;
    let params = query.params();
    let (items, total) = repo.products(id, params).await?;

    success(
        "Collection",
        CollectionDetail {
            collection,
            products: Page::new(items, params, total),
        },
    )
}

/// `PATCH /api/collections/{id}`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<CollectionId>,
    JsonBody(body): JsonBody<UpdateCollection>,
) -> ApiResult<Collection> {
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }
    if let Some(slug) = &body.slug {
        check_slug(slug)?;
    }

    let repo = CollectionRepository::new(state.pool());
    let before = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("collection".to_string()))?;
    let collection = repo
        .update(id, &body)
        .await
        .map_err(|e| map_missing(e, "collection"))?;

    revalidate_catalog(&state, collection_tags(&[&before.slug, &collection.slug]));
    success("Collection updated", collection)
}

/// `DELETE /api/collections/{id}`
///
/// Products in the collection are kept.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_collection(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<CollectionId>,
) -> ApiResult<()> {
    let collection = CollectionRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(|e| map_missing(e, "collection"))?;
    tracing::info!(collection_id = %collection.id, "Collection deleted");

    let mut stale = collection_tags(&[&collection.slug]);
    stale.push(tags::PRODUCTS.to_string());
    revalidate_catalog(&state, stale);
    done("Collection deleted")
}

/// `POST /api/collections/{id}/products`
///
/// Adding a product that is already there moves it to `position`.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn add_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<CollectionId>,
    JsonBody(body): JsonBody<AddProductRequest>,
) -> ApiResult<()> {
    if body.position < 0 {
        return Err(AppError::Validation("Position cannot be negative".to_string()));
    }

    let repo = CollectionRepository::new(state.pool());
    let collection = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("collection".to_string()))?;
    repo.add_product(id, body.product_id, body.position)
        .await
        .map_err(|e| map_missing(e, "product"))?;

    let mut stale = collection_tags(&[&collection.slug]);
    stale.push(tags::PRODUCTS.to_string());
    revalidate_catalog(&state, stale);
    done("Product added to collection")
}

/// `DELETE /api/collections/{id}/products/{product_id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn remove_product(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam((id, product_id)): PathParam<(CollectionId, ProductId)>,
) -> ApiResult<()> {
    let repo = CollectionRepository::new(state.pool());
    let collection = repo
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("collection".to_string()))?;
    repo.remove_product(id, product_id)
        .await
        .map_err(|e| map_missing(e, "collection product"))?;

    let mut stale = collection_tags(&[&collection.slug]);
    stale.push(tags::PRODUCTS.to_string());
    revalidate_catalog(&state, stale);
    done("Product removed from collection")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_tags() {
        assert_eq!(
            collection_tags(&["summer", "summer"]),
            vec!["collections".to_string(), "collection:summer".to_string()]
        );
        assert_eq!(collection_tags(&["summer", "summer-26"]).len(), 3);
    }

    #[test]
    fn test_missing_product_is_not_found() {
        assert!(matches!(
            map_missing(RepositoryError::NotFound, "product"),
            AppError::NotFound(what) if what == "product"
        ));
    }
}
