//! Collection repository.

use sqlx::PgPool;

use atelier_core::{CollectionId, PageParams, ProductId};

use crate::RepositoryError;
use crate::models::{Collection, NewCollection, ProductSummary, UpdateCollection};

const COLLECTION_COLUMNS: &str = "id, name, slug, description, created_at, updated_at";

/// Repository for collections and their product membership.
pub struct CollectionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CollectionRepository<'a> {
    /// Create a new collection repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All collections, by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Collection>, RepositoryError> {
        let collections = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections ORDER BY name, id"
        ))
        .fetch_all(self.pool)
        .await?;

        Ok(collections)
    }

    /// Get a collection by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CollectionId) -> Result<Option<Collection>, RepositoryError> {
        let collection = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(collection)
    }

    /// Get a collection by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Collection>, RepositoryError> {
        let collection = sqlx::query_as::<_, Collection>(&format!(
            "SELECT {COLLECTION_COLUMNS} FROM collections WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        Ok(collection)
    }

    /// Active products in a collection, in curated order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn products(
        &self,
        id: CollectionId,
        page: PageParams,
    ) -> Result<(Vec<ProductSummary>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            r"
            SELECT COUNT(*) FROM collection_products cp
            JOIN products p ON p.id = cp.product_id
            WHERE cp.collection_id = $1 AND p.is_active
            ",
        )
        .bind(id)
        .fetch_one(self.pool)
        .await?;

        let products = sqlx::query_as::<_, ProductSummary>(
            r"
            SELECT p.id, p.name, p.slug, p.price,
                   COALESCE((SELECT SUM(s.stock) FROM product_skus s WHERE s.product_id = p.id), 0)::BIGINT
                   AS total_stock
            FROM collection_products cp
            JOIN products p ON p.id = cp.product_id
            WHERE cp.collection_id = $1 AND p.is_active
            ORDER BY cp.position, p.id
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((products, total))
    }

    /// Create a collection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &NewCollection) -> Result<Collection, RepositoryError> {
        sqlx::query_as::<_, Collection>(&format!(
            r"
            INSERT INTO collections (name, slug, description)
            VALUES ($1, $2, $3)
            RETURNING {COLLECTION_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the collection doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: CollectionId,
        input: &UpdateCollection,
    ) -> Result<Collection, RepositoryError> {
        sqlx::query_as::<_, Collection>(&format!(
            r"
            UPDATE collections SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                updated_at = now()
            WHERE id = $1
            RETURNING {COLLECTION_COLUMNS}
            "
        ))
        .bind(id)
        .bind(input.name.as_deref())
        .bind(input.slug.as_deref())
        .bind(input.description.as_deref())
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a collection. Products are untouched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the collection doesn't exist.
    pub async fn delete(&self, id: CollectionId) -> Result<Collection, RepositoryError> {
        sqlx::query_as::<_, Collection>(&format!(
            "DELETE FROM collections WHERE id = $1 RETURNING {COLLECTION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Add a product to a collection, or move it to `position`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if either side doesn't exist.
    pub async fn add_product(
        &self,
        id: CollectionId,
        product_id: ProductId,
        position: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO collection_products (collection_id, product_id, position)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection_id, product_id) DO UPDATE SET position = EXCLUDED.position
            ",
        )
        .bind(id)
        .bind(product_id)
        .bind(position)
        .execute(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::Database(e)
        })?;

        Ok(())
    }

    /// Remove a product from a collection.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product wasn't in the collection.
    pub async fn remove_product(
        &self,
        id: CollectionId,
        product_id: ProductId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM collection_products WHERE collection_id = $1 AND product_id = $2",
        )
        .bind(id)
        .bind(product_id)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
