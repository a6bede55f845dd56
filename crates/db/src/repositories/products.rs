//! Product and SKU repository.
//!
//! Stock only ever changes through guarded updates
//! (`WHERE stock + $delta >= 0`), backed by the `CHECK (stock >= 0)` constraint.

use sqlx::{PgPool, Postgres, QueryBuilder};

use atelier_core::{PageParams, ProductId, SkuId};

use crate::RepositoryError;
use crate::models::{
    NewProduct, NewSku, Product, ProductDetail, ProductFilter, ProductSummary, Sku, UpdateProduct,
    UpdateSku,
};

const PRODUCT_COLUMNS: &str =
    "p.id, p.name, p.slug, p.description, p.price, p.is_active, p.created_at, p.updated_at";

const SKU_COLUMNS: &str =
    "id, product_id, code, color, size, material, price, stock, created_at, updated_at";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if !filter.include_inactive {
        qb.push(" AND p.is_active");
    }
    if let Some(slug) = &filter.collection {
        qb.push(
            " AND EXISTS (SELECT 1 FROM collection_products cp \
             JOIN collections c ON c.id = cp.collection_id \
             WHERE cp.product_id = p.id AND c.slug = ",
        )
        .push_bind(slug.clone())
        .push(")");
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{q}%");
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND p.price <= ").push_bind(max);
    }
    if filter.in_stock {
        qb.push(" AND EXISTS (SELECT 1 FROM product_skus s WHERE s.product_id = p.id AND s.stock > 0)");
    }
}

/// Repository for products and their SKUs.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// List products matching `filter`, with aggregate stock.
    ///
    /// Returns the page of products and the total matching count.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        page: PageParams,
    ) -> Result<(Vec<ProductSummary>, i64), RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p WHERE TRUE");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT p.id, p.name, p.slug, p.price, \
             COALESCE((SELECT SUM(s.stock) FROM product_skus s WHERE s.product_id = p.id), 0)::BIGINT \
             AS total_stock \
             FROM products p WHERE TRUE",
        );
        push_filters(&mut select, filter);
        select
            .push(filter.sort.order_by())
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());
        let products = select
            .build_query_as::<ProductSummary>()
            .fetch_all(self.pool)
            .await?;

        Ok((products, total))
    }

    /// Get a product by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(product)
    }

    /// Get an active product and its SKUs by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.slug = $1 AND p.is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;

        match product {
            Some(product) => {
                let skus = self.skus_for(product.id).await?;
                Ok(Some(ProductDetail { product, skus }))
            }
            None => Ok(None),
        }
    }

    /// Get a product and its SKUs by id, regardless of status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_detail(&self, id: ProductId) -> Result<Option<ProductDetail>, RepositoryError> {
        match self.get(id).await? {
            Some(product) => {
                let skus = self.skus_for(product.id).await?;
                Ok(Some(ProductDetail { product, skus }))
            }
            None => Ok(None),
        }
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &NewProduct) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            INSERT INTO products AS p (name, slug, description, price, is_active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(&input.name)
        .bind(&input.slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))
    }

    /// Apply a partial update to a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &UpdateProduct,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            r"
            UPDATE products AS p SET
                name = COALESCE($2, p.name),
                slug = COALESCE($3, p.slug),
                description = COALESCE($4, p.description),
                price = COALESCE($5, p.price),
                is_active = COALESCE($6, p.is_active),
                updated_at = now()
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(input.name.as_deref())
        .bind(input.slug.as_deref())
        .bind(input.description.as_deref())
        .bind(input.price)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a product and its SKUs. Order items keep their snapshot.
    ///
    /// Returns the deleted product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn delete(&self, id: ProductId) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, Product>(&format!(
            "DELETE FROM products AS p WHERE p.id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    // =========================================================================
    // SKUs
    // =========================================================================

    /// SKUs of a product, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn skus_for(&self, product_id: ProductId) -> Result<Vec<Sku>, RepositoryError> {
        let skus = sqlx::query_as::<_, Sku>(&format!(
            "SELECT {SKU_COLUMNS} FROM product_skus WHERE product_id = $1 ORDER BY id"
        ))
        .bind(product_id)
        .fetch_all(self.pool)
        .await?;

        Ok(skus)
    }

    /// Get a SKU by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_sku(&self, id: SkuId) -> Result<Option<Sku>, RepositoryError> {
        let sku = sqlx::query_as::<_, Sku>(&format!(
            "SELECT {SKU_COLUMNS} FROM product_skus WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(sku)
    }

    /// Create a SKU for a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    /// Returns `RepositoryError::NotFound` if the product doesn't exist.
    pub async fn create_sku(
        &self,
        product_id: ProductId,
        input: &NewSku,
    ) -> Result<Sku, RepositoryError> {
        sqlx::query_as::<_, Sku>(&format!(
            r"
            INSERT INTO product_skus (product_id, code, color, size, material, price, stock)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {SKU_COLUMNS}
            "
        ))
        .bind(product_id)
        .bind(&input.code)
        .bind(input.color.as_deref())
        .bind(input.size.as_deref())
        .bind(input.material.as_deref())
        .bind(input.price)
        .bind(input.stock)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_foreign_key_violation()
            {
                return RepositoryError::NotFound;
            }
            RepositoryError::from_unique(e, "SKU code already exists")
        })
    }

    /// Apply a partial update to a SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the SKU doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new code is taken.
    pub async fn update_sku(&self, id: SkuId, input: &UpdateSku) -> Result<Sku, RepositoryError> {
        sqlx::query_as::<_, Sku>(&format!(
            r"
            UPDATE product_skus SET
                code = COALESCE($2, code),
                color = COALESCE($3, color),
                size = COALESCE($4, size),
                material = COALESCE($5, material),
                price = COALESCE($6, price),
                updated_at = now()
            WHERE id = $1
            RETURNING {SKU_COLUMNS}
            "
        ))
        .bind(id)
        .bind(input.code.as_deref())
        .bind(input.color.as_deref())
        .bind(input.size.as_deref())
        .bind(input.material.as_deref())
        .bind(input.price)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "SKU code already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a SKU.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the SKU doesn't exist.
    pub async fn delete_sku(&self, id: SkuId) -> Result<Sku, RepositoryError> {
        sqlx::query_as::<_, Sku>(&format!(
            "DELETE FROM product_skus WHERE id = $1 RETURNING {SKU_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Add `delta` (possibly negative) to a SKU's stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the result would be negative.
    /// Returns `RepositoryError::NotFound` if the SKU doesn't exist.
    pub async fn adjust_stock(&self, id: SkuId, delta: i32) -> Result<Sku, RepositoryError> {
        let updated = sqlx::query_as::<_, Sku>(&format!(
            r"
            UPDATE product_skus SET stock = stock + $2, updated_at = now()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING {SKU_COLUMNS}
            "
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?;

        match updated {
            Some(sku) => Ok(sku),
            None if self.get_sku(id).await?.is_some() => Err(RepositoryError::Conflict(
                "stock cannot go below zero".to_owned(),
            )),
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Number of SKUs at or below `threshold` units.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count_low_stock(&self, threshold: i32) -> Result<i64, RepositoryError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM product_skus WHERE stock <= $1")
                .bind(threshold)
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }
}
