//! Cart repository.
//!
//! Carts are keyed by a UUID. Guest carts have no `user_id`; a signed-in
//! user owns at most one cart.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use atelier_core::{SkuId, UserId};

use crate::RepositoryError;
use crate::models::{CartLine, CartSummary};

/// Repository for carts and cart items.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert the cart row if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn ensure(&self, id: Uuid, user_id: Option<UserId>) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO carts (id, user_id) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET updated_at = now()
            ",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// The cart owned by `user_id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_for_user(&self, user_id: UserId) -> Result<Option<Uuid>, RepositoryError> {
        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(id)
    }

    /// Lines of a cart joined with current SKU and product data.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, cart_id: Uuid) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(
            r"
            SELECT s.id AS sku_id, s.code AS sku_code, p.id AS product_id,
                   p.name AS product_name, p.slug AS product_slug,
                   s.color, s.size, s.material,
                   COALESCE(s.price, p.price) AS unit_price,
                   ci.quantity, s.stock, p.is_active
            FROM cart_items ci
            JOIN product_skus s ON s.id = ci.sku_id
            JOIN products p ON p.id = s.product_id
            WHERE ci.cart_id = $1
            ORDER BY ci.added_at, s.id
            ",
        )
        .bind(cart_id)
        .fetch_all(self.pool)
        .await?;

        Ok(lines)
    }

    /// Cart with lines and subtotal. Missing carts are empty.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, cart_id: Uuid) -> Result<CartSummary, RepositoryError> {
        Ok(CartSummary::new(cart_id, self.lines(cart_id).await?))
    }

    /// Current quantity of a SKU in the cart (0 if absent).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn quantity_of(&self, cart_id: Uuid, sku_id: SkuId) -> Result<i32, RepositoryError> {
        let quantity = sqlx::query_scalar::<_, i32>(
            "SELECT quantity FROM cart_items WHERE cart_id = $1 AND sku_id = $2",
        )
        .bind(cart_id)
        .bind(sku_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(quantity.unwrap_or(0))
    }

    /// Set the quantity of a SKU, inserting the line if needed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the SKU doesn't exist.
    pub async fn set_quantity(
        &self,
        cart_id: Uuid,
        sku_id: SkuId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO cart_items (cart_id, sku_id, quantity) VALUES ($1, $2, $3)
            ON CONFLICT (cart_id, sku_id) DO UPDATE SET quantity = EXCLUDED.quantity
            ",
        )
        .bind(cart_id)
        .bind(sku_id)
        .bind(quantity)
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

        self.touch(cart_id).await
    }

    /// Remove a SKU from the cart. Returns whether a line was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn remove_item(&self, cart_id: Uuid, sku_id: SkuId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND sku_id = $2")
            .bind(cart_id)
            .bind(sku_id)
            .execute(self.pool)
            .await?;
        self.touch(cart_id).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove every line from the cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, cart_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id)
            .execute(self.pool)
            .await?;
        self.touch(cart_id).await?;
        Ok(result.rows_affected())
    }

    /// Merge a guest cart into a user's cart and delete the guest cart.
    ///
    /// Quantities for the same SKU are summed and capped at 99.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the transaction fails.
    pub async fn merge(&self, from: Uuid, into: Uuid) -> Result<(), RepositoryError> {
        if from == into {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO cart_items (cart_id, sku_id, quantity, added_at)
            SELECT $2, sku_id, quantity, added_at FROM cart_items WHERE cart_id = $1
            ON CONFLICT (cart_id, sku_id)
            DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, 99)
            ",
        )
        .bind(from)
        .bind(into)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(from)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(into)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Attach a guest cart to a user who has no cart yet.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn assign_to_user(&self, cart_id: Uuid, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET user_id = $2, updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Delete carts not updated since `before`. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_abandoned(&self, before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM carts WHERE updated_at < $1")
            .bind(before)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn touch(&self, cart_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE carts SET updated_at = now() WHERE id = $1")
            .bind(cart_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
