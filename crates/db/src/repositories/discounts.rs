//! Discount code repository.

use sqlx::{PgConnection, PgPool};

use atelier_core::{DiscountId, PageParams};

use crate::RepositoryError;
use crate::models::{Discount, DiscountInput};

const DISCOUNT_COLUMNS: &str = "id, code, kind, value, min_subtotal, starts_at, ends_at, \
     usage_limit, usage_count, is_active, created_at, updated_at";

/// Repository for discount codes. Codes are matched case-insensitively and
/// stored upper-case.
pub struct DiscountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DiscountRepository<'a> {
    /// Create a new discount repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List discounts, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, page: PageParams) -> Result<(Vec<Discount>, i64), RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM discounts")
            .fetch_one(self.pool)
            .await?;
        let discounts = sqlx::query_as::<_, Discount>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok((discounts, total))
    }

    /// Get a discount by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: DiscountId) -> Result<Option<Discount>, RepositoryError> {
        let discount = sqlx::query_as::<_, Discount>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(discount)
    }

    /// Get a discount by code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_code(&self, code: &str) -> Result<Option<Discount>, RepositoryError> {
        let discount = sqlx::query_as::<_, Discount>(&format!(
            "SELECT {DISCOUNT_COLUMNS} FROM discounts WHERE code = upper($1)"
        ))
        .bind(code.trim())
        .fetch_optional(self.pool)
        .await?;

        Ok(discount)
    }

    /// Create a discount.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the code is taken.
    pub async fn create(&self, input: &DiscountInput) -> Result<Discount, RepositoryError> {
        sqlx::query_as::<_, Discount>(&format!(
            r"
            INSERT INTO discounts
                (code, kind, value, min_subtotal, starts_at, ends_at, usage_limit, is_active)
            VALUES (upper($1), $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DISCOUNT_COLUMNS}
            "
        ))
        .bind(input.code.trim())
        .bind(input.kind)
        .bind(input.value)
        .bind(input.min_subtotal)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.usage_limit)
        .bind(input.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "discount code already exists"))
    }

    /// Replace a discount's settings. The usage count is preserved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the discount doesn't exist.
    /// Returns `RepositoryError::Conflict` if the new code is taken.
    pub async fn update(
        &self,
        id: DiscountId,
        input: &DiscountInput,
    ) -> Result<Discount, RepositoryError> {
        sqlx::query_as::<_, Discount>(&format!(
            r"
            UPDATE discounts SET
                code = upper($2), kind = $3, value = $4, min_subtotal = $5,
                starts_at = $6, ends_at = $7, usage_limit = $8, is_active = $9,
                updated_at = now()
            WHERE id = $1
            RETURNING {DISCOUNT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(input.code.trim())
        .bind(input.kind)
        .bind(input.value)
        .bind(input.min_subtotal)
        .bind(input.starts_at)
        .bind(input.ends_at)
        .bind(input.usage_limit)
        .bind(input.is_active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_unique(e, "discount code already exists"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete a discount. Orders keep the code as text.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the discount doesn't exist.
    pub async fn delete(&self, id: DiscountId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM discounts WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Count one redemption of `code`, respecting its usage limit.
    ///
    /// Returns `false` when the limit was already reached.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record_usage(conn: &mut PgConnection, code: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE discounts SET usage_count = usage_count + 1, updated_at = now()
            WHERE code = upper($1) AND (usage_limit IS NULL OR usage_count < usage_limit)
            ",
        )
        .bind(code)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
