//! Expired-session cleanup for the `tower-sessions` tables.
//!
//! The session store owns these tables; only the retention sweep lives here.

use sqlx::PgPool;

use crate::RepositoryError;

/// Storefront session table (store defaults).
pub const STOREFRONT_SESSION_TABLE: &str = "tower_sessions.session";

/// Admin session table.
pub const ADMIN_SESSION_TABLE: &str = "admin.session";

/// Repository for session retention.
pub struct SessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SessionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Delete expired sessions from `table`. Returns how many were removed.
    ///
    /// `table` must be one of the constants in this module.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_expired(&self, table: &'static str) -> Result<u64, RepositoryError> {
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE expiry_date < now()"))
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
