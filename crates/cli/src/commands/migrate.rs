//! Database migration command.
//!
//! Applies the embedded schema migrations, then creates the two session
//! tables (`tower_sessions.session` for the storefront, `admin.session` for
//! admin). Both steps are idempotent.

use tower_sessions_sqlx_store::PostgresStore;

use atelier_admin::middleware::admin_session_store;

use super::connect;

/// Run all migrations.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect().await?;

    tracing::info!("Running schema migrations...");
    atelier_db::run_migrations(&pool).await?;

    tracing::info!("Creating session tables...");
    PostgresStore::new(pool.clone()).migrate().await?;
    admin_session_store(&pool).migrate().await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
