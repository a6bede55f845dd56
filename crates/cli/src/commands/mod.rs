//! Command implementations.

pub mod admin;
pub mod jobs;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

use atelier_services::config::get_database_url;

/// Load `.env` and connect to `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let database_url: SecretString = get_database_url("DATABASE_URL")?;
    tracing::info!("Connecting to database...");
    let pool = atelier_db::create_pool(&database_url).await?;
    Ok(pool)
}
