//! Admin user management commands.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `ADMIN_PASSWORD` - Password for `admin create`; read from stdin when unset

use std::io::BufRead;

use thiserror::Error;

use atelier_core::{Email, UserRole};
use atelier_db::{RepositoryError, UserRepository};
use atelier_services::{AuthError, AuthService};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Could not read password: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("No account with email: {0}")]
    UnknownUser(String),
}

fn read_password() -> Result<String, AdminError> {
    if let Ok(password) = std::env::var("ADMIN_PASSWORD") {
        return Ok(password);
    }

    tracing::info!("ADMIN_PASSWORD not set, reading password from stdin");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

/// Create a new admin user.
///
/// # Returns
///
/// The ID of the created admin user.
pub async fn create_user(email: &str, name: &str) -> Result<i32, AdminError> {
    let password = read_password()?;
    let pool = super::connect()
        .await
        .map_err(|e| AdminError::Config(e.to_string()))?;

    tracing::info!("Creating admin user: {}", email);
    let user = AuthService::new(&pool)
        .register(email, name, &password, UserRole::Admin)
        .await?;

    tracing::info!(
        "Admin user created successfully! ID: {}, Email: {}",
        user.id,
        user.email
    );
    Ok(user.id.as_i32())
}

/// Grant admin rights to an existing account.
pub async fn promote(email: &str) -> Result<(), AdminError> {
    let parsed = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;
    let pool = super::connect()
        .await
        .map_err(|e| AdminError::Config(e.to_string()))?;

    let users = UserRepository::new(&pool);
    let user = users
        .get_by_email(&parsed)
        .await?
        .ok_or_else(|| AdminError::UnknownUser(email.to_owned()))?;

    if user.is_admin() {
        tracing::info!("{} is already an admin", user.email);
        return Ok(());
    }

    users.set_role(user.id, UserRole::Admin).await?;
    tracing::info!("{} is now an admin", user.email);
    Ok(())
}
