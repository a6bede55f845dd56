//! Authentication extractors for admin.
//!
//! The session only proves who signed in. [`RequireAdmin`] reloads the
//! account on every request so a demoted or deleted admin loses access
//! immediately rather than when the session expires.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use atelier_core::{Email, UserId};
use atelier_db::UserRepository;
use atelier_db::models::User;

use super::session::keys;
use crate::error::AppError;
use crate::state::AppState;

/// Session-stored admin identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentAdmin {
    pub id: UserId,
    pub email: Email,
    pub name: String,
}

impl From<&User> for CurrentAdmin {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
        }
    }
}

/// Extractor that requires a signed-in admin.
///
/// Rejects with 401 when nobody is signed in and 403 when the account is no
/// longer an admin.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireAdmin(admin): RequireAdmin) -> String {
///     format!("Hello, {}!", admin.name)
/// }
/// ```
pub struct RequireAdmin(pub CurrentAdmin);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let admin = session
            .get::<CurrentAdmin>(keys::CURRENT_ADMIN)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Please sign in".to_string()))?;

        let user = UserRepository::new(state.pool())
            .get_by_id(admin.id)
            .await?
            .filter(User::is_admin);

        match user {
            Some(user) => Ok(Self(CurrentAdmin::from(&user))),
            None => {
                tracing::warn!(admin_id = %admin.id, "Session admin no longer has access");
                session.flush().await?;
                Err(AppError::Forbidden("Admin access required".to_string()))
            }
        }
    }
}

/// Store the signed-in admin, rotating the session id.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_admin(
    session: &Session,
    admin: &CurrentAdmin,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(keys::CURRENT_ADMIN, admin).await
}

/// Clear the admin session.
///
/// # Errors
///
/// Returns an error if the session cannot be deleted.
pub async fn clear_current_admin(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use atelier_core::UserRole;

    use super::*;

    #[test]
    fn test_current_admin_from_user() {
        let now = Utc::now();
        let user = User {
            id: UserId::new(7),
            email: Email::parse("ops@example.com").unwrap(),
            name: "Ops".to_string(),
            role: UserRole::Admin,
            created_at: now,
            updated_at: now,
        };
        let admin = CurrentAdmin::from(&user);
        assert_eq!(admin.id, UserId::new(7));
        assert_eq!(admin.email.as_str(), "ops@example.com");

        let json = serde_json::to_value(&admin).unwrap();
        let back: CurrentAdmin = serde_json::from_value(json).unwrap();
        assert_eq!(back, admin);
    }
}
