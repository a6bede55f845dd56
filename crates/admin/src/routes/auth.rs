//! Admin sign-in.
//!
//! Admins are ordinary accounts with the `admin` role; they sign in with
//! the same argon2id passwords as customers but get a separate, stricter
//! session.

use axum::extract::State;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use atelier_services::AuthService;

use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::extract::{ApiResult, JsonBody, done, success};
use crate::middleware::{CurrentAdmin, RequireAdmin, clear_current_admin, set_current_admin};
use crate::state::AppState;

/// `POST /api/auth/login` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/login`
///
/// A valid customer password is refused exactly like a wrong one, so the
/// endpoint does not reveal which emails belong to customers.
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<LoginRequest>,
) -> ApiResult<CurrentAdmin> {
    let user = match AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await
    {
        Ok(user) if user.is_admin() => user,
        Ok(user) => {
            tracing::warn!(user_id = %user.id, "Non-admin attempted admin login");
            return Err(AppError::Unauthorized("Invalid email or password".to_string()));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Admin login failed");
            return Err(e.into());
        }
    };

    let admin = CurrentAdmin::from(&user);
    set_current_admin(&session, &admin).await?;
    set_sentry_user(&admin.id, Some(admin.email.as_str()));
    tracing::info!(admin_id = %admin.id, "Admin signed in");

    success("Signed in", admin)
}

/// `POST /api/auth/logout`
#[instrument(skip(session))]
pub async fn logout(session: Session) -> ApiResult<()> {
    clear_current_admin(&session).await?;
    clear_sentry_user();
    done("Signed out")
}

/// `GET /api/auth/me`
#[instrument(skip_all)]
pub async fn me(RequireAdmin(admin): RequireAdmin) -> ApiResult<CurrentAdmin> {
    success("Signed in", admin)
}

