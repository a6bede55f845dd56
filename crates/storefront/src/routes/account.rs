//! Customer account route handlers.
//!
//! Registration and login sign the customer in immediately and carry any
//! guest cart over. Profile routes require a signed-in customer.

use axum::extract::State;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use atelier_core::UserRole;
use atelier_db::UserRepository;
use atelier_db::models::User;
use atelier_services::AuthService;

use super::cart::merge_guest_cart;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::extract::{ApiResult, JsonBody, done, success};
use crate::middleware::session::keys;
use crate::middleware::{CurrentUser, RequireAuth, clear_session, set_current_user};
use crate::state::AppState;

/// `POST /api/account/register` body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// `POST /api/account/login` body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// `PATCH /api/account/profile` body.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: String,
    pub email: String,
}

/// `POST /api/account/password` body.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

async fn sign_in(state: &AppState, session: &Session, user: &User) -> Result<()> {
    let current = CurrentUser::from(user);
    set_current_user(session, &current).await?;
    merge_guest_cart(state, session, &current).await?;
    set_sentry_user(&user.id);
    Ok(())
}

/// `POST /api/account/register`
#[instrument(skip(state, session, body))]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<RegisterRequest>,
) -> ApiResult<User> {
    let user = AuthService::new(state.pool())
        .register(&body.email, &body.name, &body.password, UserRole::Customer)
        .await?;
    tracing::info!(user_id = %user.id, "Customer registered");

    sign_in(&state, &session, &user).await?;
    success("Account created", user)
}

/// `POST /api/account/login`
#[instrument(skip(state, session, body))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(body): JsonBody<LoginRequest>,
) -> ApiResult<User> {
    let user = match AuthService::new(state.pool())
        .login(&body.email, &body.password)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    sign_in(&state, &session, &user).await?;
    tracing::info!(user_id = %user.id, "Customer signed in");
    success("Signed in", user)
}

/// `POST /api/account/logout`
///
/// Ends the whole session, guest cart included.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> ApiResult<()> {
    clear_session(&session).await?;
    clear_sentry_user();
    done("Signed out")
}

/// `GET /api/account/profile`
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> ApiResult<User> {
    let profile = UserRepository::new(state.pool())
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("account".to_string()))?;
    success("Profile", profile)
}

/// `PATCH /api/account/profile`
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    JsonBody(body): JsonBody<UpdateProfileRequest>,
) -> ApiResult<User> {
    let updated = AuthService::new(state.pool())
        .update_profile(user.id, &body.name, &body.email)
        .await?;

    session
        .insert(keys::CURRENT_USER, CurrentUser::from(&updated))
        .await?;
    success("Profile updated", updated)
}

/// `POST /api/account/password`
#[instrument(skip(state, session, user, body), fields(user_id = %user.id))]
pub async fn change_password(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(user): RequireAuth,
    JsonBody(body): JsonBody<ChangePasswordRequest>,
) -> ApiResult<()> {
    AuthService::new(state.pool())
        .change_password(user.id, &body.current_password, &body.new_password)
        .await?;

    session.cycle_id().await?;
    done("Password changed")
}
