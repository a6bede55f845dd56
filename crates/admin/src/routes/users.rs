//! User administration route handlers.

use axum::extract::State;
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{Page, UserId, UserRole};
use atelier_db::{RepositoryError, UserRepository};
use atelier_db::models::User;

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, JsonBody, PathParam, QueryParams, page_params, success};
use crate::middleware::{CurrentAdmin, RequireAdmin};
use crate::state::AppState;

/// Query parameters for `GET /api/users`.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    /// Matches name or email.
    pub q: Option<String>,
    pub role: Option<UserRole>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// `PUT /api/users/{id}/role` body.
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: UserRole,
}

/// Admins cannot demote themselves, so there is always someone left to
/// undo a mistake.
fn check_role_change(admin: &CurrentAdmin, target: UserId, role: UserRole) -> Result<()> {
    if admin.id == target && role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "You cannot remove your own admin role".to_string(),
        ));
    }
    Ok(())
}

/// `GET /api/users`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<UserListQuery>,
) -> ApiResult<Page<User>> {
    let params = page_params(query.page, query.per_page);
    let (users, total) = UserRepository::new(state.pool())
        .list(query.q.as_deref(), query.role, params)
        .await?;
    success("Users", Page::new(users, params, total))
}

/// `PUT /api/users/{id}/role`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn set_user_role(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<UserId>,
    JsonBody(body): JsonBody<SetRoleRequest>,
) -> ApiResult<User> {
    check_role_change(&admin, id, body.role)?;

    let user = UserRepository::new(state.pool())
        .set_role(id, body.role)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("user".to_string()),
            other => other.into(),
        })?;
    tracing::info!(user_id = %user.id, role = %user.role, "User role changed");

    success("Role updated", user)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::Email;

    use super::*;

    fn admin() -> CurrentAdmin {
        CurrentAdmin {
            id: UserId::new(1),
            email: Email::parse("owner@example.com").unwrap(),
            name: "Owner".to_string(),
        }
    }

    #[test]
    fn test_cannot_demote_self() {
        assert!(matches!(
            check_role_change(&admin(), UserId::new(1), UserRole::Customer),
            Err(AppError::Forbidden(_))
        ));
        assert!(check_role_change(&admin(), UserId::new(1), UserRole::Admin).is_ok());
    }

    #[test]
    fn test_can_change_others() {
        assert!(check_role_change(&admin(), UserId::new(2), UserRole::Customer).is_ok());
        assert!(check_role_change(&admin(), UserId::new(2), UserRole::Admin).is_ok());
    }

    #[test]
    fn test_role_body() {
        let body: SetRoleRequest = serde_json::from_str(r#"{"role": "ADMIN"}"#).unwrap();
        assert_eq!(body.role, UserRole::Admin);
    }
}
