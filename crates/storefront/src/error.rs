//! Unified error handling with Sentry integration.
//!
//! Every handler returns `Result<T, AppError>`. Errors render as the tagged
//! [`ActionResult`] body; server-side failures are captured to Sentry first
//! and their details are never sent to the client.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use atelier_core::ActionResult;
use atelier_db::RepositoryError;
use atelier_services::{AuthError, OrderOpsError, PaymentError, WebhookError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error("Order error: {0}")]
    Orders(#[from] OrderOpsError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Input failed validation; the message is shown to the user.
    #[error("{0}")]
    Validation(String),

    /// Malformed request body or query string.
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => Self::Validation(e.body_text()),
            other => Self::BadRequest(other.body_text()),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Orders(err) => match err {
                OrderOpsError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
                OrderOpsError::Payment(_) => StatusCode::BAD_GATEWAY,
                OrderOpsError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderOpsError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderOpsError::InvalidTransition { .. } | OrderOpsError::Conflict(_) => {
                    StatusCode::CONFLICT
                }
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::EmptyName => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Webhook(err) => match err {
                WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
                WebhookError::Payload(_) => StatusCode::BAD_REQUEST,
                WebhookError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
        }
    }

    /// The tagged body for this error.
    #[must_use]
    pub fn to_result(&self) -> ActionResult<()> {
        let status = self.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ActionResult::unauthorized(self.public_message())
            }
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                ActionResult::validation_error(self.public_message())
            }
            _ => ActionResult::error(self.public_message()),
        }
    }

    // Don't expose internal error details to clients
    fn public_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::Orders(err) => match err {
                OrderOpsError::Repository(_) => {
                    "Something went wrong. Please try again.".to_string()
                }
                OrderOpsError::Payment(PaymentError::Api { .. } | PaymentError::Http(_)) => {
                    "The payment provider is unavailable. Please try again.".to_string()
                }
                OrderOpsError::Payment(_) => "Payment could not be processed".to_string(),
                other => capitalize(&other.to_string()),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => {
                    "An account with this email already exists".to_string()
                }
                AuthError::WeakPassword(msg) => capitalize(msg),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::EmptyName => "Name is required".to_string(),
                AuthError::UserNotFound => "Account not found".to_string(),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    "Something went wrong. Please try again.".to_string()
                }
            },
            Self::Webhook(err) => match err {
                WebhookError::InvalidSignature(_) => "Invalid signature".to_string(),
                WebhookError::Payload(_) => "Invalid payload".to_string(),
                WebhookError::Repository(_) => "Webhook could not be recorded".to_string(),
            },
            Self::NotFound(what) => format!("{} not found", capitalize(what)),
            Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::Validation(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, %status, "Request rejected");
        }

        (status, Json(self.to_result())).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use atelier_core::ActionStatus;

    use super::*;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::NotFound("product".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Unauthorized("Sign in".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Validation("bad".to_string()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Orders(OrderOpsError::Conflict("changed".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Orders(OrderOpsError::Payment(PaymentError::Api {
                status: 500,
                message: "down".to_string()
            }))
            .status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Auth(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_tags_follow_status() {
        assert_eq!(
            AppError::Forbidden("no".to_string()).to_result().status,
            ActionStatus::Unauthorized
        );
        assert_eq!(
            AppError::Auth(AuthError::WeakPassword("too short".to_string()))
                .to_result()
                .status,
            ActionStatus::ValidationError
        );
        assert_eq!(
            AppError::NotFound("order".to_string()).to_result().status,
            ActionStatus::Error
        );
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let result = AppError::Internal("pool exhausted at 10.0.0.3".to_string()).to_result();
        assert_eq!(result.status, ActionStatus::Error);
        assert!(!result.message.contains("10.0.0.3"));

        let result = AppError::Orders(OrderOpsError::Payment(PaymentError::Api {
            status: 401,
            message: "Invalid API Key provided: sk_live_****".to_string(),
        }))
        .to_result();
        assert!(!result.message.contains("sk_live"));
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            AppError::NotFound("order".to_string()).to_result().message,
            "Order not found"
        );
        assert_eq!(
            AppError::Orders(OrderOpsError::NotFound("refund")).to_result().message,
            "Refund not found"
        );
        assert_eq!(
            AppError::Auth(AuthError::WeakPassword(
                "password must be at least 8 characters".to_string()
            ))
            .to_result()
            .message,
            "Password must be at least 8 characters"
        );
    }

    #[test]
    fn test_response_body_is_tagged_json() {
        let response = AppError::Validation("Quantity must be 1-99".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
