//! Unified error handling with Sentry integration.
//!
//! Errors render as the tagged [`ActionResult`] body. Repository `NotFound`
//! and `Conflict` pass through as 404 and 409 since most admin routes are
//! plain CRUD over a single table.

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use atelier_core::ActionResult;
use atelier_db::RepositoryError;
use atelier_services::{AuthError, JobError, OrderOpsError, PaymentError, WebhookError};

/// Application-level error type for admin.
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

    #[error("Job error: {0}")]
    Job(#[from] JobError),

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

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

const fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Conflict(_) => StatusCode::CONFLICT,
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn repository_message(err: &RepositoryError) -> String {
    match err {
        RepositoryError::NotFound => "Not found".to_string(),
        RepositoryError::Conflict(msg) => capitalize(msg),
        RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => {
            "Something went wrong. Please try again.".to_string()
        }
    }
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => repository_status(err),
            Self::Session(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Orders(err) => match err {
                OrderOpsError::Repository(err) => repository_status(err),
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
            Self::Job(err) => match err {
                JobError::UnknownJob(_) => StatusCode::NOT_FOUND,
                JobError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
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
        match self.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                ActionResult::unauthorized(self.public_message())
            }
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                ActionResult::validation_error(self.public_message())
            }
            _ => ActionResult::error(self.public_message()),
        }
    }

    // Admins see more than customers, but still no SQL or provider keys
    fn public_message(&self) -> String {
        match self {
            Self::Database(err) => repository_message(err),
            Self::Session(_) | Self::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
            Self::Orders(err) => match err {
                OrderOpsError::Repository(err) => repository_message(err),
                OrderOpsError::Payment(PaymentError::Api { status, .. }) => {
                    format!("Payment provider rejected the request ({status})")
                }
                OrderOpsError::Payment(_) => "Payment provider is unavailable".to_string(),
                other => capitalize(&other.to_string()),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => "Invalid email or password".to_string(),
                AuthError::UserAlreadyExists => "A user with this email already exists".to_string(),
                AuthError::WeakPassword(msg) => capitalize(msg),
                AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
                AuthError::EmptyName => "Name is required".to_string(),
                AuthError::UserNotFound => "User not found".to_string(),
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    "Something went wrong. Please try again.".to_string()
                }
            },
            Self::Webhook(err) => match err {
                WebhookError::InvalidSignature(_) => "Invalid signature".to_string(),
                WebhookError::Payload(msg) => format!("Invalid payload: {msg}"),
                WebhookError::Repository(_) => "Webhook event could not be updated".to_string(),
            },
            Self::Job(err) => match err {
                JobError::UnknownJob(name) => format!("Unknown job: {name}"),
                JobError::Repository(_) => "Job failed. See logs for details.".to_string(),
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

/// Set the Sentry user context for the signed-in admin.
pub fn set_sentry_user(admin_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(admin_id.to_string()),
            email: email.map(String::from),
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
    fn test_repository_errors_pass_through() {
        assert_eq!(
            AppError::Database(RepositoryError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Database(RepositoryError::Conflict("slug already in use".to_string()))
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Database(RepositoryError::DataCorruption("bad enum".to_string())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Database(RepositoryError::Conflict("slug already in use".to_string()))
                .to_result()
                .message,
            "Slug already in use"
        );
    }

    #[test]
    fn test_job_errors() {
        let err = AppError::Job(JobError::UnknownJob("backup".to_string()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_result().message, "Unknown job: backup");
    }

    #[test]
    fn test_forbidden_is_tagged_unauthorized() {
        let result = AppError::Forbidden("Admins only".to_string()).to_result();
        assert_eq!(result.status, ActionStatus::Unauthorized);
        assert_eq!(result.message, "Admins only");
    }

    #[test]
    fn test_provider_details_hidden() {
        let err = AppError::Orders(OrderOpsError::Payment(PaymentError::Api {
            status: 401,
            message: "Invalid API Key provided: sk_live_****".to_string(),
        }));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        let message = err.to_result().message;
        assert!(!message.contains("sk_live"));
        assert!(message.contains("401"));
    }

    #[test]
    fn test_invalid_transition_is_conflict() {
        let err = AppError::Orders(OrderOpsError::InvalidTransition {
            from: "DELIVERED".to_string(),
            to: "CANCELLED".to_string(),
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(
            err.to_result().message,
            "Cannot move from DELIVERED to CANCELLED"
        );
    }
}
