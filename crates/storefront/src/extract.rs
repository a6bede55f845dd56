//! Request extractors and response helpers.
//!
//! [`JsonBody`] and [`QueryParams`] wrap axum's extractors so malformed input
//! is rejected with the same tagged body as every other error.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts};

use atelier_core::ActionResult;

use crate::error::{AppError, Result};

/// JSON request body, rejected as `validation_error`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string, rejected as `validation_error`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Handler return type: a tagged result or an [`AppError`].
pub type ApiResult<T> = Result<Json<ActionResult<T>>>;

/// Successful tagged result carrying `data`.
#[allow(clippy::unnecessary_wraps)]
pub fn success<T>(message: impl Into<String>, data: T) -> ApiResult<T> {
    Ok(Json(ActionResult::success(message, data)))
}

/// Successful tagged result without data.
#[allow(clippy::unnecessary_wraps)]
pub fn done(message: impl Into<String>) -> ApiResult<()> {
    Ok(Json(ActionResult::ok(message)))
}
