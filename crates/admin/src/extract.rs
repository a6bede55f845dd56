//! Request extractors and response helpers.
//!
//! Same envelope as the storefront: malformed input is rejected with the
//! tagged body rather than axum's plain-text rejections.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts};
use serde::Deserialize;

use atelier_core::pagination::DEFAULT_PER_PAGE;
use atelier_core::{ActionResult, PageParams};

use crate::error::{AppError, Result};

/// JSON request body, rejected as `validation_error`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);

/// Query string, rejected as `validation_error`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct QueryParams<T>(pub T);

/// Path parameters; a non-numeric id is a `validation_error`, not a 404.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct PathParam<T>(pub T);

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

/// Pagination from optional `page`/`per_page` query fields.
///
/// List queries declare the two fields themselves: `serde(flatten)` does not
/// parse numbers out of a query string.
#[must_use]
pub fn page_params(page: Option<u32>, per_page: Option<u32>) -> PageParams {
    PageParams::new(page.unwrap_or(1), per_page.unwrap_or(DEFAULT_PER_PAGE))
}

/// Query string of a plain paginated list.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PageQuery {
    #[must_use]
    pub fn params(&self) -> PageParams {
        page_params(self.page, self.per_page)
    }
}
