//! Scheduled job endpoints.
//!
//! The scheduler calls `/api/cron/{job}` with `Authorization: Bearer
//! <CRON_SECRET>`. Jobs are idempotent, so an overlapping or repeated call
//! does no harm. `atelier-cli jobs run` runs the same code.

use std::str::FromStr;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use secrecy::ExposeSecret;
use tracing::instrument;

use atelier_services::webhooks::constant_time_compare;
use atelier_services::{Job, JobReport};

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, PathParam, success};
use crate::state::AppState;

/// Check `Authorization: Bearer <secret>`.
fn authorize(headers: &HeaderMap, secret: &str) -> Result<()> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if constant_time_compare(token, secret) => Ok(()),
        _ => Err(AppError::Unauthorized("Invalid cron secret".to_string())),
    }
}

/// `GET|POST /api/cron/{job}`
#[instrument(skip(state, headers))]
pub async fn run_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    PathParam(name): PathParam<String>,
) -> ApiResult<JobReport> {
    authorize(&headers, state.config().cron_secret.expose_secret())?;
    let job = Job::from_str(&name)?;

    let report = state.jobs().run(job).await?;
    tracing::info!(
        job = %job,
        examined = report.examined,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Cron job finished"
    );

    success(format!("{job} finished"), report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    const SECRET: &str = "cron_Zq81nZd0aLp3xYkT4vB7mW2cR9sH6jF";

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_secret_required() {
        assert!(authorize(&headers(&format!("Bearer {SECRET}")), SECRET).is_ok());
        assert!(authorize(&headers("Bearer wrong"), SECRET).is_err());
        assert!(authorize(&headers(SECRET), SECRET).is_err());
        assert!(authorize(&HeaderMap::new(), SECRET).is_err());
    }
}
