//! Newsletter subscriber route handlers.

use std::fmt::Write;

use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::instrument;

use atelier_core::{Page, SubscriptionId, SubscriptionStatus};
use atelier_db::models::NewsletterSubscription;
use atelier_db::{NewsletterRepository, RepositoryError};

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, PathParam, QueryParams, done, page_params, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Query parameters for `GET /api/newsletter`.
#[derive(Debug, Default, Deserialize)]
pub struct SubscriberListQuery {
    pub status: Option<SubscriptionStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Query parameters for `GET /api/newsletter/export`.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub status: Option<SubscriptionStatus>,
}

/// Quote a CSV field when it needs it.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn to_csv(subscriptions: &[NewsletterSubscription]) -> String {
    let mut csv = String::from("email,status,subscribed_at,unsubscribed_at\n");
    for sub in subscriptions {
        let _ = writeln!(
            csv,
            "{},{},{},{}",
            csv_field(sub.email.as_str()),
            sub.status,
            sub.subscribed_at.to_rfc3339(),
            sub.unsubscribed_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        );
    }
    csv
}

/// `GET /api/newsletter`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_subscribers(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<SubscriberListQuery>,
) -> ApiResult<Page<NewsletterSubscription>> {
    let params = page_params(query.page, query.per_page);
    let (subs, total) = NewsletterRepository::new(state.pool())
        .list(query.status, params)
        .await?;
    success("Subscribers", Page::new(subs, params, total))
}

/// `GET /api/newsletter/export`
///
/// Downloads matching subscribers as CSV, oldest first.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn export_subscribers(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<ExportQuery>,
) -> Result<Response> {
    let subs = NewsletterRepository::new(state.pool())
        .export(query.status)
        .await?;
    tracing::info!(count = subs.len(), "Subscribers exported");

    let filename = match query.status {
        Some(status) => format!("subscribers-{status}.csv"),
        None => "subscribers.csv".to_string(),
    };
    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        to_csv(&subs),
    )
        .into_response())
}

/// `DELETE /api/newsletter/{id}`
///
/// Removes the address entirely, unlike an unsubscribe.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_subscriber(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<SubscriptionId>,
) -> ApiResult<()> {
    NewsletterRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AppError::NotFound("subscriber".to_string()),
            other => other.into(),
        })?;
    done("Subscriber deleted")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use atelier_core::Email;

    use super::*;

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("a@example.com"), "a@example.com");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_rows() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let sub = NewsletterSubscription {
            id: SubscriptionId::new(1),
            email: Email::parse("reader@example.com").unwrap(),
            status: SubscriptionStatus::Subscribed,
            unsubscribe_token: Uuid::nil(),
            subscribed_at: at,
            unsubscribed_at: None,
        };
        let csv = to_csv(&[sub]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("email,status,subscribed_at,unsubscribed_at"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("reader@example.com,"));
        assert!(row.ends_with("2026-01-02T03:04:05+00:00,"));
        assert_eq!(lines.next(), None);
    }
}
