//! Discount code route handlers.

use axum::extract::State;
use rust_decimal::Decimal;
use tracing::instrument;

use atelier_core::pricing::DiscountRule;
use atelier_core::{DiscountId, Page};
use atelier_db::models::{Discount, DiscountInput};
use atelier_db::{DiscountRepository, RepositoryError};

use crate::error::{AppError, Result};
use crate::extract::{ApiResult, JsonBody, PageQuery, PathParam, QueryParams, done, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// Check a discount before it is stored. Codes are normalised to upper case.
fn validate(mut input: DiscountInput) -> Result<DiscountInput> {
    input.code = input.code.trim().to_uppercase();
    if input.code.is_empty() {
        return Err(AppError::Validation("Code is required".to_string()));
    }
    if !input
        .code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
    {
        return Err(AppError::Validation(
            "Code may only contain letters, digits, hyphens and underscores".to_string(),
        ));
    }

    DiscountRule::new(input.kind, input.value)
        .map_err(|e| AppError::Validation(capitalize_first(&e.to_string())))?;

    if input.min_subtotal.is_some_and(|min| min < Decimal::ZERO) {
        return Err(AppError::Validation(
            "Minimum subtotal cannot be negative".to_string(),
        ));
    }
    if input.usage_limit.is_some_and(|limit| limit <= 0) {
        return Err(AppError::Validation("Usage limit must be positive".to_string()));
    }
    if let (Some(start), Some(end)) = (input.starts_at, input.ends_at)
        && start >= end
    {
        return Err(AppError::Validation("Discount must end after it starts".to_string()));
    }
    Ok(input)
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn map_missing(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::NotFound => AppError::NotFound("discount".to_string()),
        other => other.into(),
    }
}

/// `GET /api/discounts`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn list_discounts(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<Page<Discount>> {
    let params = query.params();
    let (discounts, total) = DiscountRepository::new(state.pool()).list(params).await?;
    success("Discounts", Page::new(discounts, params, total))
}

/// `POST /api/discounts`
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn create_discount(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    JsonBody(body): JsonBody<DiscountInput>,
) -> ApiResult<Discount> {
    let input = validate(body)?;
    let discount = DiscountRepository::new(state.pool()).create(&input).await?;
    tracing::info!(discount_id = %discount.id, code = %discount.code, "Discount created");
    success("Discount created", discount)
}

/// `GET /api/discounts/{id}`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn get_discount(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<DiscountId>,
) -> ApiResult<Discount> {
    let discount = DiscountRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("discount".to_string()))?;
    success("Discount", discount)
}

/// `PUT /api/discounts/{id}`
///
/// Replaces every setting; the usage count is kept.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.id))]
pub async fn update_discount(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<DiscountId>,
    JsonBody(body): JsonBody<DiscountInput>,
) -> ApiResult<Discount> {
    let input = validate(body)?;
    let discount = DiscountRepository::new(state.pool())
        .update(id, &input)
        .await
        .map_err(map_missing)?;
    success("Discount updated", discount)
}

/// `DELETE /api/discounts/{id}`
///
/// Orders keep the code they were placed with.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn delete_discount(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    PathParam(id): PathParam<DiscountId>,
) -> ApiResult<()> {
    DiscountRepository::new(state.pool())
        .delete(id)
        .await
        .map_err(map_missing)?;
    done("Discount deleted")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use atelier_core::DiscountKind;

    use super::*;

    fn input(kind: DiscountKind, value: i64) -> DiscountInput {
        DiscountInput {
            code: " spring-10 ".to_string(),
            kind,
            value: Decimal::from(value),
            min_subtotal: None,
            starts_at: None,
            ends_at: None,
            usage_limit: None,
            is_active: true,
        }
    }

    #[test]
    fn test_code_normalised() {
        let input = validate(input(DiscountKind::Percentage, 10)).unwrap();
        assert_eq!(input.code, "SPRING-10");
    }

    #[test]
    fn test_percentage_range() {
        assert!(validate(input(DiscountKind::Percentage, 100)).is_ok());
        assert!(validate(input(DiscountKind::Percentage, 101)).is_err());
        assert!(validate(input(DiscountKind::Percentage, 0)).is_err());
        assert!(validate(input(DiscountKind::FixedAmount, 250)).is_ok());
        assert!(validate(input(DiscountKind::FixedAmount, -1)).is_err());
    }

    #[test]
    fn test_window_and_limits() {
        let now = Utc::now();
        let mut bad_window = input(DiscountKind::Percentage, 10);
        bad_window.starts_at = Some(now);
        bad_window.ends_at = Some(now - Duration::hours(1));
        assert!(validate(bad_window).is_err());

        let mut bad_limit = input(DiscountKind::Percentage, 10);
        bad_limit.usage_limit = Some(0);
        assert!(validate(bad_limit).is_err());

        let mut bad_code = input(DiscountKind::Percentage, 10);
        bad_code.code = "TEN OFF".to_string();
        assert!(validate(bad_code).is_err());
    }

    #[test]
    fn test_rule_errors_are_readable() {
        match validate(input(DiscountKind::Percentage, 150)) {
            Err(AppError::Validation(msg)) => {
                assert_eq!(msg, "Percentage discounts must be greater than 0 and at most 100");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
