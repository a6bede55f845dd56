//! Dashboard route handler.

use axum::extract::State;
use tracing::instrument;

use atelier_db::DashboardRepository;
use atelier_db::models::DashboardStats;

use crate::extract::{ApiResult, success};
use crate::middleware::RequireAdmin;
use crate::state::AppState;

/// `GET /api/dashboard`
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> ApiResult<DashboardStats> {
    let stats = DashboardRepository::new(state.pool()).stats().await?;
    success("Dashboard", stats)
}
