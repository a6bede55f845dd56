//! Health check.

/// Liveness check for the load balancer. Does not touch the database.
pub async fn health() -> &'static str {
    "ok"
}
