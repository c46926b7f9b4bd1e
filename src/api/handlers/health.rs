//! Health check endpoint.

use axum::{extract::State, Json};
use std::time::SystemTime;
use tracing::{instrument, warn};

use crate::api::middleware::error::ApiError;
use crate::api::models::{HealthResponse, HealthStatus};
use crate::app_state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    ),
    tag = "Health"
)]
/// Returns service health information.
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let uptime = SystemTime::now()
        .duration_since(state.start_time)
        .unwrap_or_default()
        .as_secs();

    let database_status = match state.repository.health_check().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            warn!(error = %e, "Database health check failed");
            HealthStatus::Unhealthy
        }
    };

    let (chain_status, chain_head) = match state.syncer.chain_head().await {
        Ok(head) => (HealthStatus::Healthy, Some(head)),
        Err(e) => {
            warn!(error = %e, "Chain head unreachable");
            (HealthStatus::Unhealthy, None)
        }
    };

    let status = match (database_status, chain_status) {
        (HealthStatus::Healthy, HealthStatus::Healthy) => HealthStatus::Healthy,
        (HealthStatus::Healthy, _) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    };

    Ok(Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        database_status,
        chain_status,
        chain_head,
    }))
}
