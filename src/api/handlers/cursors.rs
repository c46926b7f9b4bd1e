//! Sync cursor listing.

use axum::{extract::State, Json};
use tracing::instrument;

use crate::api::middleware::error::ApiError;
use crate::api::models::CursorInfo;
use crate::app_state::AppState;

#[utoipa::path(
    get,
    path = "/api/v1/sync/cursors",
    responses(
        (status = 200, description = "Every persisted sync cursor", body = Vec<CursorInfo>)
    ),
    tag = "Sync"
)]
/// Returns how far each event type has been mirrored.
#[instrument(skip(state))]
pub async fn list_cursors(State(state): State<AppState>) -> Result<Json<Vec<CursorInfo>>, ApiError> {
    let cursors = state.repository.list_cursors().await?;
    Ok(Json(cursors.into_iter().map(CursorInfo::from).collect()))
}
