//! Member sync endpoint.

use axum::{
    extract::State,
    Json,
};
use tracing::{info, instrument};

use crate::api::extractors::ApiQuery;
use crate::api::middleware::error::ApiError;
use crate::api::models::{
    AutoSyncReportInfo, SyncQuery, SyncResponse, SyncResultInfo,
};
use crate::app_state::AppState;
use crate::error::IndexerError;
use crate::events::EventSelection;
use crate::sync::auto_sync;

/// Upper bound for `maxIterations`.
const MAX_ITERATIONS_LIMIT: u32 = 100;

#[utoipa::path(
    get,
    path = "/api/v1/sync/members",
    params(SyncQuery),
    responses(
        (status = 200, description = "Sync results", body = SyncResponse),
        (status = 400, description = "Invalid query", body = crate::api::models::ErrorResponse),
        (status = 409, description = "Cursor advanced by a concurrent sync", body = crate::api::models::ErrorResponse),
        (status = 500, description = "Sync failed", body = crate::api::models::ErrorResponse)
    ),
    tag = "Sync"
)]
/// Mirrors the next window of referral events, or keeps going until caught
/// up when `autoSync` is set.
#[instrument(skip(state), fields(event_type = %query.event_type, auto = query.auto_sync))]
pub async fn sync_members(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SyncQuery>,
) -> Result<Json<SyncResponse>, ApiError> {
    let selection: EventSelection = query.event_type.parse()?;

    if query.auto_sync {
        if query.max_iterations == 0 || query.max_iterations > MAX_ITERATIONS_LIMIT {
            return Err(ApiError::BadRequest(format!(
                "maxIterations must be between 1 and {MAX_ITERATIONS_LIMIT}"
            )));
        }

        let report = auto_sync(
            &state.syncer,
            selection,
            query.max_iterations,
            state.auto_sync_pause,
        )
        .await;

        info!(
            iterations = report.iterations.len(),
            completed = report.completed,
            records = report.total_records_synced,
            "Auto-sync request finished"
        );

        return Ok(Json(SyncResponse {
            success: report.failed.is_empty(),
            event_type: query.event_type,
            results: None,
            auto_sync: Some(AutoSyncReportInfo::from(&report)),
            timestamp: chrono::Utc::now(),
        }));
    }

    let outcomes = state
        .syncer
        .sync_selection(selection)
        .await
        .map_err(sync_error)?;

    let results: Vec<SyncResultInfo> = outcomes.iter().map(SyncResultInfo::from).collect();

    Ok(Json(SyncResponse {
        success: outcomes.iter().all(|o| o.success()),
        event_type: query.event_type,
        results: Some(results),
        auto_sync: None,
        timestamp: chrono::Utc::now(),
    }))
}

fn sync_error(err: IndexerError) -> ApiError {
    match err {
        IndexerError::CursorConflict { .. } | IndexerError::ValidationError { .. } => err.into(),
        other => ApiError::SyncFailed(other.to_string()),
    }
}
