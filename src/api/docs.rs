//! OpenAPI documentation for the REST API.

use utoipa::OpenApi;

use crate::api::handlers;

/// OpenAPI documentation for the REST API.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::sync::sync_members,
        handlers::cursors::list_cursors,
        handlers::members::list_members,
        handlers::members::get_member,
        handlers::members::get_referrals,
    ),
    components(schemas(
        crate::api::models::HealthResponse,
        crate::api::models::HealthStatus,
        crate::api::models::SyncResponse,
        crate::api::models::SyncResultInfo,
        crate::api::models::SyncIterationInfo,
        crate::api::models::AutoSyncReportInfo,
        crate::api::models::CursorInfo,
        crate::api::models::MemberInfo,
        crate::api::models::MembersPage,
        crate::api::models::PaginationInfo,
        crate::api::models::ReferralsResponse,
        crate::api::models::ErrorResponse,
    )),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Sync", description = "Referral event synchronization"),
        (name = "Members", description = "Mirrored referral tree"),
    ),
    info(
        title = "Referral Sync API",
        version = "1.0.0",
        description = "Mirrors on-chain referral events into a queryable member store",
    )
)]
pub struct ApiDoc;
