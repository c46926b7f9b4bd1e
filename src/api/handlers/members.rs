//! Member lookup endpoints.

use axum::{
    extract::State,
    Json,
};
use tracing::{debug, instrument};

use crate::api::extractors::{ApiQuery, MemberAddress};
use crate::api::middleware::error::ApiError;
use crate::api::models::{
    MemberInfo, MembersPage, MembersQuery, PaginationInfo, ReferralsQuery, ReferralsResponse,
};
use crate::app_state::AppState;

/// Largest page or referral list a client may request.
const MAX_PAGE_SIZE: u32 = 1000;

#[utoipa::path(
    get,
    path = "/api/v1/members",
    params(MembersQuery),
    responses(
        (status = 200, description = "Members, newest first", body = MembersPage),
        (status = 400, description = "Invalid pagination")
    ),
    tag = "Members"
)]
/// Returns a page of mirrored members.
#[instrument(skip(state))]
pub async fn list_members(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MembersQuery>,
) -> Result<Json<MembersPage>, ApiError> {
    if query.page < 1 {
        return Err(ApiError::BadRequest("page must be >= 1".to_string()));
    }
    if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let offset = u64::from(query.page - 1) * u64::from(query.page_size);
    let members = state
        .repository
        .list_members(i64::from(query.page_size), offset as i64)
        .await?;
    let total_count = state.repository.count_members().await?.max(0) as u64;

    let data: Vec<MemberInfo> = members.into_iter().map(MemberInfo::from).collect();
    debug!(count = data.len(), total = total_count, "Members listed");

    Ok(Json(MembersPage {
        data,
        pagination: PaginationInfo {
            page: query.page,
            page_size: query.page_size,
            total_count,
            has_next_page: offset + u64::from(query.page_size) < total_count,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/members/{address}",
    params(
        ("address" = String, Path, description = "Member address, any casing")
    ),
    responses(
        (status = 200, description = "Member record", body = MemberInfo),
        (status = 400, description = "Invalid address"),
        (status = 404, description = "Member not found")
    ),
    tag = "Members"
)]
/// Returns one member with its direct referral count.
#[instrument(skip(state), fields(address = %address))]
pub async fn get_member(
    State(state): State<AppState>,
    MemberAddress(address): MemberAddress,
) -> Result<Json<MemberInfo>, ApiError> {
    let record = state
        .repository
        .get_member(&address)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Member {address} not found")))?;

    let referral_count = state.repository.count_referrals(&address).await?;

    let mut member = MemberInfo::from(record);
    member.referral_count = Some(referral_count.max(0) as u64);
    Ok(Json(member))
}

#[utoipa::path(
    get,
    path = "/api/v1/members/{address}/referrals",
    params(
        ("address" = String, Path, description = "Referrer address, any casing"),
        ReferralsQuery
    ),
    responses(
        (status = 200, description = "Direct referrals, oldest first", body = ReferralsResponse),
        (status = 400, description = "Invalid address or limit")
    ),
    tag = "Members"
)]
/// Returns the members directly referred by `address`.
#[instrument(skip(state), fields(address = %address))]
pub async fn get_referrals(
    State(state): State<AppState>,
    MemberAddress(address): MemberAddress,
    ApiQuery(query): ApiQuery<ReferralsQuery>,
) -> Result<Json<ReferralsResponse>, ApiError> {
    if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
        return Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let referrals = state
        .repository
        .get_referrals(&address, i64::from(query.limit))
        .await?;
    let total_count = state.repository.count_referrals(&address).await?.max(0) as u64;

    Ok(Json(ReferralsResponse {
        referrer: address,
        total_count,
        referrals: referrals.into_iter().map(MemberInfo::from).collect(),
    }))
}
