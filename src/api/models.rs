//! API request and response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::db::models::{MemberRecord, SyncCursorRecord};
use crate::sync::{AutoSyncReport, SyncOutcome, SyncStep};

fn unix_to_datetime(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

/// Query parameters for the member sync endpoint.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct SyncQuery {
    /// `all`, `MemberAdded` or `UplineChanged`
    #[serde(rename = "eventType", default = "default_event_type")]
    pub event_type: String,
    /// Keep syncing until caught up
    #[serde(rename = "autoSync", default)]
    pub auto_sync: bool,
    /// Iteration budget for auto-sync
    #[serde(rename = "maxIterations", default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_event_type() -> String {
    "all".to_string()
}

fn default_max_iterations() -> u32 {
    10
}

/// Result of one sync-forward step for one event type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncResultInfo {
    /// Event type name
    pub event_type: String,
    /// False when the step must be retried or failed
    pub success: bool,
    /// `synced`, `already_at_head`, `range_limited` or `error`
    pub status: String,
    /// Summary message
    pub message: String,
    /// Error detail when the step failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// First block requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<u64>,
    /// Last block requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<u64>,
    /// Events returned by the provider
    pub events_found: usize,
    /// Member rows written
    pub records_synced: u64,
    /// Cursor position after the step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_block: Option<u64>,
}

impl From<&SyncOutcome> for SyncResultInfo {
    fn from(outcome: &SyncOutcome) -> Self {
        Self {
            event_type: outcome.event_type.to_string(),
            success: outcome.success(),
            status: outcome.status.as_str().to_string(),
            message: outcome.message.clone(),
            error: None,
            from_block: Some(outcome.from_block),
            to_block: Some(outcome.to_block),
            events_found: outcome.events_found,
            records_synced: outcome.records_synced,
            last_synced_block: Some(outcome.last_synced_block),
        }
    }
}

impl From<&SyncStep> for SyncResultInfo {
    fn from(step: &SyncStep) -> Self {
        match &step.outcome {
            Some(outcome) => outcome.into(),
            None => Self {
                event_type: step.event_type.to_string(),
                success: false,
                status: "error".to_string(),
                message: "sync failed".to_string(),
                error: step.error.clone(),
                from_block: None,
                to_block: None,
                events_found: 0,
                records_synced: 0,
                last_synced_block: None,
            },
        }
    }
}

/// One auto-sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncIterationInfo {
    /// 1-based iteration number
    pub iteration: u32,
    /// Per-type results
    pub results: Vec<SyncResultInfo>,
}

/// Auto-sync summary.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AutoSyncReportInfo {
    /// Whether every requested type reached the head or finished
    pub completed: bool,
    /// `all_complete`, `no_progress` or `iteration_budget`
    pub stop_reason: String,
    /// Number of iterations run
    pub total_iterations: usize,
    /// Member rows written across the run
    pub total_records_synced: u64,
    /// Per-iteration results
    pub iterations: Vec<SyncIterationInfo>,
}

impl From<&AutoSyncReport> for AutoSyncReportInfo {
    fn from(report: &AutoSyncReport) -> Self {
        Self {
            completed: report.completed,
            stop_reason: report.stop_reason.as_str().to_string(),
            total_iterations: report.iterations.len(),
            total_records_synced: report.total_records_synced,
            iterations: report
                .iterations
                .iter()
                .map(|iteration| SyncIterationInfo {
                    iteration: iteration.iteration,
                    results: iteration.steps.iter().map(SyncResultInfo::from).collect(),
                })
                .collect(),
        }
    }
}

/// Response of the member sync endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncResponse {
    /// False if any step failed or needs a retry
    pub success: bool,
    /// Requested selection
    pub event_type: String,
    /// Single-shot results, one per event type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SyncResultInfo>>,
    /// Auto-sync report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_sync: Option<AutoSyncReportInfo>,
    /// Response time
    pub timestamp: DateTime<Utc>,
}

/// Persisted sync cursor.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CursorInfo {
    /// Event type name
    pub event_type: String,
    /// Contract whose logs are mirrored
    pub contract_address: String,
    /// Highest processed block
    pub last_synced_block: u64,
    /// Window the next step will request
    pub window_size: u64,
    /// `in_progress`, `success` or `error`
    pub status: String,
    /// Last failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Time of the last cursor write
    pub last_synced_at: DateTime<Utc>,
    /// Member rows written through this cursor
    pub total_synced: u64,
}

impl From<SyncCursorRecord> for CursorInfo {
    fn from(record: SyncCursorRecord) -> Self {
        Self {
            event_type: record.event_type,
            contract_address: record.contract_address,
            last_synced_block: record.last_synced_block.max(0) as u64,
            window_size: record.window_size.max(0) as u64,
            status: record.status,
            last_error: record.last_error,
            last_synced_at: unix_to_datetime(record.last_synced_at),
            total_synced: record.total_synced.max(0) as u64,
        }
    }
}

/// A member of the referral tree.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberInfo {
    /// Member address (lowercase)
    pub address: String,
    /// Referrer address (lowercase)
    pub referrer: String,
    /// Join time (ISO 8601)
    pub time_joined: DateTime<Utc>,
    /// Block of the event that last set the referrer
    pub last_event_block: u64,
    /// Number of direct referrals, on single-member lookups
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_count: Option<u64>,
}

impl From<MemberRecord> for MemberInfo {
    fn from(record: MemberRecord) -> Self {
        Self {
            address: record.address,
            referrer: record.referrer,
            time_joined: unix_to_datetime(record.time_joined),
            last_event_block: record.last_event_block.max(0) as u64,
            referral_count: None,
        }
    }
}

/// Direct downline of a member.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReferralsResponse {
    /// Referrer address (lowercase)
    pub referrer: String,
    /// Total direct referrals
    pub total_count: u64,
    /// Referrals, oldest first, up to `limit`
    pub referrals: Vec<MemberInfo>,
}

/// Query parameters for the referrals endpoint.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct ReferralsQuery {
    /// Maximum referrals returned (max 1000)
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

/// Paginated member list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembersPage {
    /// Members on this page
    pub data: Vec<MemberInfo>,
    /// Pagination metadata
    pub pagination: PaginationInfo,
}

/// Pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginationInfo {
    /// Current page number
    pub page: u32,
    /// Items per page
    pub page_size: u32,
    /// Total number of items
    pub total_count: u64,
    /// Whether there is another page
    pub has_next_page: bool,
}

/// Query parameters for the member list.
#[derive(Debug, Deserialize, ToSchema, IntoParams)]
pub struct MembersQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 1000)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    100
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Overall health status
    pub status: HealthStatus,
    /// Application version
    pub version: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Database status
    pub database_status: HealthStatus,
    /// Chain RPC status
    pub chain_status: HealthStatus,
    /// Chain head, when reachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_head: Option<u64>,
}

/// Health status states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All services healthy
    Healthy,
    /// Partial degradation
    Degraded,
    /// Unhealthy state
    Unhealthy,
}

/// Error response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error summary
    pub error: String,
    /// Optional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Time the error was produced
    pub timestamp: DateTime<Utc>,
}
