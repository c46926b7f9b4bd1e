//! Database models that map to SQL tables.
//!
//! These structures represent rows in the database and the write inputs the
//! sync cursor hands to the repository.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::IndexerError;
use crate::events::{normalize_address, DecodedEvent, EventType};

/// Lifecycle status of a sync cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Created, or a run is underway
    InProgress,
    /// Last run finished normally
    Success,
    /// Last run failed; see `last_error`
    Error,
}

impl SyncStatus {
    /// Column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(IndexerError::decoding(
                format!("Unknown sync status in database: {other}"),
                None,
            )),
        }
    }
}

/// Row of the `sync_cursors` table.
///
/// Identity is `(event_type, contract_address)`; `version` increases on
/// every write and guards against concurrent advancement.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCursorRecord {
    /// Database-assigned unique identifier
    pub id: i64,
    /// Event type name (e.g., "MemberAdded")
    pub event_type: String,
    /// Lowercase contract address whose logs are mirrored
    pub contract_address: String,
    /// Highest block considered processed
    pub last_synced_block: i64,
    /// Current fetch window in blocks
    pub window_size: i64,
    /// `in_progress`, `success` or `error`
    pub status: String,
    /// Message of the last failure, if the last run failed or shrank its window
    pub last_error: Option<String>,
    /// Unix timestamp of the last write
    pub last_synced_at: i64,
    /// Cumulative member records written through this cursor
    pub total_synced: i64,
    /// Optimistic concurrency version
    pub version: i64,
}

impl SyncCursorRecord {
    /// Parsed lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns a decoding error for values outside the known set.
    pub fn status(&self) -> Result<SyncStatus, IndexerError> {
        self.status.parse()
    }
}

/// Compare-and-swap write of a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorUpdate {
    /// Cursor event type
    pub event_type: EventType,
    /// Cursor contract address (normalized)
    pub contract_address: String,
    /// Version read before this run; the write fails if it moved
    pub expected_version: i64,
    /// New `last_synced_block`
    pub last_synced_block: u64,
    /// New `window_size`
    pub window_size: u64,
    /// New status
    pub status: SyncStatus,
    /// New `last_error`
    pub last_error: Option<String>,
}

/// Row of the `members` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberRecord {
    /// Lowercase member address
    pub address: String,
    /// Lowercase referrer address
    pub referrer: String,
    /// Unix timestamp the member joined
    pub time_joined: i64,
    /// Block of the event that last set `referrer`
    pub last_event_block: i64,
    /// Log index of that event
    pub last_event_log_index: i64,
    /// Unix timestamp when record was created
    pub created_at: i64,
    /// Unix timestamp of the last update
    pub updated_at: i64,
}

/// One member write derived from a decoded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberUpsert {
    /// Lowercase member address
    pub address: String,
    /// Lowercase referrer after the event
    pub referrer: String,
    /// Event timestamp (estimated or from the chain)
    pub timestamp: u64,
    /// Block of the event
    pub block_number: u64,
    /// Log index of the event
    pub log_index: u64,
    /// Whether the event defines the join time (`MemberAdded`)
    pub sets_join_time: bool,
}

impl MemberUpsert {
    /// Build the write for `event` observed at `timestamp`.
    #[must_use]
    pub fn from_event(event: &DecodedEvent, timestamp: u64) -> Self {
        Self {
            address: normalize_address(&event.event.member()),
            referrer: normalize_address(&event.event.referrer()),
            timestamp,
            block_number: event.block_number,
            log_index: event.log_index,
            sets_join_time: event.event.event_type() == EventType::MemberAdded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemberEvent;
    use alloy::primitives::address;

    #[test]
    fn test_status_round_trip() {
        for status in [SyncStatus::InProgress, SyncStatus::Success, SyncStatus::Error] {
            assert_eq!(status.as_str().parse::<SyncStatus>().ok(), Some(status));
        }
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_member_upsert_from_upline_changed() {
        let event = DecodedEvent {
            event: MemberEvent::UplineChanged {
                member: address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                old_upline: address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
                new_upline: address!("cccccccccccccccccccccccccccccccccccccccc"),
            },
            block_number: 205,
            log_index: 1,
        };

        let upsert = MemberUpsert::from_event(&event, 1_700_000_000);
        assert_eq!(upsert.address, "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(upsert.referrer, "0xcccccccccccccccccccccccccccccccccccccccc");
        assert!(!upsert.sets_join_time);
        assert_eq!(upsert.block_number, 205);
    }
}
