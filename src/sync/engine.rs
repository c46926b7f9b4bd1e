//! The sync-forward step: one bounded window of logs into the member store.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::cursor::{
    clamp_window, grow_window, next_cursor_block, plan_window, range_limited_block, shrink_window,
    BlockWindow, SyncCursor,
};
use crate::config::SyncSettings;
use crate::db::models::{CursorUpdate, MemberUpsert, SyncStatus};
use crate::db::Repository;
use crate::error::{IndexerError, IndexerResult};
use crate::events::{normalize_address, sort_by_position, DecodedEvent, EventSelection, EventType};
use crate::rpc::ChainClient;

/// How a sync-forward step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcomeStatus {
    /// A window was fetched and applied
    Synced,
    /// Nothing new to fetch
    AlreadyAtHead,
    /// The provider refused the window; call again with the narrowed one
    RangeLimited,
}

impl SyncOutcomeStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::AlreadyAtHead => "already_at_head",
            Self::RangeLimited => "range_limited",
        }
    }
}

impl fmt::Display for SyncOutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Synced => "synced",
            Self::AlreadyAtHead => "already at head",
            Self::RangeLimited => "range limited",
        })
    }
}

/// Result of one [`MemberSyncer::sync_forward`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Event type synced
    pub event_type: EventType,
    /// How the step ended
    pub status: SyncOutcomeStatus,
    /// Human-readable summary
    pub message: String,
    /// First block of the window
    pub from_block: u64,
    /// Last block of the window
    pub to_block: u64,
    /// Chain head observed at the start of the step
    pub head_block: u64,
    /// Events returned by the provider
    pub events_found: usize,
    /// Member rows written
    pub records_synced: u64,
    /// Cursor position before the step
    pub previous_block: u64,
    /// Cursor position after the step
    pub last_synced_block: u64,
    /// Window the next step will request
    pub window_size: u64,
}

impl SyncOutcome {
    /// False only when the step has to be retried.
    #[must_use]
    pub fn success(&self) -> bool {
        self.status != SyncOutcomeStatus::RangeLimited
    }

    /// Whether the cursor moved or anything was written.
    #[must_use]
    pub fn made_progress(&self) -> bool {
        self.last_synced_block > self.previous_block || self.records_synced > 0
    }

    /// Whether the cursor has nothing left to do until the head moves.
    ///
    /// With a reorg margin the cursor settles below the head, so a window
    /// that reached the head without moving it counts the same as
    /// [`SyncOutcomeStatus::AlreadyAtHead`].
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        match self.status {
            SyncOutcomeStatus::AlreadyAtHead => true,
            SyncOutcomeStatus::Synced => self.to_block >= self.head_block && !self.made_progress(),
            SyncOutcomeStatus::RangeLimited => false,
        }
    }
}

/// Mirrors referral events of one contract into the member store.
#[derive(Clone)]
pub struct MemberSyncer {
    chain: Arc<dyn ChainClient>,
    repository: Arc<Repository>,
    contract: Address,
    contract_key: String,
    settings: SyncSettings,
}

impl fmt::Debug for MemberSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberSyncer")
            .field("contract", &self.contract_key)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MemberSyncer {
    /// Create a syncer for `contract`.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        repository: Arc<Repository>,
        contract: Address,
        settings: SyncSettings,
    ) -> Self {
        Self {
            chain,
            repository,
            contract,
            contract_key: normalize_address(&contract),
            settings,
        }
    }

    /// Normalized contract address used as the cursor key.
    #[must_use]
    pub fn contract_key(&self) -> &str {
        &self.contract_key
    }

    /// Settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Store the syncer writes to.
    #[must_use]
    pub fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }

    /// Current chain head, for health reporting.
    pub async fn chain_head(&self) -> IndexerResult<u64> {
        self.chain.current_block_number().await
    }

    /// Run one sync-forward step for each selected event type, in order.
    ///
    /// Stops at the first error.
    pub async fn sync_selection(&self, selection: EventSelection) -> IndexerResult<Vec<SyncOutcome>> {
        let mut outcomes = Vec::new();
        for event_type in selection.event_types() {
            outcomes.push(self.sync_forward(event_type).await?);
        }
        Ok(outcomes)
    }

    /// Fetch the next window of `event_type` logs, apply them, and advance
    /// the cursor.
    ///
    /// # Errors
    ///
    /// Range-limit refusals are not errors; they come back as
    /// [`SyncOutcomeStatus::RangeLimited`]. Other chain failures mark the
    /// cursor as failed and are returned. A concurrent run that advanced
    /// the cursor first yields [`IndexerError::CursorConflict`].
    #[instrument(skip(self), fields(contract = %self.contract_key, from = tracing::field::Empty, to = tracing::field::Empty))]
    pub async fn sync_forward(&self, event_type: EventType) -> IndexerResult<SyncOutcome> {
        let (record, created) = self
            .repository
            .load_or_create_cursor(
                event_type,
                &self.contract_key,
                self.settings.start_block(event_type),
                self.settings.max_window,
            )
            .await?;
        let cursor = SyncCursor::try_from(&record)?;
        if created {
            info!(seed = cursor.last_synced_block, "Seeded new cursor");
        }

        let head = match self.chain.current_block_number().await {
            Ok(head) => head,
            Err(e) => return Err(self.fail(&cursor, e).await),
        };

        let window_size = clamp_window(
            cursor.window_size,
            self.settings.min_window,
            self.settings.max_window,
        );

        let Some(window) = plan_window(cursor.last_synced_block, window_size, head) else {
            debug!(head, last_synced = cursor.last_synced_block, "Already at head");
            let from_block = cursor.last_synced_block.saturating_add(1);
            return Ok(SyncOutcome {
                event_type,
                status: SyncOutcomeStatus::AlreadyAtHead,
                message: "already at head".to_string(),
                from_block,
                to_block: from_block.saturating_add(window_size).min(head),
                head_block: head,
                events_found: 0,
                records_synced: 0,
                previous_block: cursor.last_synced_block,
                last_synced_block: cursor.last_synced_block,
                window_size,
            });
        };

        let span = tracing::Span::current();
        span.record("from", window.from_block);
        span.record("to", window.to_block);

        let events = match self
            .chain
            .get_events(self.contract, event_type, window.from_block, window.to_block)
            .await
        {
            Ok(events) => events,
            Err(e) if e.is_range_limit() => {
                return self.narrow_window(&cursor, &window, head, &e).await;
            }
            Err(e) => return Err(self.fail(&cursor, e).await),
        };

        self.apply(&cursor, &window, head, events).await
    }

    /// Persist a narrowed window after the provider refused `window`.
    async fn narrow_window(
        &self,
        cursor: &SyncCursor,
        window: &BlockWindow,
        head: u64,
        error: &IndexerError,
    ) -> IndexerResult<SyncOutcome> {
        let shrunk = shrink_window(window.window_size, self.settings.min_window);
        let last_synced_block = range_limited_block(window, shrunk).max(cursor.last_synced_block);

        warn!(
            event_type = %cursor.event_type,
            from = window.from_block,
            to = window.to_block,
            window = window.window_size,
            shrunk,
            error = %error,
            "Provider refused block range, narrowing window"
        );

        self.repository
            .update_cursor(&CursorUpdate {
                event_type: cursor.event_type,
                contract_address: cursor.contract_address.clone(),
                expected_version: cursor.version,
                last_synced_block,
                window_size: shrunk,
                status: SyncStatus::InProgress,
                last_error: Some(error.to_string()),
            })
            .await?;

        Ok(SyncOutcome {
            event_type: cursor.event_type,
            status: SyncOutcomeStatus::RangeLimited,
            message: format!(
                "block range too large, retry with a window of {shrunk} blocks"
            ),
            from_block: window.from_block,
            to_block: window.to_block,
            head_block: head,
            events_found: 0,
            records_synced: 0,
            previous_block: cursor.last_synced_block,
            last_synced_block,
            window_size: shrunk,
        })
    }

    /// Apply fetched events and advance the cursor.
    async fn apply(
        &self,
        cursor: &SyncCursor,
        window: &BlockWindow,
        head: u64,
        mut events: Vec<DecodedEvent>,
    ) -> IndexerResult<SyncOutcome> {
        sort_by_position(&mut events);

        let mut timestamps = HashMap::new();
        let mut upserts = Vec::with_capacity(events.len());
        for event in &events {
            let timestamp = match self.timestamp_for(event.block_number, &mut timestamps).await {
                Ok(timestamp) => timestamp,
                Err(e) => return Err(self.fail(cursor, e).await),
            };
            upserts.push(MemberUpsert::from_event(event, timestamp));
        }

        let max_event_block = events.iter().map(|e| e.block_number).max();
        let last_synced_block = next_cursor_block(
            window,
            max_event_block,
            head,
            self.settings.reorg_margin,
            cursor.last_synced_block,
        );
        let window_size = grow_window(window.window_size, self.settings.max_window);

        let records_synced = self
            .repository
            .commit_sync(
                &CursorUpdate {
                    event_type: cursor.event_type,
                    contract_address: cursor.contract_address.clone(),
                    expected_version: cursor.version,
                    last_synced_block,
                    window_size,
                    status: SyncStatus::Success,
                    last_error: None,
                },
                &upserts,
            )
            .await?;

        info!(
            event_type = %cursor.event_type,
            from = window.from_block,
            to = window.to_block,
            events = events.len(),
            records_synced,
            last_synced_block,
            "Window synced"
        );

        Ok(SyncOutcome {
            event_type: cursor.event_type,
            status: SyncOutcomeStatus::Synced,
            message: format!(
                "synced {records_synced} records from blocks {}..={}",
                window.from_block, window.to_block
            ),
            from_block: window.from_block,
            to_block: window.to_block,
            head_block: head,
            events_found: events.len(),
            records_synced,
            previous_block: cursor.last_synced_block,
            last_synced_block,
            window_size,
        })
    }

    /// Timestamp for a block: the chain's when enabled and known, else the estimate.
    async fn timestamp_for(
        &self,
        block_number: u64,
        cache: &mut HashMap<u64, u64>,
    ) -> IndexerResult<u64> {
        if !self.settings.use_chain_timestamps {
            return Ok(self.settings.clock.estimate_timestamp(block_number));
        }
        if let Some(timestamp) = cache.get(&block_number) {
            return Ok(*timestamp);
        }

        let timestamp = match self.chain.block_timestamp(block_number).await? {
            Some(timestamp) => timestamp,
            None => {
                debug!(block_number, "Block timestamp unavailable, estimating");
                self.settings.clock.estimate_timestamp(block_number)
            }
        };
        cache.insert(block_number, timestamp);
        Ok(timestamp)
    }

    /// Record `error` on the cursor and hand it back for propagation.
    async fn fail(&self, cursor: &SyncCursor, error: IndexerError) -> IndexerError {
        warn!(event_type = %cursor.event_type, error = %error, "Sync step failed");
        if let Err(mark_error) = self
            .repository
            .mark_cursor_error(cursor.event_type, &cursor.contract_address, &error.to_string())
            .await
        {
            warn!(error = %mark_error, "Failed to record sync error on cursor");
        }
        error
    }
}
