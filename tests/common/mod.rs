//! Shared fixtures: a scripted chain and throwaway SQLite stores.

#![allow(dead_code)]

use alloy::primitives::{address, Address};
use async_trait::async_trait;
use referral_sync::config::SyncSettings;
use referral_sync::db::{create_pool, Repository};
use referral_sync::error::{IndexerError, IndexerResult};
use referral_sync::events::{DecodedEvent, EventType, MemberEvent};
use referral_sync::rpc::ChainClient;
use referral_sync::sync::MemberSyncer;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const CONTRACT: Address = address!("0000000000000000000000000000000000000abc");
pub const ALICE: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
pub const BOB: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
pub const CAROL: Address = address!("cccccccccccccccccccccccccccccccccccccccc");
pub const DAVE: Address = address!("dddddddddddddddddddddddddddddddddddddddd");

/// In-process chain with a fixed event log and scripted failures.
#[derive(Default)]
pub struct ScriptedChain {
    head: AtomicU64,
    events: Vec<DecodedEvent>,
    range_limit_at: Option<u64>,
    failures: HashMap<EventType, String>,
    timestamps: HashMap<u64, u64>,
    reverse_order: bool,
    requests: Mutex<Vec<(EventType, u64, u64)>>,
}

impl ScriptedChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            ..Self::default()
        }
    }

    pub fn with_member_added(mut self, member: Address, upline: Address, block: u64, log_index: u64) -> Self {
        self.events.push(DecodedEvent {
            event: MemberEvent::Added { member, upline },
            block_number: block,
            log_index,
        });
        self
    }

    pub fn with_upline_changed(
        mut self,
        member: Address,
        old_upline: Address,
        new_upline: Address,
        block: u64,
        log_index: u64,
    ) -> Self {
        self.events.push(DecodedEvent {
            event: MemberEvent::UplineChanged {
                member,
                old_upline,
                new_upline,
            },
            block_number: block,
            log_index,
        });
        self
    }

    /// Refuse any window spanning `blocks` or more.
    pub fn with_range_limit_at(mut self, blocks: u64) -> Self {
        self.range_limit_at = Some(blocks);
        self
    }

    /// Fail every log query for `event_type` with a non-range error.
    pub fn with_failure(mut self, event_type: EventType, message: &str) -> Self {
        self.failures.insert(event_type, message.to_string());
        self
    }

    pub fn with_block_timestamp(mut self, block: u64, timestamp: u64) -> Self {
        self.timestamps.insert(block, timestamp);
        self
    }

    /// Return matching logs newest first.
    pub fn with_reversed_logs(mut self) -> Self {
        self.reverse_order = true;
        self
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Every `(event_type, from, to)` log query seen so far.
    pub fn requests(&self) -> Vec<(EventType, u64, u64)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn current_block_number(&self) -> IndexerResult<u64> {
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_events(
        &self,
        _contract: Address,
        event_type: EventType,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<DecodedEvent>> {
        self.requests
            .lock()
            .unwrap()
            .push((event_type, from_block, to_block));

        if let Some(message) = self.failures.get(&event_type) {
            return Err(IndexerError::rpc(message.clone(), None));
        }
        if let Some(limit) = self.range_limit_at {
            if to_block - from_block >= limit {
                return Err(IndexerError::range_limit(
                    "query returned more than 10000 results",
                ));
            }
        }

        let mut events: Vec<DecodedEvent> = self
            .events
            .iter()
            .filter(|e| e.event.event_type() == event_type)
            .filter(|e| (from_block..=to_block).contains(&e.block_number))
            .copied()
            .collect();
        if self.reverse_order {
            events.reverse();
        }
        Ok(events)
    }

    async fn block_timestamp(&self, block_number: u64) -> IndexerResult<Option<u64>> {
        Ok(self.timestamps.get(&block_number).copied())
    }
}

/// Settings for the small-number scenarios: start 100, window 100..10, margin 10.
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        max_window: 100,
        min_window: 10,
        reorg_margin: 10,
        member_added_start_block: 100,
        upline_changed_start_block: 100,
        ..SyncSettings::default()
    }
}

/// Repository on a fresh file database; keep the `TempDir` alive.
pub async fn temp_repository() -> (Arc<Repository>, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite://{}", dir.path().join("sync.db").display());
    let pool = create_pool(&url).await.expect("Failed to create pool");
    (Arc::new(Repository::new(pool)), dir)
}

pub async fn syncer_with(
    chain: Arc<dyn ChainClient>,
    settings: SyncSettings,
) -> (MemberSyncer, TempDir) {
    let (repository, dir) = temp_repository().await;
    (MemberSyncer::new(chain, repository, CONTRACT, settings), dir)
}

pub fn key(address: &Address) -> String {
    referral_sync::events::normalize_address(address)
}
