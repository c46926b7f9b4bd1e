//! Sync-forward behavior against a scripted chain and a real SQLite store.

mod common;

use async_trait::async_trait;
use common::*;
use referral_sync::config::SyncSettings;
use referral_sync::db::models::CursorUpdate;
use referral_sync::db::Repository;
use referral_sync::error::{IndexerError, IndexerResult};
use referral_sync::events::{DecodedEvent, EventType};
use referral_sync::rpc::ChainClient;
use referral_sync::sync::{MemberSyncer, SyncOutcomeStatus};
use alloy::primitives::Address;
use std::sync::Arc;

async fn cursor_block(syncer: &MemberSyncer, event_type: EventType) -> i64 {
    syncer
        .repository()
        .get_cursor(event_type, syncer.contract_key())
        .await
        .unwrap()
        .map(|c| c.last_synced_block)
        .unwrap()
}

#[tokio::test]
async fn walks_to_head_and_holds_reorg_margin() {
    let chain = Arc::new(ScriptedChain::new(250));
    let (syncer, _dir) = syncer_with(chain.clone(), test_settings()).await;

    let first = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!(first.status, SyncOutcomeStatus::Synced);
    assert_eq!((first.from_block, first.to_block), (101, 201));
    assert_eq!(first.last_synced_block, 191);

    let second = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!((second.from_block, second.to_block), (192, 250));
    assert_eq!(second.last_synced_block, 240);

    let third = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!((third.from_block, third.to_block), (241, 250));
    assert_eq!(third.last_synced_block, 240);
    assert!(!third.made_progress());

    assert_eq!(cursor_block(&syncer, EventType::MemberAdded).await, 240);
    assert_eq!(
        chain.requests(),
        vec![
            (EventType::MemberAdded, 101, 201),
            (EventType::MemberAdded, 192, 250),
            (EventType::MemberAdded, 241, 250),
        ]
    );
}

#[tokio::test]
async fn event_block_becomes_cursor() {
    let chain = Arc::new(ScriptedChain::new(250).with_member_added(ALICE, BOB, 205, 3));
    let (syncer, _dir) = syncer_with(chain, test_settings()).await;

    syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    let outcome = syncer.sync_forward(EventType::MemberAdded).await.unwrap();

    assert_eq!((outcome.from_block, outcome.to_block), (192, 250));
    assert_eq!(outcome.events_found, 1);
    assert_eq!(outcome.records_synced, 1);
    assert_eq!(outcome.last_synced_block, 205);

    let member = syncer.repository().get_member(&key(&ALICE)).await.unwrap().unwrap();
    assert_eq!(member.referrer, key(&BOB));
    assert_eq!(
        member.time_joined as u64,
        test_settings().clock.estimate_timestamp(205)
    );

    // The event block is not requested again
    let next = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!(next.from_block, 206);
    assert_eq!(next.records_synced, 0);
}

#[tokio::test]
async fn upline_changed_sets_new_referrer() {
    let chain = Arc::new(
        ScriptedChain::new(10_000)
            .with_member_added(ALICE, BOB, 120, 0)
            .with_upline_changed(ALICE, BOB, CAROL, 150, 0),
    );
    let (syncer, _dir) = syncer_with(chain, test_settings()).await;

    syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    syncer.sync_forward(EventType::UplineChanged).await.unwrap();

    let member = syncer.repository().get_member(&key(&ALICE)).await.unwrap().unwrap();
    assert_eq!(member.referrer, key(&CAROL));
    assert_eq!(
        member.time_joined as u64,
        test_settings().clock.estimate_timestamp(120)
    );
}

#[tokio::test]
async fn cursor_never_decreases() {
    let chain = Arc::new(
        ScriptedChain::new(180)
            .with_member_added(ALICE, BOB, 150, 0)
            .with_member_added(CAROL, BOB, 420, 1)
            .with_member_added(DAVE, CAROL, 421, 0),
    );
    let (syncer, _dir) = syncer_with(chain.clone(), test_settings()).await;

    // Head moves forward, briefly backwards (shallow reorg), then on again
    let heads = [180, 185, 260, 240, 240, 430, 425, 600, 600, 601];
    let mut previous = 100;
    for head in heads {
        chain.set_head(head);
        let outcome = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
        let stored = cursor_block(&syncer, EventType::MemberAdded).await;

        assert!(outcome.last_synced_block >= previous, "head {head}");
        assert_eq!(stored as u64, outcome.last_synced_block);
        previous = outcome.last_synced_block;
    }

    assert_eq!(syncer.repository().count_members().await.unwrap(), 3);
}

#[tokio::test]
async fn second_call_at_head_is_a_no_op() {
    let chain = Arc::new(ScriptedChain::new(180).with_member_added(ALICE, BOB, 170, 0));
    let settings = SyncSettings {
        reorg_margin: 0,
        ..test_settings()
    };
    let (syncer, _dir) = syncer_with(chain.clone(), settings).await;

    let first = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!(first.records_synced, 1);
    // Only the event block is confirmed; finish the window
    let second = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!(second.last_synced_block, 180);

    let before = syncer
        .repository()
        .get_cursor(EventType::MemberAdded, syncer.contract_key())
        .await
        .unwrap()
        .unwrap();

    let third = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
    assert_eq!(third.status, SyncOutcomeStatus::AlreadyAtHead);
    assert_eq!(third.records_synced, 0);

    let after = syncer
        .repository()
        .get_cursor(EventType::MemberAdded, syncer.contract_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.last_synced_block, before.last_synced_block);
    assert_eq!(after.version, before.version);
    assert_eq!(after.total_synced, 1);
    assert_eq!(chain.requests().len(), 2);
}

#[tokio::test]
async fn range_limit_shrinks_until_accepted() {
    let chain = Arc::new(ScriptedChain::new(100_000).with_range_limit_at(30));
    let (syncer, _dir) = syncer_with(chain.clone(), test_settings()).await;

    let mut windows = Vec::new();
    let mut accepted = None;
    for attempt in 0..10 {
        let outcome = syncer.sync_forward(EventType::UplineChanged).await.unwrap();
        if outcome.status == SyncOutcomeStatus::Synced {
            accepted = Some((attempt, outcome.to_block - outcome.from_block));
            break;
        }
        assert_eq!(outcome.status, SyncOutcomeStatus::RangeLimited);
        assert!(!outcome.success());
        windows.push(outcome.window_size);
    }

    assert_eq!(windows, vec![50, 25]);
    assert_eq!(accepted, Some((2, 25)));

    let cursor = syncer
        .repository()
        .get_cursor(EventType::UplineChanged, syncer.contract_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cursor.status, "success");
    assert!(cursor.last_error.is_none());
    // The accepted window grows again for the next call
    assert_eq!(cursor.window_size, 50);
}

#[tokio::test]
async fn range_limit_respects_minimum_window() {
    let chain = Arc::new(ScriptedChain::new(100_000).with_range_limit_at(1));
    let (syncer, _dir) = syncer_with(chain, test_settings()).await;

    let mut last = 0;
    for _ in 0..6 {
        let outcome = syncer.sync_forward(EventType::MemberAdded).await.unwrap();
        assert_eq!(outcome.status, SyncOutcomeStatus::RangeLimited);
        assert!(outcome.window_size >= 10);
        assert!(outcome.last_synced_block > last);
        last = outcome.last_synced_block;
    }
}

#[tokio::test]
async fn batch_is_applied_in_chain_order() {
    let chain = Arc::new(
        ScriptedChain::new(10_000)
            .with_upline_changed(ALICE, DAVE, BOB, 150, 4)
            .with_upline_changed(ALICE, BOB, CAROL, 180, 0)
            .with_upline_changed(ALICE, BOB, DAVE, 150, 2)
            .with_reversed_logs(),
    );
    let (syncer, _dir) = syncer_with(chain, test_settings()).await;

    let outcome = syncer.sync_forward(EventType::UplineChanged).await.unwrap();
    assert_eq!(outcome.events_found, 3);

    let member = syncer.repository().get_member(&key(&ALICE)).await.unwrap().unwrap();
    assert_eq!(member.referrer, key(&CAROL));
    assert_eq!(member.last_event_block, 180);
}

#[tokio::test]
async fn provider_failure_marks_cursor_and_propagates() {
    let chain = Arc::new(
        ScriptedChain::new(10_000).with_failure(EventType::MemberAdded, "connection reset by peer"),
    );
    let (syncer, _dir) = syncer_with(chain, test_settings()).await;

    let err = syncer.sync_forward(EventType::MemberAdded).await.unwrap_err();
    assert!(matches!(err, IndexerError::RpcError { .. }));

    let cursor = syncer
        .repository()
        .get_cursor(EventType::MemberAdded, syncer.contract_key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cursor.status, "error");
    assert_eq!(cursor.last_synced_block, 100);
    assert!(cursor
        .last_error
        .unwrap_or_default()
        .contains("connection reset by peer"));
}

#[tokio::test]
async fn chain_timestamps_used_when_enabled() {
    let chain = Arc::new(
        ScriptedChain::new(10_000)
            .with_member_added(ALICE, BOB, 150, 0)
            .with_member_added(CAROL, BOB, 160, 0)
            .with_block_timestamp(150, 1_700_000_000),
    );
    let settings = SyncSettings {
        use_chain_timestamps: true,
        ..test_settings()
    };
    let (syncer, _dir) = syncer_with(chain, settings.clone()).await;

    syncer.sync_forward(EventType::MemberAdded).await.unwrap();

    let alice = syncer.repository().get_member(&key(&ALICE)).await.unwrap().unwrap();
    assert_eq!(alice.time_joined, 1_700_000_000);

    // Block 160 has no chain timestamp, so it falls back to the estimate
    let carol = syncer.repository().get_member(&key(&CAROL)).await.unwrap().unwrap();
    assert_eq!(carol.time_joined as u64, settings.clock.estimate_timestamp(160));
}

/// Chain that advances the cursor behind the syncer's back while serving logs.
struct RacingChain {
    inner: ScriptedChain,
    repository: Arc<Repository>,
    contract_key: String,
}

#[async_trait]
impl ChainClient for RacingChain {
    async fn current_block_number(&self) -> IndexerResult<u64> {
        self.inner.current_block_number().await
    }

    async fn get_events(
        &self,
        contract: Address,
        event_type: EventType,
        from_block: u64,
        to_block: u64,
    ) -> IndexerResult<Vec<DecodedEvent>> {
        let cursor = self
            .repository
            .get_cursor(event_type, &self.contract_key)
            .await?
            .expect("cursor exists once a fetch starts");
        self.repository
            .update_cursor(&CursorUpdate {
                event_type,
                contract_address: self.contract_key.clone(),
                expected_version: cursor.version,
                last_synced_block: to_block,
                window_size: cursor.window_size as u64,
                status: referral_sync::db::models::SyncStatus::Success,
                last_error: None,
            })
            .await?;

        self.inner
            .get_events(contract, event_type, from_block, to_block)
            .await
    }

    async fn block_timestamp(&self, block_number: u64) -> IndexerResult<Option<u64>> {
        self.inner.block_timestamp(block_number).await
    }
}

#[tokio::test]
async fn concurrent_advance_is_rejected() {
    let (repository, _dir) = temp_repository().await;
    let chain = Arc::new(RacingChain {
        inner: ScriptedChain::new(10_000).with_member_added(ALICE, BOB, 150, 0),
        repository: Arc::clone(&repository),
        contract_key: key(&CONTRACT),
    });
    let syncer = MemberSyncer::new(chain, Arc::clone(&repository), CONTRACT, test_settings());

    let err = syncer.sync_forward(EventType::MemberAdded).await.unwrap_err();
    assert!(matches!(err, IndexerError::CursorConflict { .. }));

    // The racing write stands and the losing batch left nothing behind
    let cursor = repository
        .get_cursor(EventType::MemberAdded, &key(&CONTRACT))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cursor.last_synced_block, 201);
    assert_eq!(cursor.version, 1);
    assert!(repository.get_member(&key(&ALICE)).await.unwrap().is_none());
}
