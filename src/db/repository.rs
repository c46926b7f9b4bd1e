//! Repository pattern for database operations.
//!
//! Provides the cursor and member operations the sync engine and the HTTP
//! API need. Cursor writes are compare-and-swap on `version`; member writes
//! are "latest event wins" by `(block, log_index)`, enforced in SQL so the
//! order batches arrive in cannot regress a referrer.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, instrument, warn};

use super::models::{CursorUpdate, MemberRecord, MemberUpsert, SyncCursorRecord, SyncStatus};
use crate::error::IndexerError;
use crate::events::EventType;

/// Repository for database operations.
///
/// Wraps a SQLite connection pool and provides type-safe methods
/// for all database interactions.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

fn db_err(message: &str) -> impl FnOnce(sqlx::Error) -> IndexerError + '_ {
    move |e| IndexerError::database(message.to_string(), Some(Box::new(e)))
}

impl Repository {
    /// Creates a new repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Simple connectivity probe.
    pub async fn health_check(&self) -> Result<(), IndexerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err("Database health check failed"))?;
        Ok(())
    }

    // ==================== CURSOR OPERATIONS ====================

    /// Loads the cursor for `(event_type, contract_address)`, creating it at
    /// `seed_block` if this is the first sync attempt for the key.
    ///
    /// Returns the cursor and whether it was created by this call.
    #[instrument(skip(self))]
    pub async fn load_or_create_cursor(
        &self,
        event_type: EventType,
        contract_address: &str,
        seed_block: u64,
        window_size: u64,
    ) -> Result<(SyncCursorRecord, bool), IndexerError> {
        let created = sqlx::query(
            r#"
            INSERT INTO sync_cursors (
                event_type, contract_address, last_synced_block, window_size,
                status, last_synced_at, total_synced, version
            )
            VALUES (?, ?, ?, ?, ?, ?, 0, 0)
            ON CONFLICT (event_type, contract_address) DO NOTHING
            "#,
        )
        .bind(event_type.as_str())
        .bind(contract_address)
        .bind(seed_block as i64)
        .bind(window_size as i64)
        .bind(SyncStatus::InProgress.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to create sync cursor"))?
        .rows_affected()
            > 0;

        if created {
            info!(%event_type, contract_address, seed_block, "Created sync cursor");
        }

        let cursor = self
            .get_cursor(event_type, contract_address)
            .await?
            .ok_or_else(|| {
                IndexerError::database(
                    format!("Sync cursor {event_type}@{contract_address} vanished after insert"),
                    None,
                )
            })?;

        Ok((cursor, created))
    }

    /// Gets the cursor for a key, or `None` if it was never synced.
    pub async fn get_cursor(
        &self,
        event_type: EventType,
        contract_address: &str,
    ) -> Result<Option<SyncCursorRecord>, IndexerError> {
        sqlx::query_as::<_, SyncCursorRecord>(
            "SELECT * FROM sync_cursors WHERE event_type = ? AND contract_address = ?",
        )
        .bind(event_type.as_str())
        .bind(contract_address)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to query sync cursor"))
    }

    /// Lists every cursor.
    pub async fn list_cursors(&self) -> Result<Vec<SyncCursorRecord>, IndexerError> {
        sqlx::query_as::<_, SyncCursorRecord>(
            "SELECT * FROM sync_cursors ORDER BY contract_address, event_type",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list sync cursors"))
    }

    /// Applies `members` and advances the cursor in one transaction.
    ///
    /// The cursor write only succeeds if its `version` still equals
    /// `update.expected_version`; otherwise the whole transaction is rolled
    /// back and [`IndexerError::CursorConflict`] is returned. On success the
    /// cursor's `total_synced` grows by the number of member rows written,
    /// which is also the return value.
    #[instrument(
        skip(self, update, members),
        fields(
            event_type = %update.event_type,
            last_synced_block = update.last_synced_block,
            members = members.len(),
            duration_ms = tracing::field::Empty
        )
    )]
    pub async fn commit_sync(
        &self,
        update: &CursorUpdate,
        members: &[MemberUpsert],
    ) -> Result<u64, IndexerError> {
        let start = std::time::Instant::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to start transaction"))?;

        let mut written = 0;
        for member in members {
            written += upsert_member(&mut tx, member).await?;
        }

        let result = sqlx::query(
            r#"
            UPDATE sync_cursors SET
                last_synced_block = ?,
                window_size = ?,
                status = ?,
                last_error = ?,
                last_synced_at = ?,
                total_synced = total_synced + ?,
                version = version + 1
            WHERE event_type = ? AND contract_address = ? AND version = ?
            "#,
        )
        .bind(update.last_synced_block as i64)
        .bind(update.window_size as i64)
        .bind(update.status.as_str())
        .bind(&update.last_error)
        .bind(chrono::Utc::now().timestamp())
        .bind(written as i64)
        .bind(update.event_type.as_str())
        .bind(&update.contract_address)
        .bind(update.expected_version)
        .execute(&mut *tx)
        .await
        .map_err(db_err("Failed to advance sync cursor"))?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(db_err("Failed to roll back transaction"))?;
            warn!(
                event_type = %update.event_type,
                contract_address = %update.contract_address,
                expected_version = update.expected_version,
                "Cursor moved underneath this run, discarding batch"
            );
            return Err(IndexerError::cursor_conflict(
                update.event_type.as_str(),
                update.contract_address.clone(),
                update.expected_version,
            ));
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        let duration = start.elapsed();
        tracing::Span::current().record("duration_ms", duration.as_millis() as u64);
        debug!(written, "Sync batch committed");

        Ok(written)
    }

    /// Compare-and-swap cursor write with no member changes.
    pub async fn update_cursor(&self, update: &CursorUpdate) -> Result<(), IndexerError> {
        self.commit_sync(update, &[]).await.map(|_| ())
    }

    /// Marks a cursor as failed without moving its block pointer.
    ///
    /// Not version-checked: recording a failure must not itself fail
    /// because another run advanced the cursor meanwhile.
    pub async fn mark_cursor_error(
        &self,
        event_type: EventType,
        contract_address: &str,
        message: &str,
    ) -> Result<(), IndexerError> {
        sqlx::query(
            r#"
            UPDATE sync_cursors SET
                status = ?,
                last_error = ?,
                last_synced_at = ?,
                version = version + 1
            WHERE event_type = ? AND contract_address = ?
            "#,
        )
        .bind(SyncStatus::Error.as_str())
        .bind(message)
        .bind(chrono::Utc::now().timestamp())
        .bind(event_type.as_str())
        .bind(contract_address)
        .execute(&self.pool)
        .await
        .map_err(db_err("Failed to mark sync cursor as failed"))?;

        Ok(())
    }

    // ==================== MEMBER OPERATIONS ====================

    /// Applies member writes in one transaction, outside any cursor.
    ///
    /// Returns the number of rows written.
    pub async fn upsert_members(&self, members: &[MemberUpsert]) -> Result<u64, IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to start transaction"))?;

        let mut written = 0;
        for member in members {
            written += upsert_member(&mut tx, member).await?;
        }

        tx.commit()
            .await
            .map_err(db_err("Failed to commit transaction"))?;

        Ok(written)
    }

    /// Gets a member by (normalized) address.
    pub async fn get_member(&self, address: &str) -> Result<Option<MemberRecord>, IndexerError> {
        sqlx::query_as::<_, MemberRecord>("SELECT * FROM members WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to query member"))
    }

    /// Lists members ordered by join time, newest first.
    pub async fn list_members(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MemberRecord>, IndexerError> {
        sqlx::query_as::<_, MemberRecord>(
            "SELECT * FROM members ORDER BY time_joined DESC, address ASC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list members"))
    }

    /// Total number of members.
    pub async fn count_members(&self) -> Result<i64, IndexerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count members"))?;
        Ok(count)
    }

    /// Direct downline of `referrer`, oldest first.
    pub async fn get_referrals(
        &self,
        referrer: &str,
        limit: i64,
    ) -> Result<Vec<MemberRecord>, IndexerError> {
        sqlx::query_as::<_, MemberRecord>(
            "SELECT * FROM members WHERE referrer = ? ORDER BY time_joined ASC, address ASC LIMIT ?",
        )
        .bind(referrer)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to query referrals"))
    }

    /// Number of members directly referred by `referrer`.
    pub async fn count_referrals(&self, referrer: &str) -> Result<i64, IndexerError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members WHERE referrer = ?")
            .bind(referrer)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err("Failed to count referrals"))?;
        Ok(count)
    }
}

/// Upsert one member inside `tx`.
///
/// The referrer only moves forward in chain order. The join time is taken
/// from `MemberAdded` whenever one is seen, and otherwise from the first
/// event that created the row.
async fn upsert_member(
    tx: &mut Transaction<'_, Sqlite>,
    member: &MemberUpsert,
) -> Result<u64, IndexerError> {
    let now = chrono::Utc::now().timestamp();

    let result = sqlx::query(
        r#"
        INSERT INTO members (
            address, referrer, time_joined, last_event_block,
            last_event_log_index, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (address) DO UPDATE SET
            referrer = CASE
                WHEN (excluded.last_event_block, excluded.last_event_log_index)
                    >= (members.last_event_block, members.last_event_log_index)
                THEN excluded.referrer ELSE members.referrer END,
            last_event_log_index = CASE
                WHEN (excluded.last_event_block, excluded.last_event_log_index)
                    >= (members.last_event_block, members.last_event_log_index)
                THEN excluded.last_event_log_index ELSE members.last_event_log_index END,
            last_event_block = MAX(excluded.last_event_block, members.last_event_block),
            time_joined = CASE WHEN ? THEN excluded.time_joined ELSE members.time_joined END,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&member.address)
    .bind(&member.referrer)
    .bind(member.timestamp as i64)
    .bind(member.block_number as i64)
    .bind(member.log_index as i64)
    .bind(now)
    .bind(now)
    .bind(member.sets_join_time)
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        IndexerError::database(
            format!(
                "Failed to upsert member {} at block {}",
                member.address, member.block_number
            ),
            Some(Box::new(e)),
        )
    })?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use tempfile::TempDir;

    const CONTRACT: &str = "0x00000000000000000000000000000000000000ab";
    const ALICE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const BOB: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const CAROL: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    async fn setup_test_db() -> (Repository, TempDir) {
        let (pool, dir) = temp_pool().await;
        (Repository::new(pool), dir)
    }

    fn upsert(address: &str, referrer: &str, block: u64, log_index: u64, joined: bool) -> MemberUpsert {
        MemberUpsert {
            address: address.to_string(),
            referrer: referrer.to_string(),
            timestamp: 1_000 + block,
            block_number: block,
            log_index,
            sets_join_time: joined,
        }
    }

    fn update_for(cursor: &SyncCursorRecord, block: u64) -> CursorUpdate {
        CursorUpdate {
            event_type: EventType::MemberAdded,
            contract_address: CONTRACT.to_string(),
            expected_version: cursor.version,
            last_synced_block: block,
            window_size: 100,
            status: SyncStatus::Success,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_load_or_create_cursor_seeds_once() {
        let (repo, _dir) = setup_test_db().await;

        let (cursor, created) = repo
            .load_or_create_cursor(EventType::MemberAdded, CONTRACT, 100, 1000)
            .await
            .expect("Failed to create cursor");
        assert!(created);
        assert_eq!(cursor.last_synced_block, 100);
        assert_eq!(cursor.window_size, 1000);
        assert_eq!(cursor.status().ok(), Some(SyncStatus::InProgress));

        // A second call must not re-seed
        let (again, created) = repo
            .load_or_create_cursor(EventType::MemberAdded, CONTRACT, 5, 1000)
            .await
            .expect("Failed to load cursor");
        assert!(!created);
        assert_eq!(again.id, cursor.id);
        assert_eq!(again.last_synced_block, 100);

        // Event types are keyed separately
        let (other, created) = repo
            .load_or_create_cursor(EventType::UplineChanged, CONTRACT, 7, 1000)
            .await
            .expect("Failed to create cursor");
        assert!(created);
        assert_eq!(other.last_synced_block, 7);
        assert_eq!(repo.list_cursors().await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn test_commit_sync_advances_and_counts() {
        let (repo, _dir) = setup_test_db().await;
        let (cursor, _) = repo
            .load_or_create_cursor(EventType::MemberAdded, CONTRACT, 100, 1000)
            .await
            .unwrap();

        let written = repo
            .commit_sync(
                &update_for(&cursor, 205),
                &[upsert(ALICE, BOB, 150, 0, true), upsert(BOB, CAROL, 205, 1, true)],
            )
            .await
            .expect("Failed to commit");
        assert_eq!(written, 2);

        let cursor = repo
            .get_cursor(EventType::MemberAdded, CONTRACT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_synced_block, 205);
        assert_eq!(cursor.total_synced, 2);
        assert_eq!(cursor.version, 1);
        assert_eq!(cursor.status().ok(), Some(SyncStatus::Success));
        assert_eq!(repo.count_members().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_commit_sync_rejects_stale_version() {
        let (repo, _dir) = setup_test_db().await;
        let (stale, _) = repo
            .load_or_create_cursor(EventType::MemberAdded, CONTRACT, 100, 1000)
            .await
            .unwrap();

        repo.commit_sync(&update_for(&stale, 150), &[])
            .await
            .expect("First writer wins");

        let result = repo
            .commit_sync(&update_for(&stale, 300), &[upsert(ALICE, BOB, 250, 0, true)])
            .await;
        assert!(matches!(result, Err(IndexerError::CursorConflict { .. })));

        // Nothing from the losing run is visible
        let cursor = repo
            .get_cursor(EventType::MemberAdded, CONTRACT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_synced_block, 150);
        assert!(repo.get_member(ALICE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_member_referrer_latest_event_wins() {
        let (repo, _dir) = setup_test_db().await;

        repo.upsert_members(&[upsert(ALICE, BOB, 200, 0, true)])
            .await
            .unwrap();
        // Re-parent at a later block
        repo.upsert_members(&[upsert(ALICE, CAROL, 300, 2, false)])
            .await
            .unwrap();
        // A stale event replayed afterwards must not win
        repo.upsert_members(&[upsert(ALICE, BOB, 250, 5, false)])
            .await
            .unwrap();

        let member = repo.get_member(ALICE).await.unwrap().unwrap();
        assert_eq!(member.referrer, CAROL);
        assert_eq!(member.last_event_block, 300);
        assert_eq!(member.last_event_log_index, 2);
        assert_eq!(member.time_joined, 1_200);
    }

    #[tokio::test]
    async fn test_member_added_sets_join_time_even_when_older() {
        let (repo, _dir) = setup_test_db().await;

        // UplineChanged observed before the member's MemberAdded
        repo.upsert_members(&[upsert(ALICE, CAROL, 300, 0, false)])
            .await
            .unwrap();
        repo.upsert_members(&[upsert(ALICE, BOB, 200, 0, true)])
            .await
            .unwrap();

        let member = repo.get_member(ALICE).await.unwrap().unwrap();
        assert_eq!(member.referrer, CAROL, "older MemberAdded must not override");
        assert_eq!(member.time_joined, 1_200, "join time comes from MemberAdded");
    }

    #[tokio::test]
    async fn test_referrals_and_pagination() {
        let (repo, _dir) = setup_test_db().await;

        repo.upsert_members(&[
            upsert(ALICE, CAROL, 10, 0, true),
            upsert(BOB, CAROL, 20, 0, true),
            upsert(CAROL, ALICE, 5, 0, true),
        ])
        .await
        .unwrap();

        let downline = repo.get_referrals(CAROL, 10).await.unwrap();
        let addresses: Vec<_> = downline.iter().map(|m| m.address.as_str()).collect();
        assert_eq!(addresses, vec![ALICE, BOB]);
        assert_eq!(repo.count_referrals(CAROL).await.unwrap(), 2);

        let first_page = repo.list_members(2, 0).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert_eq!(first_page[0].address, BOB);
        let second_page = repo.list_members(2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].address, CAROL);
    }

    #[tokio::test]
    async fn test_mark_cursor_error_keeps_block() {
        let (repo, _dir) = setup_test_db().await;
        repo.load_or_create_cursor(EventType::UplineChanged, CONTRACT, 42, 1000)
            .await
            .unwrap();

        repo.mark_cursor_error(EventType::UplineChanged, CONTRACT, "connection refused")
            .await
            .unwrap();

        let cursor = repo
            .get_cursor(EventType::UplineChanged, CONTRACT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cursor.last_synced_block, 42);
        assert_eq!(cursor.status().ok(), Some(SyncStatus::Error));
        assert_eq!(cursor.last_error.as_deref(), Some("connection refused"));
        assert_eq!(cursor.version, 1);
    }
}
