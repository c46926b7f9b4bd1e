//! Block window planning for a sync cursor.
//!
//! Everything here is pure: given the persisted cursor, the chain head and
//! the window bounds, decide which blocks to request next and where the
//! cursor lands afterwards. The engine does the I/O.

use crate::db::models::{SyncCursorRecord, SyncStatus};
use crate::error::{IndexerError, IndexerResult};
use crate::events::EventType;

/// Typed view of a persisted cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    /// Event type being mirrored
    pub event_type: EventType,
    /// Normalized contract address
    pub contract_address: String,
    /// Highest block considered processed
    pub last_synced_block: u64,
    /// Window to request next
    pub window_size: u64,
    /// Lifecycle status after the last run
    pub status: SyncStatus,
    /// Records written through this cursor so far
    pub total_synced: u64,
    /// Optimistic concurrency version
    pub version: i64,
}

impl TryFrom<&SyncCursorRecord> for SyncCursor {
    type Error = IndexerError;

    fn try_from(record: &SyncCursorRecord) -> IndexerResult<Self> {
        let non_negative = |value: i64, column: &str| {
            u64::try_from(value).map_err(|_| {
                IndexerError::decoding(
                    format!(
                        "Cursor {}@{} has negative {column}: {value}",
                        record.event_type, record.contract_address
                    ),
                    None,
                )
            })
        };

        Ok(Self {
            event_type: record.event_type.parse()?,
            contract_address: record.contract_address.clone(),
            last_synced_block: non_negative(record.last_synced_block, "last_synced_block")?,
            window_size: non_negative(record.window_size, "window_size")?,
            status: record.status()?,
            total_synced: non_negative(record.total_synced, "total_synced")?,
            version: record.version,
        })
    }
}

/// Inclusive block range requested from the log provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    /// First block, `last_synced_block + 1`
    pub from_block: u64,
    /// Last block, never past the head
    pub to_block: u64,
    /// Window size used to compute `to_block`
    pub window_size: u64,
}

/// Plan the next window, or `None` when the cursor has caught up with `head`.
#[must_use]
pub fn plan_window(last_synced_block: u64, window_size: u64, head: u64) -> Option<BlockWindow> {
    let from_block = last_synced_block.saturating_add(1);
    let to_block = from_block.saturating_add(window_size).min(head);

    (to_block > from_block).then_some(BlockWindow {
        from_block,
        to_block,
        window_size,
    })
}

/// Keep a stored window within the configured bounds.
#[must_use]
pub fn clamp_window(window_size: u64, min_window: u64, max_window: u64) -> u64 {
    window_size.clamp(min_window, max_window.max(min_window))
}

/// Window after a range-limit refusal.
#[must_use]
pub fn shrink_window(window_size: u64, min_window: u64) -> u64 {
    (window_size / 2).max(min_window)
}

/// Window after a successful fetch.
#[must_use]
pub fn grow_window(window_size: u64, max_window: u64) -> u64 {
    window_size.saturating_mul(2).min(max_window)
}

/// Cursor position after a range-limit refusal.
///
/// The narrowed window's end is treated as processed so the next attempt
/// starts past it rather than retrying the same blocks.
#[must_use]
pub fn range_limited_block(window: &BlockWindow, shrunk_window: u64) -> u64 {
    window
        .from_block
        .saturating_add(shrunk_window)
        .min(window.to_block)
}

/// Cursor position after a successful fetch.
///
/// With events, the highest event block. Without events, `to_block`, minus
/// `reorg_margin` when the next window would already reach `head`. Never
/// lower than `previous`.
#[must_use]
pub fn next_cursor_block(
    window: &BlockWindow,
    max_event_block: Option<u64>,
    head: u64,
    reorg_margin: u64,
    previous: u64,
) -> u64 {
    let candidate = match max_event_block {
        Some(block) => block,
        None if window.to_block.saturating_add(window.window_size) >= head => {
            window.to_block.saturating_sub(reorg_margin)
        }
        None => window.to_block,
    };

    candidate.max(previous)
}
