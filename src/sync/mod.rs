//! Resumable mirroring of referral events into the member store.
//!
//! - [`cursor`]: window planning and cursor arithmetic
//! - [`engine`]: [`MemberSyncer::sync_forward`], one window per call
//! - [`driver`]: [`auto_sync`], repeated calls until caught up

pub mod cursor;
pub mod driver;
pub mod engine;

pub use cursor::{BlockWindow, SyncCursor};
pub use driver::{auto_sync, AutoSyncReport, StopReason, SyncIteration, SyncStep};
pub use engine::{MemberSyncer, SyncOutcome, SyncOutcomeStatus};
