//! Shared application state for the API server.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::db::repository::Repository;
use crate::sync::MemberSyncer;

/// Shared application state for API handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Repository for database access.
    pub repository: Arc<Repository>,
    /// Syncer driven by the sync endpoint.
    pub syncer: Arc<MemberSyncer>,
    /// Application start time for uptime tracking.
    pub start_time: SystemTime,
    /// Pause between auto-sync iterations.
    pub auto_sync_pause: Duration,
}

impl AppState {
    /// Create a new AppState instance sharing the syncer's repository.
    pub fn new(syncer: MemberSyncer, auto_sync_pause: Duration) -> Self {
        Self {
            repository: Arc::clone(syncer.repository()),
            syncer: Arc::new(syncer),
            start_time: SystemTime::now(),
            auto_sync_pause,
        }
    }
}
