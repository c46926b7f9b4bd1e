//! Auto-sync: repeat sync-forward steps until every selected type catches up.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::engine::{MemberSyncer, SyncOutcome};
use crate::events::{EventSelection, EventType};

/// Result of one event type within an iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStep {
    /// Event type attempted
    pub event_type: EventType,
    /// Outcome when the step ran to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SyncOutcome>,
    /// Error message when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncStep {
    fn made_progress(&self) -> bool {
        self.outcome.as_ref().is_some_and(SyncOutcome::made_progress)
    }
}

/// Steps run during one pass over the pending event types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIteration {
    /// 1-based iteration number
    pub iteration: u32,
    /// One step per pending event type
    pub steps: Vec<SyncStep>,
}

/// Why the driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every selected type caught up or failed
    AllComplete,
    /// An iteration moved no cursor and wrote nothing
    NoProgress,
    /// `max_iterations` ran out
    IterationBudget,
}

impl StopReason {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllComplete => "all_complete",
            Self::NoProgress => "no_progress",
            Self::IterationBudget => "iteration_budget",
        }
    }
}

/// Everything an auto-sync run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoSyncReport {
    /// Per-iteration results, in order
    pub iterations: Vec<SyncIteration>,
    /// True when every selected type finished within the budget
    pub completed: bool,
    /// Why the loop ended
    pub stop_reason: StopReason,
    /// Member rows written across all iterations
    pub total_records_synced: u64,
    /// Event types that failed during the run
    pub failed: Vec<EventType>,
}

/// Drive [`MemberSyncer::sync_forward`] until every type in `selection` is
/// at the head, an iteration makes no progress, or `max_iterations` passes
/// have run.
///
/// A type is finished once it is caught up (see
/// [`SyncOutcome::is_caught_up`]). A type that errors is finished for this
/// run and is not retried.
#[instrument(skip(syncer), fields(contract = %syncer.contract_key()))]
pub async fn auto_sync(
    syncer: &MemberSyncer,
    selection: EventSelection,
    max_iterations: u32,
    pause: Duration,
) -> AutoSyncReport {
    let requested = selection.event_types();
    let mut complete: BTreeSet<EventType> = BTreeSet::new();
    let mut failed = Vec::new();
    let mut iterations = Vec::new();
    let mut total_records_synced = 0;
    let mut stop_reason = StopReason::IterationBudget;

    for iteration in 1..=max_iterations {
        if iteration > 1 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        let pending: Vec<EventType> = requested
            .iter()
            .copied()
            .filter(|t| !complete.contains(t))
            .collect();

        let mut steps = Vec::new();
        for event_type in pending {
            let step = match syncer.sync_forward(event_type).await {
                Ok(outcome) => {
                    if outcome.is_caught_up() {
                        complete.insert(event_type);
                    }
                    total_records_synced += outcome.records_synced;
                    SyncStep {
                        event_type,
                        outcome: Some(outcome),
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(%event_type, error = %e, "Sync step failed, not retrying this run");
                    complete.insert(event_type);
                    failed.push(event_type);
                    SyncStep {
                        event_type,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            steps.push(step);
        }

        let progressed = steps.iter().any(SyncStep::made_progress);
        iterations.push(SyncIteration { iteration, steps });

        if requested.iter().all(|t| complete.contains(t)) {
            stop_reason = StopReason::AllComplete;
            break;
        }
        if !progressed {
            stop_reason = StopReason::NoProgress;
            break;
        }
    }

    let completed = stop_reason == StopReason::AllComplete;
    info!(
        iterations = iterations.len(),
        completed,
        ?stop_reason,
        total_records_synced,
        "Auto-sync finished"
    );

    AutoSyncReport {
        iterations,
        completed,
        stop_reason,
        total_records_synced,
        failed,
    }
}
