//! Process-wide bookkeeping of analysis runs

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::state::{RunId, RunState, RunStatus};

/// Latest view of a run, as listed by [`RunRegistry::list_runs`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub symbol: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&RunState> for RunSummary {
    fn from(state: &RunState) -> Self {
        Self {
            run_id: state.run_id(),
            symbol: state.request().symbol().to_string(),
            status: state.status(),
            created_at: state.created_at(),
            finished_at: state.finished_at(),
        }
    }
}

struct RunEntry {
    snapshots: watch::Receiver<RunState>,
    cancel: CancellationToken,
}

/// Concurrent map of runs keyed by id
///
/// Each entry holds the receiving end of its run's snapshot channel. The
/// sending end belongs to the orchestrator driving the run, so the registry
/// only ever reads run state. Cloning the registry shares the same map.
#[derive(Clone, Default)]
pub struct RunRegistry {
    runs: Arc<DashMap<RunId, RunEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new run and hand back the sender its orchestrator publishes on
    pub fn register(&self, state: &RunState, cancel: CancellationToken) -> watch::Sender<RunState> {
        let (sender, snapshots) = watch::channel(state.clone());
        self.runs
            .insert(state.run_id(), RunEntry { snapshots, cancel });
        debug!(run_id = %state.run_id(), "Run registered");
        sender
    }

    /// Latest snapshot of a run
    pub fn get(&self, run_id: RunId) -> Option<RunState> {
        self.runs
            .get(&run_id)
            .map(|entry| entry.snapshots.borrow().clone())
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.runs.contains_key(&run_id)
    }

    /// Observe every state change of a run
    pub fn subscribe(&self, run_id: RunId) -> Option<watch::Receiver<RunState>> {
        self.runs.get(&run_id).map(|entry| entry.snapshots.clone())
    }

    /// Wait until the run reaches a terminal status
    ///
    /// If the orchestrator goes away first, the last published snapshot is
    /// returned as is.
    pub async fn wait_for_completion(&self, run_id: RunId) -> Option<RunState> {
        let mut snapshots = self.subscribe(run_id)?;
        let terminal = snapshots
            .wait_for(RunState::is_terminal)
            .await
            .map(|state| state.clone());
        Some(terminal.unwrap_or_else(|_| snapshots.borrow().clone()))
    }

    /// Signal a run to stop; returns false for unknown runs
    pub fn cancel(&self, run_id: RunId) -> bool {
        match self.runs.get(&run_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove a run and return its latest snapshot
    pub fn take(&self, run_id: RunId) -> Option<RunState> {
        self.runs
            .remove(&run_id)
            .map(|(_, entry)| entry.snapshots.borrow().clone())
    }

    /// Drop terminal runs that finished at least `max_age` ago
    ///
    /// Returns the number of runs removed. Runs still in flight are kept.
    pub fn prune_finished(&self, max_age: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let before = self.runs.len();
        self.runs.retain(|_, entry| {
            let state = entry.snapshots.borrow();
            !(state.is_terminal() && state.finished_at().is_some_and(|at| at <= cutoff))
        });
        let removed = before.saturating_sub(self.runs.len());
        if removed > 0 {
            debug!(removed, "Pruned finished runs");
        }
        removed
    }

    /// Summaries of every tracked run, oldest first
    pub fn list_runs(&self) -> Vec<RunSummary> {
        let mut runs: Vec<RunSummary> = self
            .runs
            .iter()
            .map(|entry| RunSummary::from(&*entry.snapshots.borrow()))
            .collect();
        runs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl std::fmt::Debug for RunRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRegistry")
            .field("runs", &self.runs.len())
            .finish()
    }
}
