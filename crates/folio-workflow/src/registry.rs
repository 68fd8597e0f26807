//! In-memory TTL registry of workflow states.
//!
//! Running workflows never expire. When a workflow reaches a terminal status
//! its entry is given an expiry of `now + retention`; [`WorkflowRegistry::sweep`]
//! removes expired entries, so late status queries still succeed for a while.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use folio_queue::Clock;
use jiff::{SignedDuration, Timestamp};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::TRACING_TARGET_REGISTRY;
use crate::workflow::WorkflowState;

struct Entry {
    state: WorkflowState,
    cancel_token: CancellationToken,
    expires_at: Option<Timestamp>,
}

/// TTL cache of workflow states keyed by workflow id.
pub struct WorkflowRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
    retention: Duration,
    clock: Clock,
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    pub fn new(retention: Duration, clock: Clock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
            clock,
        }
    }

    /// Registers a workflow with the token that stops its run task.
    pub fn insert(&self, state: WorkflowState, cancel_token: CancellationToken) {
        let expires_at = self.expiry_for(&state);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            state.id,
            Entry {
                state,
                cancel_token,
                expires_at,
            },
        );
    }

    /// Returns a snapshot of a workflow.
    pub fn get(&self, workflow_id: Uuid) -> Option<WorkflowState> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&workflow_id).map(|entry| entry.state.clone())
    }

    /// Returns the cancellation token of a workflow's run task.
    pub fn cancel_token(&self, workflow_id: Uuid) -> Option<CancellationToken> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(&workflow_id)
            .map(|entry| entry.cancel_token.clone())
    }

    /// Replaces the cancellation token of a workflow, e.g. on restart.
    pub fn replace_cancel_token(&self, workflow_id: Uuid, cancel_token: CancellationToken) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get_mut(&workflow_id) {
            entry.cancel_token = cancel_token;
        }
    }

    /// Applies `f` to a workflow and returns the updated snapshot.
    ///
    /// `f` returns false to leave the workflow untouched, in which case
    /// `None` is returned. The expiry follows the resulting status.
    pub fn update(
        &self,
        workflow_id: Uuid,
        f: impl FnOnce(&mut WorkflowState) -> bool,
    ) -> Option<WorkflowState> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get_mut(&workflow_id)?;
        if !f(&mut entry.state) {
            return None;
        }

        entry.expires_at = match (entry.state.is_terminal(), entry.expires_at) {
            (true, Some(expires_at)) => Some(expires_at),
            (true, None) => Some(self.expires_from_now()),
            (false, _) => None,
        };
        Some(entry.state.clone())
    }

    /// Returns the workflows of a user, newest first.
    pub fn list_by_user(&self, user_id: Uuid) -> Vec<WorkflowState> {
        self.list(|state| state.user_id == user_id)
    }

    /// Returns the workflows of a project, newest first.
    pub fn list_by_project(&self, project_id: Uuid) -> Vec<WorkflowState> {
        self.list(|state| state.project_id == project_id)
    }

    fn list(&self, filter: impl Fn(&WorkflowState) -> bool) -> Vec<WorkflowState> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut states: Vec<_> = entries
            .values()
            .map(|entry| &entry.state)
            .filter(|state| filter(state))
            .cloned()
            .collect();
        states.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        states
    }

    /// Removes every entry expired at `now`; returns the number removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at.is_none_or(|expires_at| expires_at > now));

        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(
                target: TRACING_TARGET_REGISTRY,
                removed,
                remaining = entries.len(),
                "Evicted finished workflows"
            );
        }
        removed
    }

    /// Returns the number of registered workflows.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true if no workflow is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels the run tasks of every registered workflow.
    pub(crate) fn cancel_all(&self) {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        for entry in entries.values() {
            entry.cancel_token.cancel();
        }
    }

    fn expiry_for(&self, state: &WorkflowState) -> Option<Timestamp> {
        state.is_terminal().then(|| self.expires_from_now())
    }

    fn expires_from_now(&self) -> Timestamp {
        let now = self.clock.now();
        SignedDuration::try_from(self.retention)
            .ok()
            .and_then(|retention| now.checked_add(retention).ok())
            .unwrap_or(Timestamp::MAX)
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("len", &self.len())
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{WorkflowConfig, WorkflowStatus};

    fn registry() -> (WorkflowRegistry, Clock) {
        let clock = Clock::anchored_at(Timestamp::UNIX_EPOCH);
        (WorkflowRegistry::new(Duration::from_secs(300), clock), clock)
    }

    fn register(registry: &WorkflowRegistry, user_id: Uuid, clock: &Clock) -> Uuid {
        let state = WorkflowState::new(Uuid::new_v4(), user_id, WorkflowConfig::default(), clock.now());
        let id = state.id;
        registry.insert(state, CancellationToken::new());
        id
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_workflows_never_expire() {
        let (registry, clock) = registry();
        register(&registry, Uuid::new_v4(), &clock);

        tokio::time::advance(Duration::from_secs(24 * 60 * 60)).await;
        assert_eq!(registry.sweep(clock.now()), 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_workflows_expire_after_retention() {
        let (registry, clock) = registry();
        let id = register(&registry, Uuid::new_v4(), &clock);

        registry
            .update(id, |state| {
                state.status = WorkflowStatus::Completed;
                true
            })
            .unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(registry.sweep(clock.now()), 0);
        assert!(registry.get(id).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(registry.sweep(clock.now()), 1);
        assert!(registry.get(id).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_clears_expiry() {
        let (registry, clock) = registry();
        let id = register(&registry, Uuid::new_v4(), &clock);

        registry.update(id, |state| {
            state.status = WorkflowStatus::Failed;
            true
        });
        registry.update(id, |state| {
            state.status = WorkflowStatus::Pending;
            true
        });

        tokio::time::advance(Duration::from_secs(600)).await;
        assert_eq!(registry.sweep(clock.now()), 0);
    }

    #[test]
    fn test_declined_update_returns_none() {
        let (registry, clock) = registry();
        let id = register(&registry, Uuid::new_v4(), &clock);

        assert!(registry.update(id, |_| false).is_none());
        assert!(registry.update(Uuid::new_v4(), |_| true).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_by_user_newest_first() {
        let (registry, clock) = registry();
        let user_id = Uuid::new_v4();
        let first = register(&registry, user_id, &clock);
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = register(&registry, user_id, &clock);
        register(&registry, Uuid::new_v4(), &clock);

        let ids: Vec<_> = registry.list_by_user(user_id).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![second, first]);
    }
}
