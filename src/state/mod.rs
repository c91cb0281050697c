// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for interested listeners. It also owns
// the single-flight guard: a run is admitted and retired under the state write lock.

use crate::models::{RunId, TaskRequest, TerminalOutcome};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Lifecycle of the compile pipeline as seen by the launcher and front ends
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunState {
    /// True from admission of a run until its outcome is queued
    pub is_compiling: bool,

    pub active_run: Option<RunId>,

    /// Number of runs admitted so far; the next run id is this plus one
    pub runs_started: u64,

    pub last_outcome: Option<TerminalOutcome>,

    pub last_request: Option<TaskRequest>,
}

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A run was admitted by the single-flight guard
    RunStarted {
        run_id: RunId,
        project_path: Utf8PathBuf,
    },

    /// A run's outcome was queued and the guard released
    RunFinished { run_id: RunId, success: bool },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component that:
/// - Provides thread-safe access to [`RunState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Admits at most one run at a time ([`try_begin_run`](Self::try_begin_run))
///
/// # Related Types
///
/// - [`RunGuard`]: Proof of admission, retired with the run's outcome
/// - [`crate::task::TaskLauncher`]: Primary producer of run lifecycle changes
pub struct StateManager {
    state: Arc<RwLock<RunState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    /// Clone of the current state, safe to use without holding locks
    pub fn snapshot(&self) -> RunState {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_compiling);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.read_lock();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        self.mutate(update_fn).1
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Admit a new run unless one is already in flight
    ///
    /// The check and the set happen under one write lock. On rejection the id of
    /// the run still in flight is returned.
    pub fn try_begin_run(self: &Arc<Self>, request: &TaskRequest) -> Result<RunGuard, RunId> {
        let (admitted, _) = self.mutate(|state| {
            if state.is_compiling {
                // A flag without an id cannot happen through this API
                return Err(state.active_run.unwrap_or(RunId(state.runs_started)));
            }

            state.runs_started += 1;
            let run_id = RunId(state.runs_started);
            state.is_compiling = true;
            state.active_run = Some(run_id);
            state.last_request = Some(request.clone());
            Ok(run_id)
        });

        let run_id = admitted?;
        tracing::info!("Run {} admitted for {}", run_id, request.project_path());

        Ok(RunGuard {
            state: Arc::clone(self),
            run_id,
            completed: false,
        })
    }

    /// Retire a run
    ///
    /// `publish` runs while the write lock is held, right before the in-flight
    /// flag is cleared, so whoever can observe what `publish` sent can also
    /// launch again.
    pub fn finish_run<F>(&self, run_id: RunId, outcome: &TerminalOutcome, publish: F) -> Vec<StateChange>
    where
        F: FnOnce(),
    {
        self.mutate(|state| {
            publish();

            if state.active_run != Some(run_id) {
                tracing::warn!(
                    "Run {} finished but active run is {:?}",
                    run_id,
                    state.active_run
                );
                return;
            }

            state.is_compiling = false;
            state.active_run = None;
            state.last_outcome = Some(outcome.clone());
        })
        .1
    }

    /// Clear run history; refuses while a run is in flight
    pub fn reset(&self) -> Vec<StateChange> {
        let (reset, mut changes) = self.mutate(|state| {
            if state.is_compiling {
                return false;
            }
            state.last_outcome = None;
            state.last_request = None;
            true
        });

        if reset {
            let _ = self.state_tx.send(StateChange::StateReset);
            changes.push(StateChange::StateReset);
        }
        changes
    }

    fn mutate<F, R>(&self, update_fn: F) -> (R, Vec<StateChange>)
    where
        F: FnOnce(&mut RunState) -> R,
    {
        let mut state = self.write_lock();
        let old_state = state.clone();

        let result = update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        (result, changes)
    }

    fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_compiling == new.is_compiling {
            return changes;
        }

        if new.is_compiling {
            if let Some(run_id) = new.active_run {
                changes.push(StateChange::RunStarted {
                    run_id,
                    project_path: new
                        .last_request
                        .as_ref()
                        .map(|r| r.project_path().to_path_buf())
                        .unwrap_or_default(),
                });
            }
        } else if let Some(run_id) = old.active_run {
            changes.push(StateChange::RunFinished {
                run_id,
                success: new
                    .last_outcome
                    .as_ref()
                    .is_some_and(TerminalOutcome::is_success),
            });
        }

        changes
    }

    // Workers never hold this lock while running the compiler
    fn read_lock(&self) -> RwLockReadGuard<'_, RunState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, RunState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Admission ticket for one run
///
/// Retire it with [`complete`](Self::complete). If it is dropped without that,
/// the run is retired as failed so the single-flight guard can never stick.
pub struct RunGuard {
    state: Arc<StateManager>,
    run_id: RunId,
    completed: bool,
}

impl RunGuard {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Retire the run, calling `publish` under the state lock first.
    pub fn complete<F>(mut self, outcome: &TerminalOutcome, publish: F)
    where
        F: FnOnce(),
    {
        self.completed = true;
        self.state.finish_run(self.run_id, outcome, publish);
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.completed {
            return;
        }

        tracing::error!("Run {} guard dropped without an outcome", self.run_id);
        let outcome = TerminalOutcome::Failure("run ended without an outcome".to_string());
        self.state.finish_run(self.run_id, &outcome, || {});
    }
}
