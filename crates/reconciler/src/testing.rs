//! In-memory collaborators for tests.
//!
//! Built only for unit tests or with the `test-utils` feature, which this
//! crate's integration tests enable.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use vigil_core::{CheckId, CheckStatus, Escalation};

use crate::backend::{ExecutionBackend, ExecutionRequest, ExecutionResult};
use crate::error::{BackendError, DispatchError, StoreError};
use crate::escalation::{EscalationHandler, EscalationMessage};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted backend response.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return `result` after `delay`.
    Finish {
        delay: Duration,
        result: Result<ExecutionResult, BackendError>,
    },
    /// Never return; the run ends only when its future is dropped.
    Hang,
}

impl Step {
    /// Exit immediately with `code`.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self::Finish {
            delay: Duration::ZERO,
            result: Ok(ExecutionResult::exited(code, format!("exit {code}\n"))),
        }
    }

    /// Exit with `code` after `delay`.
    #[must_use]
    pub fn exit_after(code: i32, delay: Duration) -> Self {
        Self::Finish {
            delay,
            result: Ok(ExecutionResult::exited(code, format!("exit {code}\n"))),
        }
    }

    /// Return `result` immediately.
    #[must_use]
    pub fn result(result: Result<ExecutionResult, BackendError>) -> Self {
        Self::Finish {
            delay: Duration::ZERO,
            result,
        }
    }
}

#[derive(Debug, Default)]
struct BackendState {
    script: VecDeque<Step>,
    scripts: HashMap<CheckId, VecDeque<Step>>,
    calls: Vec<ExecutionRequest>,
    active: HashMap<CheckId, usize>,
    overlaps: usize,
    cancelled: usize,
    completed: usize,
}

/// Backend that replays scripted steps and watches for overlapping runs.
///
/// When the script is empty every run exits 0.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    /// Create a backend with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append steps to the script.
    #[must_use]
    pub fn with_steps(self, steps: impl IntoIterator<Item = Step>) -> Self {
        lock(&self.state).script.extend(steps);
        self
    }

    /// Append steps used only for `check`, ahead of the shared script.
    #[must_use]
    pub fn with_check_steps(self, check: &CheckId, steps: impl IntoIterator<Item = Step>) -> Self {
        lock(&self.state)
            .scripts
            .entry(check.clone())
            .or_default()
            .extend(steps);
        self
    }

    /// Append one step.
    pub fn push(&self, step: Step) {
        lock(&self.state).script.push_back(step);
    }

    /// Every request received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ExecutionRequest> {
        lock(&self.state).calls.clone()
    }

    /// Number of requests received for `check`.
    #[must_use]
    pub fn calls_for(&self, check: &CheckId) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|r| &r.check == check)
            .count()
    }

    /// Runs currently in progress across all checks.
    #[must_use]
    pub fn active(&self) -> usize {
        lock(&self.state).active.values().sum()
    }

    /// Times a run started while another run of the same check was active.
    #[must_use]
    pub fn overlaps(&self) -> usize {
        lock(&self.state).overlaps
    }

    /// Runs whose future was dropped before finishing.
    #[must_use]
    pub fn cancelled(&self) -> usize {
        lock(&self.state).cancelled
    }

    /// Runs that returned.
    #[must_use]
    pub fn completed(&self) -> usize {
        lock(&self.state).completed
    }
}

struct ActiveRun {
    state: Arc<Mutex<BackendState>>,
    check: CheckId,
    finished: bool,
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(count) = state.active.get_mut(&self.check) {
            *count = count.saturating_sub(1);
        }
        if self.finished {
            state.completed += 1;
        } else {
            state.cancelled += 1;
        }
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult, BackendError> {
        let step = {
            let mut state = lock(&self.state);
            let active = state.active.entry(request.check.clone()).or_default();
            *active += 1;
            if *active > 1 {
                state.overlaps += 1;
            }
            state.calls.push(request.clone());
            state
                .scripts
                .get_mut(&request.check)
                .and_then(VecDeque::pop_front)
                .or_else(|| state.script.pop_front())
                .unwrap_or_else(|| Step::exit(0))
        };
        let mut run = ActiveRun {
            state: Arc::clone(&self.state),
            check: request.check,
            finished: false,
        };

        match step {
            Step::Finish { delay, result } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                run.finished = true;
                result
            }
            Step::Hang => {
                std::future::pending::<()>().await;
                Err(BackendError::new("hung run resumed"))
            }
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    history: HashMap<CheckId, Vec<CheckStatus>>,
    failures_remaining: usize,
    failed_writes: usize,
}

/// Status store that keeps every write, with injectable failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatusStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStatusStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` writes.
    pub fn fail_next(&self, count: usize) {
        lock(&self.state).failures_remaining = count;
    }

    /// Every status written for `check`, oldest first.
    #[must_use]
    pub fn history(&self, check: &CheckId) -> Vec<CheckStatus> {
        lock(&self.state)
            .history
            .get(check)
            .cloned()
            .unwrap_or_default()
    }

    /// Most recently written status for `check`.
    #[must_use]
    pub fn latest(&self, check: &CheckId) -> Option<CheckStatus> {
        lock(&self.state)
            .history
            .get(check)
            .and_then(|h| h.last().cloned())
    }

    /// Number of rejected writes.
    #[must_use]
    pub fn failed_writes(&self) -> usize {
        lock(&self.state).failed_writes
    }
}

#[async_trait]
impl crate::store::StatusStore for InMemoryStatusStore {
    async fn write_status(&self, check: &CheckId, status: &CheckStatus) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            state.failed_writes += 1;
            return Err(StoreError::new(check.to_string(), "injected failure"));
        }
        state
            .history
            .entry(check.clone())
            .or_default()
            .push(status.clone());
        Ok(())
    }
}

/// Escalation handler that records what it was asked to send.
#[derive(Debug, Clone, Default)]
pub struct RecordingHandler {
    sent: Arc<Mutex<Vec<(Escalation, EscalationMessage)>>>,
    fail: bool,
}

impl RecordingHandler {
    /// A handler that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler that records and then rejects every message.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Messages received, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(Escalation, EscalationMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl EscalationHandler for RecordingHandler {
    async fn send(
        &self,
        escalation: &Escalation,
        message: &EscalationMessage,
    ) -> Result<(), DispatchError> {
        lock(&self.sent).push((escalation.clone(), message.clone()));
        if self.fail {
            Err(DispatchError::delivery_failed(&escalation.kind, "rejected"))
        } else {
            Ok(())
        }
    }
}
