//! Per-check reconciler task.
//!
//! Each check gets one task that owns its spec and last committed status.
//! Timer fires, spec updates and deletes all arrive through the task's own
//! event queue, so no state is shared between checks.
//!
//! The task moves through four phases:
//!
//! - **Idle**: sleep until the check is due, or until an event arrives
//! - **Due**: mark the check RUNNING
//! - **Running**: wait for the backend, bounded by the check timeout
//! - **Updating**: persist the new status, retrying with backoff
//!
//! A delete or shutdown interrupts any phase. Dropping an in-flight run
//! drops the backend future, which tears down the execution unit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vigil_core::scheduler::next_due;
use vigil_core::state_machine::apply;
use vigil_core::{
    CheckId, CheckSpec, CheckState, CheckStatus, ConfigError, ExitResult, format_duration, logs,
};

use crate::backend::{ExecutionBackend, ExecutionRequest};
use crate::clock::Clock;
use crate::escalation::{EscalationMessage, EscalationRegistry, MessageKind};
use crate::store::StatusStore;

/// Exponential backoff: `base_ms * 2^attempt`, capped at `max_ms`.
#[must_use]
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(backoff.min(max_ms))
}

/// Configuration for reconciler tasks.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on `status.logs`, in bytes.
    pub logs_max_bytes: usize,
    /// First delay between failed status writes.
    pub status_retry_base: Duration,
    /// Cap on the delay between failed status writes.
    pub status_retry_max: Duration,
    /// Extra time the backend gets past the check timeout before the run is
    /// abandoned as timed out.
    pub timeout_grace: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            logs_max_bytes: 8192,
            status_retry_base: Duration::from_millis(500),
            status_retry_max: Duration::from_secs(30),
            timeout_grace: Duration::from_secs(30),
        }
    }
}

/// Collaborators shared by every reconciler task.
#[derive(Clone)]
pub struct ReconcilerContext {
    pub backend: Arc<dyn ExecutionBackend>,
    pub store: Arc<dyn StatusStore>,
    pub escalations: Arc<EscalationRegistry>,
    pub clock: Arc<dyn Clock>,
    pub config: ReconcilerConfig,
}

impl std::fmt::Debug for ReconcilerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerContext")
            .field("escalations", &self.escalations)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Event delivered to a check's task.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckEvent {
    /// The resource was applied; carries its parsed spec.
    SpecChanged(Result<CheckSpec, ConfigError>),
    /// The resource was deleted.
    Delete,
    /// The controller is stopping.
    Shutdown,
}

/// Handle to a running reconciler task.
#[derive(Debug)]
pub struct ReconcilerHandle {
    events: mpsc::UnboundedSender<CheckEvent>,
    task: JoinHandle<()>,
}

impl ReconcilerHandle {
    /// Queue an event. Returns `false` if the task has already stopped.
    pub fn send(&self, event: CheckEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Whether the task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// The task's join handle.
    #[must_use]
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// Start a reconciler task for one check.
///
/// `persisted` is the status last written to the resource store, if any.
#[must_use]
pub fn spawn(
    ctx: ReconcilerContext,
    id: CheckId,
    spec: Result<CheckSpec, ConfigError>,
    persisted: Option<CheckStatus>,
) -> ReconcilerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let reconciler = Reconciler {
        id,
        ctx,
        spec,
        committed: persisted.clone().unwrap_or_default(),
        spec_changed: false,
        events: rx,
    };
    let task = tokio::spawn(reconciler.run(persisted));
    ReconcilerHandle { events: tx, task }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Deleted,
    Shutdown,
}

impl Stop {
    /// A closed queue means the controller dropped the handle.
    fn from_event(event: Option<&CheckEvent>) -> Self {
        match event {
            Some(CheckEvent::Delete) => Self::Deleted,
            Some(CheckEvent::Shutdown | CheckEvent::SpecChanged(_)) | None => Self::Shutdown,
        }
    }
}

#[derive(Debug)]
struct PendingUpdate {
    status: CheckStatus,
    notify: Option<MessageKind>,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Due,
    Running,
    Updating(Box<PendingUpdate>),
    Stopped(Stop),
}

enum Write {
    Done,
    Failed,
    Stopped(Stop),
}

struct Reconciler {
    id: CheckId,
    ctx: ReconcilerContext,
    spec: Result<CheckSpec, ConfigError>,
    /// Last status acknowledged by the store; every timer decision uses it.
    committed: CheckStatus,
    /// Set when a spec change arrived outside the idle phase.
    spec_changed: bool,
    events: mpsc::UnboundedReceiver<CheckEvent>,
}

impl Reconciler {
    async fn run(mut self, persisted: Option<CheckStatus>) {
        info!(check = %self.id, "Reconciler started");
        let mut phase = self.recover(persisted);

        let stop = loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Due => self.mark_running().await,
                Phase::Running => self.execute().await,
                Phase::Updating(update) => self.commit(*update).await,
                Phase::Stopped(stop) => break stop,
            };
        };

        if stop == Stop::Shutdown && self.committed.is_running() {
            let mut status = self.committed.clone();
            status.state = CheckState::Idle;
            if let Err(e) = self.ctx.store.write_status(&self.id, &status).await {
                warn!(check = %self.id, error = %e, "Failed to clear running state on shutdown");
            }
        }
        info!(check = %self.id, reason = ?stop, "Reconciler stopped");
    }

    /// Derive the starting status from what was persisted.
    ///
    /// A persisted RUNNING state belongs to a previous controller process;
    /// the interrupted run is not resumed.
    fn recover(&self, persisted: Option<CheckStatus>) -> Phase {
        let now = self.ctx.clock.now();
        let mut status = persisted
            .clone()
            .unwrap_or_else(|| CheckStatus::initial(now));

        if status.is_running() {
            info!(check = %self.id, "Resetting stale running state");
            status.state = CheckState::Idle;
        }
        self.schedule(&mut status);

        if persisted.as_ref() == Some(&status) {
            Phase::Idle
        } else {
            Phase::Updating(Box::new(PendingUpdate {
                status,
                notify: None,
            }))
        }
    }

    /// Recompute `next_check_timestamp` (and the invalid-spec marker) for
    /// the current spec.
    fn schedule(&self, status: &mut CheckStatus) {
        match &self.spec {
            Ok(spec) => {
                if logs::is_invalid_spec(&status.logs) {
                    status.logs.clear();
                }
                status.next_check_timestamp = Some(next_due(status, spec, self.ctx.clock.now()));
            }
            Err(e) => {
                warn!(check = %self.id, error = %e, "Check spec is invalid; not scheduling");
                status.logs = logs::invalid_spec(e);
                status.next_check_timestamp = None;
            }
        }
    }

    fn accept_spec(&mut self, spec: Result<CheckSpec, ConfigError>) {
        if spec != self.spec {
            debug!(check = %self.id, "Spec changed");
            self.spec = spec;
            self.spec_changed = true;
        }
    }

    async fn idle(&mut self) -> Phase {
        if std::mem::take(&mut self.spec_changed) {
            let mut status = self.committed.clone();
            self.schedule(&mut status);
            if status != self.committed {
                return Phase::Updating(Box::new(PendingUpdate {
                    status,
                    notify: None,
                }));
            }
        }

        let delay = match &self.spec {
            Ok(spec) => {
                let now = self.ctx.clock.now();
                let due = next_due(&self.committed, spec, now);
                Some((due - now).to_std().unwrap_or(Duration::ZERO))
            }
            Err(_) => None,
        };

        let sleep = async {
            match delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            event = self.events.recv() => match event {
                Some(CheckEvent::SpecChanged(spec)) => {
                    self.accept_spec(spec);
                    Phase::Idle
                }
                other => Phase::Stopped(Stop::from_event(other.as_ref())),
            },
            () = sleep => Phase::Due,
        }
    }

    async fn mark_running(&mut self) -> Phase {
        if self.spec.is_err() {
            return Phase::Idle;
        }
        let mut status = self.committed.clone();
        status.state = CheckState::Running;

        match self.write(&status).await {
            Write::Done => self.committed = status,
            Write::Failed => {}
            Write::Stopped(stop) => return Phase::Stopped(stop),
        }
        Phase::Running
    }

    async fn execute(&mut self) -> Phase {
        let Ok(spec) = self.spec.clone() else {
            return Phase::Idle;
        };
        let Some(payload) = spec.payload.clone() else {
            return Phase::Idle;
        };

        let limit = spec.timeout.saturating_add(self.ctx.config.timeout_grace);
        let request = ExecutionRequest {
            check: self.id.clone(),
            payload,
            timeout: spec.timeout,
        };
        debug!(check = %self.id, timeout = %format_duration(spec.timeout), "Starting run");

        let backend = Arc::clone(&self.ctx.backend);
        let run = tokio::time::timeout(limit, backend.run(request));
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(CheckEvent::SpecChanged(spec)) => self.accept_spec(spec),
                    other => {
                        let stop = Stop::from_event(other.as_ref());
                        info!(check = %self.id, reason = ?stop, "Abandoning in-flight run");
                        return Phase::Stopped(stop);
                    }
                },
                result = &mut run => break result,
            }
        };

        let finished = self.ctx.clock.now();
        let (outcome, detail, output) = match result {
            Ok(Ok(result)) => (result.outcome(), result.detail, result.logs),
            Ok(Err(e)) => (ExitResult::LaunchError, e.to_string(), String::new()),
            Err(_) => (
                ExitResult::Timeout,
                format!("no result within {}", format_duration(limit)),
                String::new(),
            ),
        };

        for line in output.lines() {
            debug!(check = %self.id, "{line}");
        }
        match outcome {
            ExitResult::Success | ExitResult::Failure => {
                info!(check = %self.id, outcome = ?outcome, "Run finished");
            }
            ExitResult::Timeout | ExitResult::LaunchError => {
                warn!(check = %self.id, outcome = ?outcome, detail = %detail, "Run did not complete");
            }
        }

        // Thresholds and intervals come from the newest valid spec.
        let current = self.spec.as_ref().unwrap_or(&spec);
        let transition = apply(&self.committed, current, outcome, finished);
        let mut status = transition.status;
        status.logs = logs::render(outcome, &detail, &output, self.ctx.config.logs_max_bytes);
        status.next_check_timestamp = Some(next_due(&status, current, finished));

        let notify = if transition.escalation_requested {
            Some(MessageKind::Escalation)
        } else if transition.recovered {
            Some(MessageKind::Recovery)
        } else {
            None
        };

        Phase::Updating(Box::new(PendingUpdate { status, notify }))
    }

    async fn commit(&mut self, update: PendingUpdate) -> Phase {
        let mut attempt = 0;
        loop {
            match self.write(&update.status).await {
                Write::Done => break,
                Write::Stopped(stop) => return Phase::Stopped(stop),
                Write::Failed => {
                    let delay = calculate_backoff(
                        attempt,
                        millis(self.ctx.config.status_retry_base),
                        millis(self.ctx.config.status_retry_max),
                    );
                    attempt = attempt.saturating_add(1);
                    if let Some(stop) = self.pause(delay).await {
                        return Phase::Stopped(stop);
                    }
                }
            }
        }

        debug!(
            check = %self.id,
            status = %update.status.status,
            attempt = update.status.attempt,
            "Status committed"
        );
        self.committed = update.status;

        if let Some(kind) = update.notify {
            self.notify(kind);
        }
        Phase::Idle
    }

    /// One status write, interruptible by delete or shutdown.
    async fn write(&mut self, status: &CheckStatus) -> Write {
        let id = self.id.clone();
        let store = Arc::clone(&self.ctx.store);
        let write = store.write_status(&id, status);
        tokio::pin!(write);

        loop {
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(CheckEvent::SpecChanged(spec)) => self.accept_spec(spec),
                    other => return Write::Stopped(Stop::from_event(other.as_ref())),
                },
                result = &mut write => {
                    return match result {
                        Ok(()) => Write::Done,
                        Err(e) => {
                            warn!(check = %self.id, error = %e, "Status write failed");
                            Write::Failed
                        }
                    };
                }
            }
        }
    }

    /// Sleep for `delay`, still accepting spec changes.
    async fn pause(&mut self, delay: Duration) -> Option<Stop> {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                event = self.events.recv() => match event {
                    Some(CheckEvent::SpecChanged(spec)) => self.accept_spec(spec),
                    other => return Some(Stop::from_event(other.as_ref())),
                },
                () = &mut sleep => return None,
            }
        }
    }

    /// Dispatch in the background so delivery never delays the next run.
    fn notify(&self, kind: MessageKind) {
        let Ok(spec) = &self.spec else {
            return;
        };
        let registry = Arc::clone(&self.ctx.escalations);
        let escalations = spec.escalations.clone();
        let message = EscalationMessage::render(
            registry.subject_prefix(),
            &self.id,
            spec,
            &self.committed,
            kind,
        );
        info!(check = %self.id, kind = ?kind, targets = %spec.escalation_summary(), "Dispatching escalations");

        tokio::spawn(async move {
            let report = registry.dispatch(&escalations, &message).await;
            if !report.all_delivered() {
                warn!(
                    check = %message.check,
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    "Some escalations were not delivered"
                );
            }
        });
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
