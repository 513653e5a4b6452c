//! Behavior tests for the per-check reconciler task.
//!
//! All tests run on a paused tokio clock; `TokioClock` keeps the
//! scheduler's wall clock in step with it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use vigil_core::{
    CheckId, CheckSpec, CheckState, CheckStatus, ConfigError, Escalation, ExecutionPayload, Health,
};
use vigil_reconciler::reconciler::{self, ReconcilerHandle};
use vigil_reconciler::testing::{InMemoryStatusStore, RecordingHandler, ScriptedBackend, Step};
use vigil_reconciler::{
    BackendError, CheckEvent, EscalationRegistry, ExecutionResult, MessageKind, ReconcilerConfig,
    ReconcilerContext, TokioClock,
};

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn at(secs: i64) -> DateTime<Utc> {
    epoch() + chrono::Duration::seconds(secs)
}

fn check() -> CheckId {
    CheckId::new("default", "web")
}

fn spec() -> CheckSpec {
    CheckSpec::new(
        Duration::from_secs(60),
        3,
        ExecutionPayload::image("busybox"),
    )
    .with_escalation(Escalation::new("record").with_arg("to", "ops"))
}

struct Harness {
    backend: ScriptedBackend,
    store: InMemoryStatusStore,
    handler: RecordingHandler,
    ctx: ReconcilerContext,
}

fn harness(backend: ScriptedBackend) -> Harness {
    let store = InMemoryStatusStore::new();
    let handler = RecordingHandler::new();
    let ctx = ReconcilerContext {
        backend: Arc::new(backend.clone()),
        store: Arc::new(store.clone()),
        escalations: Arc::new(
            EscalationRegistry::new().register("record", Arc::new(handler.clone())),
        ),
        clock: Arc::new(TokioClock::starting_at(epoch())),
        config: ReconcilerConfig {
            timeout_grace: Duration::from_secs(5),
            ..ReconcilerConfig::default()
        },
    };
    Harness {
        backend,
        store,
        handler,
        ctx,
    }
}

impl Harness {
    fn start(
        &self,
        spec: Result<CheckSpec, ConfigError>,
        persisted: Option<CheckStatus>,
    ) -> ReconcilerHandle {
        reconciler::spawn(self.ctx.clone(), check(), spec, persisted)
    }

    fn latest(&self) -> CheckStatus {
        self.store.latest(&check()).unwrap_or_default()
    }

    /// Statuses written after a completed run.
    fn completed_runs(&self) -> Vec<(Health, u32)> {
        self.store
            .history(&check())
            .into_iter()
            .filter(|s| !s.is_running() && s.last_check_timestamp.is_some())
            .map(|s| (s.status, s.attempt))
            .collect()
    }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

// ==========================================================================
// Escalation path
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_new_check_when_three_failures_then_critical_and_one_escalation() {
    let h = harness(ScriptedBackend::new().with_steps([Step::exit(1), Step::exit(1), Step::exit(1)]));
    let _handle = h.start(Ok(spec()), None);

    advance(130).await;

    assert_eq!(
        h.completed_runs(),
        vec![
            (Health::Unknown, 1),
            (Health::Unknown, 2),
            (Health::Critical, 3),
        ]
    );
    let sent = h.handler.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.kind, MessageKind::Escalation);
    assert_eq!(sent[0].1.subject, "vigil CRITICAL: default/web");
    assert_eq!(sent[0].0.args.get("to").map(String::as_str), Some("ops"));

    let latest = h.latest();
    assert_eq!(latest.last_escalation_timestamp, Some(at(120)));
    assert_eq!(latest.next_check_timestamp, Some(at(180)));
    assert_eq!(h.backend.overlaps(), 0);
}

#[tokio::test(start_paused = true)]
async fn given_critical_check_when_run_succeeds_then_ok_and_recovery_sent() {
    let h = harness(ScriptedBackend::new());
    let persisted = CheckStatus {
        status: Health::Critical,
        attempt: 3,
        last_check_timestamp: Some(at(-60)),
        next_check_timestamp: Some(at(0)),
        last_escalation_timestamp: Some(at(-60)),
        ..CheckStatus::default()
    };
    let _handle = h.start(Ok(spec()), Some(persisted));

    advance(1).await;

    let latest = h.latest();
    assert_eq!(latest.status, Health::Ok);
    assert_eq!(latest.attempt, 0);
    assert_eq!(latest.last_check_timestamp, Some(at(0)));
    assert_eq!(latest.next_check_timestamp, Some(at(60)));

    let sent = h.handler.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.kind, MessageKind::Recovery);
    assert_eq!(sent[0].1.subject, "vigil OK: default/web");
}

#[tokio::test(start_paused = true)]
async fn given_failing_escalation_when_critical_then_next_run_still_happens() {
    let backend = ScriptedBackend::new().with_steps([Step::exit(1), Step::exit(1)]);
    let mut h = harness(backend);
    let failing = RecordingHandler::failing();
    h.ctx.escalations = Arc::new(
        EscalationRegistry::new().register("record", Arc::new(failing.clone())),
    );
    let single = CheckSpec {
        max_attempts: 1,
        ..spec()
    };
    let _handle = h.start(Ok(single), None);

    advance(90).await;

    assert_eq!(h.backend.calls_for(&check()), 2);
    assert_eq!(failing.sent().len(), 2);
}

// ==========================================================================
// Timeouts and launch errors
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_hung_run_when_timeout_elapses_then_unit_dropped_and_timeout_logged() {
    let h = harness(ScriptedBackend::new().with_steps([Step::Hang]));
    let _handle = h.start(Ok(spec().with_timeout(Duration::from_secs(10))), None);

    advance(20).await;

    assert_eq!(h.backend.cancelled(), 1);
    assert_eq!(h.backend.active(), 0);
    let latest = h.latest();
    assert_eq!(latest.state, CheckState::Idle);
    assert_eq!(latest.attempt, 1);
    assert!(latest.logs.starts_with("[vigil] TIMEOUT"));
}

#[tokio::test(start_paused = true)]
async fn given_backend_reports_timeout_then_marker_and_partial_output_kept() {
    let h = harness(ScriptedBackend::new().with_steps([Step::result(Ok(
        ExecutionResult::timed_out("partial output\n", "deadline exceeded"),
    ))]));
    let _handle = h.start(Ok(spec()), None);

    advance(1).await;

    let latest = h.latest();
    assert_eq!(latest.attempt, 1);
    assert_eq!(latest.status, Health::Unknown);
    assert!(latest.logs.starts_with("[vigil] TIMEOUT: deadline exceeded\n"));
    assert!(latest.logs.contains("partial output"));
}

#[tokio::test(start_paused = true)]
async fn given_unit_never_starts_then_launch_error_counts_as_failure() {
    let h = harness(ScriptedBackend::new().with_steps([
        Step::result(Ok(ExecutionResult::not_started("ErrImagePull"))),
        Step::result(Err(BackendError::new("quota exceeded"))),
    ]));
    let _handle = h.start(Ok(spec()), None);

    advance(1).await;
    let latest = h.latest();
    assert_eq!(latest.attempt, 1);
    assert!(latest.logs.contains("LAUNCH ERROR: ErrImagePull"));

    advance(60).await;
    let latest = h.latest();
    assert_eq!(latest.attempt, 2);
    assert!(latest.logs.contains("quota exceeded"));
}

// ==========================================================================
// Restart recovery
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_persisted_running_state_when_started_then_reset_to_idle_without_running() {
    let h = harness(ScriptedBackend::new());
    let persisted = CheckStatus {
        state: CheckState::Running,
        status: Health::Ok,
        last_check_timestamp: Some(at(-10)),
        next_check_timestamp: Some(at(50)),
        ..CheckStatus::default()
    };
    let _handle = h.start(Ok(spec()), Some(persisted));

    advance(1).await;

    let history = h.store.history(&check());
    assert_eq!(history.first().map(|s| s.state), Some(CheckState::Idle));
    assert_eq!(h.backend.calls().len(), 0);

    advance(55).await;
    assert_eq!(h.backend.calls().len(), 1);
}

// ==========================================================================
// Concurrency
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_slow_runs_when_interval_shorter_then_runs_never_overlap() {
    let slow = (0..10).map(|_| Step::exit_after(0, Duration::from_secs(5)));
    let h = harness(ScriptedBackend::new().with_steps(slow));
    let fast = CheckSpec {
        check_interval: Duration::from_secs(1),
        ..spec()
    };
    let _handle = h.start(Ok(fast), None);

    advance(40).await;

    assert!(h.backend.calls().len() >= 5);
    assert_eq!(h.backend.overlaps(), 0);
}

#[tokio::test(start_paused = true)]
async fn given_run_in_progress_when_spec_changes_then_run_finishes_and_new_spec_applies() {
    let h = harness(
        ScriptedBackend::new().with_steps([Step::exit_after(1, Duration::from_secs(20))]),
    );
    let handle = h.start(Ok(spec()), None);

    advance(5).await;
    let updated = CheckSpec {
        check_interval: Duration::from_secs(10),
        max_attempts: 1,
        ..spec()
    };
    assert!(handle.send(CheckEvent::SpecChanged(Ok(updated))));

    advance(20).await;

    assert_eq!(h.backend.completed(), 1);
    assert_eq!(h.backend.cancelled(), 0);
    let latest = h.latest();
    assert_eq!(latest.status, Health::Critical);
    assert_eq!(latest.last_check_timestamp, Some(at(20)));
    assert_eq!(latest.next_check_timestamp, Some(at(30)));
    assert_eq!(h.handler.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn given_run_in_progress_when_deleted_then_unit_torn_down_and_task_stops() {
    let h = harness(ScriptedBackend::new().with_steps([Step::Hang]));
    let handle = h.start(Ok(spec()), None);

    advance(5).await;
    assert_eq!(h.backend.active(), 1);
    assert!(handle.send(CheckEvent::Delete));

    advance(1).await;
    assert_eq!(h.backend.cancelled(), 1);
    assert_eq!(h.backend.active(), 0);
    assert!(handle.is_finished());

    advance(600).await;
    assert_eq!(h.backend.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn given_idle_check_when_deleted_then_timer_cancelled() {
    let h = harness(ScriptedBackend::new());
    let handle = h.start(Ok(spec()), None);

    advance(10).await;
    assert_eq!(h.backend.calls().len(), 1);
    assert!(handle.send(CheckEvent::Delete));

    advance(300).await;
    assert_eq!(h.backend.calls().len(), 1);
    assert!(handle.is_finished());
}

// ==========================================================================
// Status persistence
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_store_failures_when_starting_then_retries_before_first_run() {
    let h = harness(ScriptedBackend::new());
    h.store.fail_next(3);
    let _handle = h.start(Ok(spec()), None);

    // Backoff after each failure: 500ms, 1s, 2s.
    advance(1).await;
    assert_eq!(h.backend.calls().len(), 0);

    advance(4).await;
    assert_eq!(h.store.failed_writes(), 3);
    assert_eq!(h.backend.calls().len(), 1);
    assert_eq!(h.latest().status, Health::Ok);
}

#[tokio::test(start_paused = true)]
async fn given_unchanged_spec_event_then_nothing_is_written() {
    let h = harness(ScriptedBackend::new());
    let handle = h.start(Ok(spec()), None);

    advance(10).await;
    let writes = h.store.history(&check()).len();
    assert!(handle.send(CheckEvent::SpecChanged(Ok(spec()))));

    advance(10).await;
    assert_eq!(h.store.history(&check()).len(), writes);
}

// ==========================================================================
// Invalid specs
// ==========================================================================

#[tokio::test(start_paused = true)]
async fn given_invalid_spec_then_never_runs_until_corrected() {
    let h = harness(ScriptedBackend::new());
    let handle = h.start(Err(ConfigError::NoEscalations), None);

    advance(600).await;
    assert_eq!(h.backend.calls().len(), 0);
    let latest = h.latest();
    assert!(latest.logs.contains("invalid check spec"));
    assert_eq!(latest.next_check_timestamp, None);

    assert!(handle.send(CheckEvent::SpecChanged(Ok(spec()))));
    advance(1).await;
    assert_eq!(h.backend.calls().len(), 1);
    assert!(!h.latest().logs.contains("invalid check spec"));
}
