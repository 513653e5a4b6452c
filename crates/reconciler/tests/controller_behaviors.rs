//! Behavior tests for the controller/watch loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use tokio::sync::oneshot;
use vigil_core::{CheckId, CheckSpec, CheckState, CheckStatus, Escalation, ExecutionPayload};
use vigil_reconciler::testing::{InMemoryStatusStore, ScriptedBackend, Step};
use vigil_reconciler::{
    CheckObject, Controller, ControllerConfig, EscalationRegistry, Error, LogEscalation,
    ReconcilerConfig, ReconcilerContext, TokioClock, WatchError, WatchEvent,
};

type Events = mpsc::UnboundedSender<Result<WatchEvent, WatchError>>;

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn spec() -> CheckSpec {
    CheckSpec::new(
        Duration::from_secs(60),
        3,
        ExecutionPayload::image("busybox"),
    )
    .with_escalation(Escalation::new("log"))
}

fn applied(name: &str) -> WatchEvent {
    WatchEvent::Applied(CheckObject {
        id: CheckId::new("default", name),
        spec: Ok(spec()),
        status: None,
    })
}

fn context(backend: &ScriptedBackend, store: &InMemoryStatusStore) -> ReconcilerContext {
    ReconcilerContext {
        backend: Arc::new(backend.clone()),
        store: Arc::new(store.clone()),
        escalations: Arc::new(EscalationRegistry::new().register("log", Arc::new(LogEscalation))),
        clock: Arc::new(TokioClock::starting_at(epoch())),
        config: ReconcilerConfig::default(),
    }
}

fn config() -> ControllerConfig {
    ControllerConfig {
        max_watch_errors: 3,
        shutdown_timeout: Duration::from_secs(5),
    }
}

struct Running {
    events: Events,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<vigil_reconciler::Result<()>>,
}

fn start(ctx: ReconcilerContext) -> Running {
    let (events, rx) = mpsc::unbounded();
    let (stop, stopped) = oneshot::channel::<()>();
    let controller = Controller::new(ctx, config());
    let task = tokio::spawn(controller.run(rx, async {
        let _ = stopped.await;
    }));
    Running { events, stop, task }
}

async fn advance(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn given_two_checks_when_one_hangs_then_other_keeps_its_schedule() {
    let stuck = CheckId::new("default", "stuck");
    let healthy = CheckId::new("default", "healthy");
    let backend = ScriptedBackend::new().with_check_steps(&stuck, [Step::Hang]);
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));

    let _ = running.events.unbounded_send(Ok(applied("stuck")));
    let _ = running.events.unbounded_send(Ok(applied("healthy")));

    advance(250).await;

    assert_eq!(backend.calls_for(&stuck), 1);
    assert_eq!(backend.calls_for(&healthy), 5);
    assert_eq!(backend.overlaps(), 0);
}

#[tokio::test(start_paused = true)]
async fn given_running_check_when_deleted_then_its_runs_stop() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));
    let id = CheckId::new("default", "web");

    let _ = running.events.unbounded_send(Ok(applied("web")));
    advance(10).await;
    assert_eq!(backend.calls_for(&id), 1);

    let _ = running.events.unbounded_send(Ok(WatchEvent::Deleted(id.clone())));
    advance(600).await;
    assert_eq!(backend.calls_for(&id), 1);
}

#[tokio::test(start_paused = true)]
async fn given_watch_errors_when_threshold_reached_then_run_fails() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));

    for _ in 0..3 {
        let _ = running
            .events
            .unbounded_send(Err(WatchError::new("connection refused")));
    }

    let result = running.task.await;
    assert!(matches!(
        result,
        Ok(Err(Error::WatchFailed { attempts: 3, .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn given_intermittent_watch_errors_then_counter_resets_on_success() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));

    for name in ["a", "b", "c"] {
        let _ = running.events.unbounded_send(Err(WatchError::new("blip")));
        let _ = running.events.unbounded_send(Err(WatchError::new("blip")));
        let _ = running.events.unbounded_send(Ok(applied(name)));
    }
    advance(1).await;
    assert!(!running.task.is_finished());

    let _ = running.stop.send(());
    let result = running.task.await;
    assert!(matches!(result, Ok(Ok(()))));
}

#[tokio::test(start_paused = true)]
async fn given_watch_stream_ends_then_run_fails() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let controller = Controller::new(context(&backend, &store), config());

    let events = futures::stream::iter(vec![Ok::<_, WatchError>(applied("web"))]);
    let result = controller.run(events, std::future::pending()).await;

    assert_eq!(result, Err(Error::WatchEnded));
}

#[tokio::test(start_paused = true)]
async fn given_in_flight_run_when_shutdown_then_unit_dropped_and_state_cleared() {
    let id = CheckId::new("default", "web");
    let backend = ScriptedBackend::new().with_check_steps(&id, [Step::Hang]);
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));

    let _ = running.events.unbounded_send(Ok(applied("web")));
    advance(5).await;
    assert_eq!(backend.active(), 1);
    assert_eq!(store.latest(&id).map(|s| s.state), Some(CheckState::Running));

    let _ = running.stop.send(());
    let result = running.task.await;

    assert!(matches!(result, Ok(Ok(()))));
    assert_eq!(backend.cancelled(), 1);
    assert_eq!(store.latest(&id).map(|s| s.state), Some(CheckState::Idle));
}

#[tokio::test(start_paused = true)]
async fn given_resync_when_check_missing_then_it_is_stopped() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let mut controller = Controller::new(context(&backend, &store), config());

    controller.handle(applied("kept"));
    controller.handle(applied("gone"));
    assert_eq!(controller.len(), 2);

    controller.handle(WatchEvent::ResyncStarted);
    controller.handle(applied("kept"));
    controller.handle(WatchEvent::ResyncDone);

    assert_eq!(controller.len(), 1);
    assert!(controller.contains(&CheckId::new("default", "kept")));
    assert!(!controller.contains(&CheckId::new("default", "gone")));
}

#[tokio::test(start_paused = true)]
async fn given_restart_with_persisted_statuses_then_each_check_resumes_from_its_timestamps() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));
    let id = CheckId::new("default", "web");

    let persisted = CheckStatus {
        state: CheckState::Running,
        last_check_timestamp: Some(epoch() - chrono::Duration::seconds(30)),
        ..CheckStatus::default()
    };
    let _ = running.events.unbounded_send(Ok(WatchEvent::ResyncStarted));
    let _ = running.events.unbounded_send(Ok(WatchEvent::Applied(CheckObject {
        id: id.clone(),
        spec: Ok(spec()),
        status: Some(persisted),
    })));
    let _ = running.events.unbounded_send(Ok(WatchEvent::ResyncDone));

    advance(20).await;
    assert_eq!(backend.calls_for(&id), 0);
    assert_eq!(
        store.history(&id).first().map(|s| s.state),
        Some(CheckState::Idle)
    );

    advance(20).await;
    assert_eq!(backend.calls_for(&id), 1);
}

#[tokio::test(start_paused = true)]
async fn given_status_write_events_then_reconciler_not_restarted() {
    let backend = ScriptedBackend::new();
    let store = InMemoryStatusStore::new();
    let running = start(context(&backend, &store));
    let id = CheckId::new("default", "web");

    for _ in 0..5 {
        let _ = running.events.unbounded_send(Ok(applied("web")));
    }
    advance(30).await;

    assert_eq!(backend.calls_for(&id), 1);
    let running_writes = store
        .history(&id)
        .iter()
        .filter(|s| s.is_running())
        .count();
    assert_eq!(running_writes, 1);
}
