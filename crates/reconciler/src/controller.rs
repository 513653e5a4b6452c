//! Controller/watch loop.
//!
//! Keeps exactly one reconciler task per check, keyed by namespace and
//! name, and relays watch events to it. The watch stream is restartable:
//! after a failure it replays every resource between `ResyncStarted` and
//! `ResyncDone`, and checks missing from that replay are stopped.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};
use vigil_core::{CheckId, CheckSpec, CheckStatus, ConfigError};

use crate::error::{Error, Result, WatchError};
use crate::reconciler::{self, CheckEvent, ReconcilerContext, ReconcilerHandle};

/// A check resource as seen by the watch.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckObject {
    pub id: CheckId,
    /// Parsed and validated spec, or why it could not be.
    pub spec: std::result::Result<CheckSpec, ConfigError>,
    /// Persisted status, absent for new resources.
    pub status: Option<CheckStatus>,
}

/// One event from the resource watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// A check was created or updated.
    Applied(CheckObject),
    /// A check was deleted.
    Deleted(CheckId),
    /// A full listing is about to be replayed.
    ResyncStarted,
    /// The full listing has been replayed.
    ResyncDone,
}

/// Configuration for the controller loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Consecutive watch errors tolerated before giving up.
    pub max_watch_errors: u32,
    /// How long to wait for reconciler tasks on shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_watch_errors: 10,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Maps check resources to reconciler tasks.
#[derive(Debug)]
pub struct Controller {
    ctx: ReconcilerContext,
    config: ControllerConfig,
    checks: HashMap<CheckId, ReconcilerHandle>,
    resync: Option<HashSet<CheckId>>,
}

impl Controller {
    /// Create a controller with no checks.
    #[must_use]
    pub fn new(ctx: ReconcilerContext, config: ControllerConfig) -> Self {
        Self {
            ctx,
            config,
            checks: HashMap::new(),
            resync: None,
        }
    }

    /// Number of live reconciler tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Whether no checks are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Whether `id` has a reconciler task.
    #[must_use]
    pub fn contains(&self, id: &CheckId) -> bool {
        self.checks.contains_key(id)
    }

    /// Consume watch events until `shutdown` resolves or the watch fails.
    ///
    /// Every reconciler task is stopped before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WatchFailed`] after `max_watch_errors` consecutive
    /// stream errors and [`Error::WatchEnded`] if the stream ends.
    pub async fn run<S, F>(mut self, events: S, shutdown: F) -> Result<()>
    where
        S: Stream<Item = std::result::Result<WatchEvent, WatchError>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(events);
        tokio::pin!(shutdown);
        let mut consecutive_errors: u32 = 0;

        info!(max_watch_errors = self.config.max_watch_errors, "Controller started");

        let result = loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break Ok(());
                }
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        consecutive_errors = 0;
                        self.handle(event);
                    }
                    Some(Err(e)) => {
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        warn!(error = %e, consecutive_errors, "Watch error");
                        if consecutive_errors >= self.config.max_watch_errors {
                            break Err(Error::watch_failed(consecutive_errors, e.reason));
                        }
                    }
                    None => break Err(Error::WatchEnded),
                },
            }
        };

        self.shutdown().await;
        result
    }

    /// Apply one watch event.
    pub fn handle(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Applied(object) => self.apply(object),
            WatchEvent::Deleted(id) => self.remove(&id, CheckEvent::Delete),
            WatchEvent::ResyncStarted => {
                debug!("Resync started");
                self.resync = Some(HashSet::new());
            }
            WatchEvent::ResyncDone => {
                let Some(seen) = self.resync.take() else {
                    return;
                };
                let stale: Vec<CheckId> = self
                    .checks
                    .keys()
                    .filter(|id| !seen.contains(*id))
                    .cloned()
                    .collect();
                debug!(seen = seen.len(), stale = stale.len(), "Resync done");
                for id in stale {
                    self.remove(&id, CheckEvent::Delete);
                }
            }
        }
    }

    fn apply(&mut self, object: CheckObject) {
        if let Some(seen) = self.resync.as_mut() {
            seen.insert(object.id.clone());
        }

        if let Some(handle) = self.checks.get(&object.id) {
            if !handle.is_finished() && handle.send(CheckEvent::SpecChanged(object.spec.clone())) {
                return;
            }
            warn!(check = %object.id, "Reconciler exited unexpectedly; restarting");
        } else {
            info!(check = %object.id, "Check added");
        }

        let handle = reconciler::spawn(
            self.ctx.clone(),
            object.id.clone(),
            object.spec,
            object.status,
        );
        self.checks.insert(object.id, handle);
    }

    fn remove(&mut self, id: &CheckId, event: CheckEvent) {
        if let Some(handle) = self.checks.remove(id) {
            info!(check = %id, "Check removed");
            handle.send(event);
        }
    }

    async fn shutdown(&mut self) {
        let handles: Vec<ReconcilerHandle> = self.checks.drain().map(|(_, h)| h).collect();
        info!(checks = handles.len(), "Stopping reconcilers");

        let tasks: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                handle.send(CheckEvent::Shutdown);
                handle.into_task()
            })
            .collect();
        let aborts: Vec<_> = tasks.iter().map(tokio::task::JoinHandle::abort_handle).collect();

        let joined =
            tokio::time::timeout(self.config.shutdown_timeout, futures::future::join_all(tasks))
                .await;
        if joined.is_err() {
            warn!(
                timeout = ?self.config.shutdown_timeout,
                "Reconcilers did not stop in time; aborting"
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
