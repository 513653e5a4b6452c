//! Watch stream over `Check` resources.

use futures::future::ready;
use futures::{Stream, StreamExt};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client};
use vigil_reconciler::{WatchError, WatchEvent};

use crate::convert::{check_id, check_object};
use crate::crd::Check;

/// Watch checks in `namespace`, or in every namespace when `None`.
///
/// The stream relists after failures and reports each relist as a resync,
/// so the controller can drop checks deleted while it was disconnected.
pub fn watch_checks(
    client: Client,
    namespace: Option<String>,
) -> impl Stream<Item = Result<WatchEvent, WatchError>> + Send + 'static {
    let api: Api<Check> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .filter_map(|event| ready(map_event(event)))
}

/// Translate one watcher event.
///
/// Objects without a namespace are skipped.
pub fn map_event(
    event: Result<Event<Check>, watcher::Error>,
) -> Option<Result<WatchEvent, WatchError>> {
    let event = match event {
        Ok(event) => event,
        Err(e) => return Some(Err(WatchError::new(e.to_string()))),
    };
    let mapped = match event {
        Event::Init => WatchEvent::ResyncStarted,
        Event::InitDone => WatchEvent::ResyncDone,
        Event::Apply(check) | Event::InitApply(check) => WatchEvent::Applied(check_object(&check)?),
        Event::Delete(check) => WatchEvent::Deleted(check_id(&check)?),
    };
    Some(Ok(mapped))
}
