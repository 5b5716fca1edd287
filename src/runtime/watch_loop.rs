//! # Watch Loop
//!
//! Runs the `Puller` controller until a shutdown signal arrives.
//!
//! Besides `Puller` objects themselves, two watches feed reconciles:
//! namespaces (a new one may need credentials) and labelled image pull
//! secrets (a deleted one is recreated). Their events go through the pure
//! mapping in `controller::triggers`.

use crate::constants::SECRET_LABEL_KEY;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::controller::triggers::{requests_for, secret_event, NamespaceTracker};
use crate::crd::Puller;
use crate::runtime::error_policy::{handle_reconciliation_error, log_watch_error};
use anyhow::Result;
use futures::{future, stream, Stream, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{self, Controller};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::watcher::{self, watcher};
use kube_runtime::WatchStreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watcher timeout (seconds), kept below the client read timeout so idle
/// watches are closed by the API server first
const WATCH_TIMEOUT_SECS: u32 = 25;

fn known_pullers(store: &Store<Puller>) -> Vec<String> {
    store.state().iter().map(|p| p.name_any()).collect()
}

/// Reconcile requests caused by namespace creations
fn namespace_triggers(
    client: Client,
    pullers: Store<Puller>,
) -> impl Stream<Item = ObjectRef<Puller>> + Send + 'static {
    let namespaces: Api<Namespace> = Api::all(client);
    let mut tracker = NamespaceTracker::new();
    watcher(namespaces, watcher::Config::default().timeout(WATCH_TIMEOUT_SECS))
        .default_backoff()
        .filter_map(move |event| {
            let trigger = match event {
                Ok(event) => tracker.observe(event),
                Err(e) => {
                    log_watch_error("namespaces", &e.to_string());
                    None
                }
            };
            future::ready(trigger)
        })
        .flat_map(move |trigger| {
            debug!(?trigger, "Namespace trigger");
            stream::iter(requests_for(&trigger, &known_pullers(&pullers)))
        })
}

/// Reconcile requests caused by deleted image pull secrets
fn secret_triggers(
    client: Client,
    pullers: Store<Puller>,
) -> impl Stream<Item = ObjectRef<Puller>> + Send + 'static {
    let secrets: Api<Secret> = Api::all(client);
    let config = watcher::Config::default()
        .labels(SECRET_LABEL_KEY)
        .timeout(WATCH_TIMEOUT_SECS);
    watcher(secrets, config)
        .default_backoff()
        .filter_map(|event| {
            let trigger = match event {
                Ok(event) => secret_event(event),
                Err(e) => {
                    log_watch_error("secrets", &e.to_string());
                    None
                }
            };
            future::ready(trigger)
        })
        .flat_map(move |trigger| {
            debug!(?trigger, "Secret trigger");
            stream::iter(requests_for(&trigger, &known_pullers(&pullers)))
        })
}

/// Run the `Puller` controller until SIGTERM/SIGINT
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let pullers: Api<Puller> = Api::all(client.clone());
    let concurrency = reconciler.config.concurrency;

    let controller = Controller::new(
        pullers,
        watcher::Config::default().timeout(WATCH_TIMEOUT_SECS),
    );
    let store = controller.store();
    let triggers = stream::select(
        namespace_triggers(client.clone(), store.clone()),
        secret_triggers(client, store),
    );

    server_state.mark_ready();
    info!(concurrency, "Starting Puller controller");

    controller
        .with_config(controller::Config::default().concurrency(concurrency))
        .reconcile_on(triggers)
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((puller, _action)) => debug!(puller = %puller.name, "Reconciled"),
                Err(controller::Error::ReconcilerFailed(_, puller)) => {
                    // Already logged and backed off by the error policy
                    debug!(puller = %puller.name, "Reconcile failed");
                }
                Err(controller::Error::ObjectNotFound(puller)) => {
                    debug!(puller = %puller.name, "Puller no longer in cache");
                }
                Err(e) => {
                    log_watch_error("pullers", &e.to_string());
                }
            }
        })
        .await;

    warn!("Puller controller stopped");
    Ok(())
}

