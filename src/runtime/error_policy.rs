//! # Error Policy
//!
//! Error handling and backoff for the controller.
//! Covers failed reconciles and errors surfacing from watch streams.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::Puller;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue a failed `Puller` with Fibonacci backoff
///
/// Backoff is tracked per resource so one failing `Puller` never slows down
/// another. A successful reconcile resets it.
pub fn handle_reconciliation_error(
    obj: Arc<Puller>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    error!(puller = %name, error = %error, "Reconciliation error");
    observability::metrics::increment_reconciliation_errors();

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(name.clone()).or_insert_with(|| {
                BackoffState::new(
                    ctx.config.error_backoff_min_secs,
                    ctx.config.error_backoff_max_secs,
                )
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using minimum backoff", e);
            (ctx.config.error_backoff_min_secs, 0)
        }
    };

    info!(
        puller = %name,
        backoff_seconds,
        error_count,
        "Retrying with Fibonacci backoff"
    );
    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Kind of failure reported by a watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version too old, the watcher relists
    Expired,
    /// 429: API server storage (re)initializing
    TooManyRequests,
    /// Object vanished between event and fetch
    NotFound,
    Other,
}

/// Classify a watch error from its rendered message
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::TooManyRequests
    } else if error.contains("ObjectNotFound")
        || (error.contains("404") && error.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a watch stream error at a level matching its kind
///
/// The watchers restart on their own with backoff; this only reports.
pub fn log_watch_error(source: &str, error: &str) -> WatchErrorKind {
    let kind = classify_watch_error(error);
    match kind {
        WatchErrorKind::Unauthorized => {
            error!(source, error, "Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired");
            error!("Verify the ClusterRole 'puller-controller' grants list/watch on pullers, namespaces, secrets and serviceaccounts:");
            error!("  kubectl auth can-i watch pullers.puller.io --as=system:serviceaccount:<namespace>:puller-controller");
        }
        WatchErrorKind::Expired => {
            warn!(source, error_type = "410", "Watch resource version expired, relisting");
        }
        WatchErrorKind::TooManyRequests => {
            warn!(source, error, "API server storage reinitializing (429), backing off");
        }
        WatchErrorKind::NotFound => {
            warn!(source, "Resource not found (likely deleted), continuing watch");
        }
        WatchErrorKind::Other => {
            error!(source, error, "Watch stream error");
        }
    }
    kind
}
