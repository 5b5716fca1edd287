//! # Reconcile
//!
//! Entry point for a single `Puller` reconcile.
//!
//! A live `Puller` gets the finalizer first, then every target namespace is
//! converged and the outcome written to status. A terminating `Puller` has
//! its secret reference stripped from every service account in the cluster
//! and only then loses the finalizer.

use super::cleanup::unbind_all_service_accounts;
use super::dockerconfig::build_docker_config_json;
use super::ensure::ensure_namespace;
use super::finalizer::{ensure_finalizer, release_finalizer};
use super::namespaces::resolve_target_namespaces;
use super::status::{compute_status, update_status_if_needed};
use super::types::{AggregateError, Reconciler, ReconcilerError};
use crate::constants::SECRET_NAME;
use crate::crd::Puller;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Totals for one sync pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub namespaces: usize,
    pub secrets_written: usize,
    pub service_accounts_bound: usize,
}

/// Reconcile the `Puller` named by `puller`
///
/// The object handed in by the watch may be stale, so the latest copy is
/// fetched before deciding anything.
pub async fn reconcile(
    puller: Arc<Puller>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = puller.name_any();
    let span = info_span!("puller.reconcile", puller = %name);
    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();
        let result = reconcile_by_name(&ctx, &name).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if result.is_ok() {
            ctx.reset_backoff(&name);
        }
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_by_name(ctx: &Reconciler, name: &str) -> Result<Action, ReconcilerError> {
    let Some(latest) = ctx.store.get_puller(name).await? else {
        debug!("Puller no longer exists, nothing to do");
        return Ok(Action::await_change());
    };

    if latest.metadata.deletion_timestamp.is_some() {
        cleanup_puller(ctx, &latest)
            .instrument(info_span!("puller.cleanup"))
            .await?;
        return Ok(Action::await_change());
    }

    let latest = ensure_finalizer(ctx.store.as_ref(), ctx.retry_policy(), &latest).await?;
    sync_puller(ctx, &latest)
        .instrument(info_span!("puller.sync"))
        .await?;

    metrics::increment_requeues_total("resync");
    Ok(Action::requeue(ctx.config.resync_period()))
}

/// Converge every target namespace and record the outcome in status
pub async fn sync_puller(ctx: &Reconciler, puller: &Puller) -> Result<SyncSummary, ReconcilerError> {
    let outcome = converge(ctx, puller).await;

    let rendered = outcome.as_ref().err().map(ToString::to_string);
    let status = compute_status(puller.status.as_ref(), rendered.as_deref());
    update_status_if_needed(ctx.store.as_ref(), ctx.retry_policy(), puller, &status).await?;

    match &outcome {
        Ok(summary) => info!(
            namespaces = summary.namespaces,
            secrets_written = summary.secrets_written,
            service_accounts_bound = summary.service_accounts_bound,
            "Puller synced"
        ),
        Err(error) => warn!(error = %error, "Puller sync failed"),
    }
    outcome
}

async fn converge(ctx: &Reconciler, puller: &Puller) -> Result<SyncSummary, ReconcilerError> {
    let store = ctx.store.as_ref();
    let policy = ctx.retry_policy();

    let namespaces =
        resolve_target_namespaces(store, puller.spec.namespace_selector.as_ref()).await?;
    let document =
        build_docker_config_json(&puller.spec.registries).map_err(ReconcilerError::Synthesis)?;
    debug!(targets = namespaces.len(), "Resolved target namespaces");

    let mut summary = SyncSummary {
        namespaces: namespaces.len(),
        ..SyncSummary::default()
    };
    let mut errors = AggregateError::new();
    for namespace in &namespaces {
        match ensure_namespace(store, policy, puller, namespace, &document).await {
            Ok(outcome) => {
                if outcome.secret_written {
                    summary.secrets_written += 1;
                }
                summary.service_accounts_bound += outcome.service_accounts_bound;
            }
            Err(ReconcilerError::Aggregate(inner)) => {
                errors.extend(format!("namespace {namespace}"), inner);
            }
            Err(error) => errors.push(format!("namespace {namespace}"), error),
        }
    }

    metrics::increment_secrets_written(summary.secrets_written);
    metrics::increment_service_accounts_bound(summary.service_accounts_bound);
    errors.into_result()?;
    Ok(summary)
}

/// Strip bindings cluster-wide, then release the finalizer
///
/// The finalizer stays in place if any service account could not be cleaned.
pub async fn cleanup_puller(ctx: &Reconciler, puller: &Puller) -> Result<usize, ReconcilerError> {
    let store = ctx.store.as_ref();
    let policy = ctx.retry_policy();

    let unbound = unbind_all_service_accounts(store, policy, SECRET_NAME).await?;
    metrics::increment_service_accounts_unbound(unbound);

    release_finalizer(store, policy, &puller.name_any()).await?;
    info!(service_accounts_unbound = unbound, "Cleanup complete");
    Ok(unbound)
}
