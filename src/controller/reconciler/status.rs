//! # Status Management
//!
//! Projects the outcome of a sync onto the `Ready` and `Error` conditions.
//!
//! The computed status is compared with the stored one and only written when
//! it differs, so a converged `Puller` produces no status churn.

use crate::constants::{
    CONDITION_TYPE_ERROR, CONDITION_TYPE_READY, MESSAGE_ERROR, MESSAGE_NO_ERROR, MESSAGE_READY,
    REASON_ERROR, REASON_ERROR_SEEN, REASON_NO_ERROR, REASON_READY,
};
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::crd::{ConditionStatus, Puller, PullerStatus};
use crate::store::{ClusterStore, StoreError};
use kube::ResourceExt;
use tracing::debug;

/// Status after a sync, derived from the current one
///
/// `error` is the rendered failure of the sync, if any.
pub fn compute_status(current: Option<&PullerStatus>, error: Option<&str>) -> PullerStatus {
    let mut status = current.cloned().unwrap_or_default();
    match error {
        None => {
            status.set_condition(
                CONDITION_TYPE_READY,
                ConditionStatus::True,
                REASON_READY,
                MESSAGE_READY,
            );
            status.set_condition(
                CONDITION_TYPE_ERROR,
                ConditionStatus::False,
                REASON_NO_ERROR,
                MESSAGE_NO_ERROR,
            );
        }
        Some(message) => {
            status.set_condition(
                CONDITION_TYPE_READY,
                ConditionStatus::Unknown,
                REASON_ERROR,
                MESSAGE_ERROR,
            );
            status.set_condition(
                CONDITION_TYPE_ERROR,
                ConditionStatus::True,
                REASON_ERROR_SEEN,
                message,
            );
        }
    }
    status
}

/// Write `status` unless the stored object already carries it
///
/// A conflict means someone else wrote the object; the latest copy is fetched
/// and the same status applied to it. Returns whether a write happened.
pub async fn update_status_if_needed(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    puller: &Puller,
    status: &PullerStatus,
) -> Result<bool, StoreError> {
    if puller.status.as_ref() == Some(status) {
        debug!(puller = %puller.name_any(), "Skipping status update - conditions unchanged");
        return Ok(false);
    }

    let name = puller.name_any();
    let mut candidate = Some(puller.clone());
    retry_on_conflict(policy, || {
        let first = candidate.take();
        let name = name.as_str();
        async move {
            let mut target = match first {
                Some(copy) => copy,
                None => match store.get_puller(name).await? {
                    Some(latest) => latest,
                    None => return Ok(false),
                },
            };
            if target.status.as_ref() == Some(status) {
                return Ok(false);
            }
            target.status = Some(status.clone());
            store.replace_puller_status(&target).await?;
            Ok(true)
        }
    })
    .await
}
