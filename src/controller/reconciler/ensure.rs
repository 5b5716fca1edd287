//! # Namespace Convergence
//!
//! Makes one namespace match a `Puller`: the image pull secret exists with the
//! current auth document, and every service account references it.
//!
//! Every write goes through [`retry_on_conflict`] and refetches the object on
//! each attempt. An already-converged namespace costs reads only.

use super::dockerconfig::same_document;
use super::types::{AggregateError, ReconcilerError};
use crate::constants::{DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_TYPE, SECRET_LABEL_KEY, SECRET_NAME};
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::crd::Puller;
use crate::store::{ClusterStore, StoreError};
use k8s_openapi::api::core::v1::{LocalObjectReference, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Writes performed while converging one namespace
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceOutcome {
    pub secret_written: bool,
    pub service_accounts_bound: usize,
}

/// Desired image pull secret for `puller` in `namespace`
pub fn desired_secret(puller: &Puller, namespace: &str, document: &[u8]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                SECRET_LABEL_KEY.to_string(),
                puller.name_any(),
            )])),
            owner_references: puller.controller_owner_ref(&()).map(|mut owner| {
                owner.block_owner_deletion = Some(true);
                vec![owner]
            }),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(document.to_vec()),
        )])),
        ..Default::default()
    }
}

/// Whether `current` already carries everything `desired` asks for
fn secret_is_current(current: &Secret, desired: &Secret) -> bool {
    let document = |secret: &Secret| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(DOCKER_CONFIG_JSON_KEY))
            .map(|bytes| bytes.0.clone())
    };
    let data_matches = match (document(current), document(desired)) {
        (Some(current_doc), Some(desired_doc)) => {
            same_document(&current_doc, &desired_doc)
                && current.data.as_ref().map(BTreeMap::len) == Some(1)
        }
        _ => false,
    };
    let label_matches = current.labels().get(SECRET_LABEL_KEY) == desired.labels().get(SECRET_LABEL_KEY);
    let owner_present = desired.owner_references().iter().all(|wanted| {
        current
            .owner_references()
            .iter()
            .any(|owner| owner.uid == wanted.uid)
    });
    data_matches && label_matches && owner_present && current.type_ == desired.type_
}

/// Merge `desired` onto the stored secret, keeping unrelated metadata
fn merged_secret(current: &Secret, desired: &Secret) -> Secret {
    let mut updated = current.clone();
    updated.type_.clone_from(&desired.type_);
    updated.data.clone_from(&desired.data);
    updated.string_data = None;
    updated
        .labels_mut()
        .extend(desired.labels().iter().map(|(k, v)| (k.clone(), v.clone())));
    for wanted in desired.owner_references() {
        let owners = updated.owner_references_mut();
        if !owners.iter().any(|owner| owner.uid == wanted.uid) {
            owners.push(wanted.clone());
        }
    }
    updated
}

/// Create or update the image pull secret
///
/// Returns whether a write happened. A create that loses the race to another
/// writer comes back as `AlreadyExists` and is retried as an update.
pub async fn ensure_secret(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    desired: &Secret,
) -> Result<bool, StoreError> {
    let namespace = desired.namespace().unwrap_or_default();
    let name = desired.name_any();
    retry_on_conflict(policy, || async {
        match store.get_secret(&namespace, &name).await? {
            None => {
                store.create_secret(desired).await?;
                debug!(namespace = %namespace, secret = %name, "Created image pull secret");
                Ok(true)
            }
            Some(current) if secret_is_current(&current, desired) => Ok(false),
            Some(current) => {
                store
                    .replace_secret(&merged_secret(&current, desired))
                    .await?;
                debug!(namespace = %namespace, secret = %name, "Updated image pull secret");
                Ok(true)
            }
        }
    })
    .await
}

pub(crate) fn has_pull_secret(service_account: &ServiceAccount, secret_name: &str) -> bool {
    service_account
        .image_pull_secrets
        .iter()
        .flatten()
        .any(|reference| reference.name == secret_name)
}

/// Append the secret reference to one service account
///
/// A service account deleted in the meantime needs nothing.
async fn bind_service_account(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
    secret_name: &str,
) -> Result<bool, StoreError> {
    let Some(mut service_account) = store.get_service_account(namespace, name).await? else {
        return Ok(false);
    };
    if has_pull_secret(&service_account, secret_name) {
        return Ok(false);
    }
    service_account
        .image_pull_secrets
        .get_or_insert_with(Vec::new)
        .push(LocalObjectReference {
            name: secret_name.to_string(),
        });
    match store.replace_service_account(&service_account).await {
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
        Ok(_) => Ok(true),
    }
}

/// Reference `secret_name` from every service account in `namespace`
///
/// Each service account is updated independently; failures are collected and
/// returned together once every account has been tried.
pub async fn ensure_service_accounts(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    namespace: &str,
    secret_name: &str,
) -> Result<usize, ReconcilerError> {
    let service_accounts = store.list_service_accounts(Some(namespace)).await?;

    let mut bound = 0;
    let mut errors = AggregateError::new();
    for service_account in &service_accounts {
        if has_pull_secret(service_account, secret_name) {
            continue;
        }
        let name = service_account.name_any();
        match retry_on_conflict(policy, || {
            bind_service_account(store, namespace, &name, secret_name)
        })
        .await
        {
            Ok(true) => bound += 1,
            Ok(false) => {}
            Err(error) => errors.push(format!("service account {namespace}/{name}"), error),
        }
    }
    errors.into_result()?;
    Ok(bound)
}

/// Converge one namespace
///
/// Service accounts are only touched once the secret they reference is in
/// place.
pub async fn ensure_namespace(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    puller: &Puller,
    namespace: &str,
    document: &[u8],
) -> Result<NamespaceOutcome, ReconcilerError> {
    let secret = desired_secret(puller, namespace, document);
    let secret_written = ensure_secret(store, policy, &secret).await?;
    let service_accounts_bound =
        ensure_service_accounts(store, policy, namespace, SECRET_NAME).await?;

    if secret_written || service_accounts_bound > 0 {
        info!(
            namespace = %namespace,
            secret_written,
            service_accounts_bound,
            "Namespace converged"
        );
    }
    Ok(NamespaceOutcome {
        secret_written,
        service_accounts_bound,
    })
}
