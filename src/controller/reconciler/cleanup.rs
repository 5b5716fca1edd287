//! # Cleanup
//!
//! Removes the image pull secret reference from service accounts across the
//! whole cluster before a `Puller` is allowed to go away.
//!
//! Cleanup is not limited to the namespaces the selector currently matches:
//! the selector may have narrowed since the reference was added.

use super::ensure::has_pull_secret;
use super::types::{AggregateError, ReconcilerError};
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::store::{ClusterStore, StoreError};
use kube::ResourceExt;
use tracing::debug;

/// Drop the first reference to `secret_name` from one service account
///
/// A service account that is gone, or no longer references the secret, is
/// already clean.
async fn unbind_service_account(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
    secret_name: &str,
) -> Result<bool, StoreError> {
    let Some(mut service_account) = store.get_service_account(namespace, name).await? else {
        return Ok(false);
    };
    let Some(references) = service_account.image_pull_secrets.as_mut() else {
        return Ok(false);
    };
    let Some(position) = references.iter().position(|r| r.name == secret_name) else {
        return Ok(false);
    };
    references.remove(position);

    match store.replace_service_account(&service_account).await {
        Err(error) if error.is_not_found() => Ok(false),
        Err(error) => Err(error),
        Ok(_) => {
            debug!(namespace = %namespace, service_account = %name, "Removed image pull secret reference");
            Ok(true)
        }
    }
}

/// Strip `secret_name` from every service account in the cluster
///
/// Returns the number of service accounts changed. Every account is tried;
/// failures are reported together afterwards.
pub async fn unbind_all_service_accounts(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    secret_name: &str,
) -> Result<usize, ReconcilerError> {
    let service_accounts = store.list_service_accounts(None).await?;

    let mut unbound = 0;
    let mut errors = AggregateError::new();
    for service_account in service_accounts
        .iter()
        .filter(|sa| has_pull_secret(sa, secret_name))
    {
        let namespace = service_account.namespace().unwrap_or_default();
        let name = service_account.name_any();
        match retry_on_conflict(policy, || {
            unbind_service_account(store, &namespace, &name, secret_name)
        })
        .await
        {
            Ok(true) => unbound += 1,
            Ok(false) => {}
            Err(error) => errors.push(format!("service account {namespace}/{name}"), error),
        }
    }
    errors.into_result()?;
    Ok(unbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use k8s_openapi::api::core::v1::LocalObjectReference;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            backoff: Duration::ZERO,
        }
    }

    async fn with_references(store: &InMemoryStore, namespace: &str, name: &str, refs: &[&str]) {
        store.add_service_account(namespace, name);
        let mut sa = store.service_account(namespace, name).unwrap();
        sa.image_pull_secrets = Some(
            refs.iter()
                .map(|r| LocalObjectReference {
                    name: (*r).to_string(),
                })
                .collect(),
        );
        store.replace_service_account(&sa).await.unwrap();
    }

    fn references(store: &InMemoryStore, namespace: &str, name: &str) -> Vec<String> {
        store
            .service_account(namespace, name)
            .unwrap()
            .image_pull_secrets
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    #[tokio::test]
    async fn test_removes_only_matching_reference_everywhere() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_namespace("b", &[]);
        with_references(&store, "a", "default", &["other", "puller-config"]).await;
        with_references(&store, "b", "default", &["puller-config"]).await;
        with_references(&store, "b", "untouched", &["other"]).await;

        let unbound = unbind_all_service_accounts(&store, policy(), "puller-config")
            .await
            .unwrap();

        assert_eq!(unbound, 2);
        assert_eq!(references(&store, "a", "default"), ["other"]);
        assert!(references(&store, "b", "default").is_empty());
        assert_eq!(references(&store, "b", "untouched"), ["other"]);
    }

    #[tokio::test]
    async fn test_nothing_to_clean_writes_nothing() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_service_account("a", "default");

        let unbound = unbind_all_service_accounts(&store, policy(), "puller-config")
            .await
            .unwrap();
        assert_eq!(unbound, 0);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_aggregated_without_stopping() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_namespace("b", &[]);
        with_references(&store, "a", "default", &["puller-config"]).await;
        with_references(&store, "b", "default", &["puller-config"]).await;
        store.fail_writes_in("a");

        let err = unbind_all_service_accounts(&store, policy(), "puller-config")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("service account a/default"));
        assert!(references(&store, "b", "default").is_empty());
        assert_eq!(references(&store, "a", "default"), ["puller-config"]);
    }
}
