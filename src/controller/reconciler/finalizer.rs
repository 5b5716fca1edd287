//! # Finalizer
//!
//! Adds and releases the `puller.io/finalizer` guard on a `Puller`.

use crate::constants::FINALIZER_KEY;
use crate::controller::retry::{retry_on_conflict, RetryPolicy};
use crate::crd::Puller;
use crate::store::{ClusterStore, StoreError};
use kube::ResourceExt;
use tracing::info;

pub fn has_finalizer(puller: &Puller) -> bool {
    puller.finalizers().iter().any(|f| f == FINALIZER_KEY)
}

/// Make sure the finalizer is present, returning the stored object
pub async fn ensure_finalizer(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    puller: &Puller,
) -> Result<Puller, StoreError> {
    if has_finalizer(puller) {
        return Ok(puller.clone());
    }
    let name = puller.name_any();
    retry_on_conflict(policy, || async {
        let mut latest = store
            .get_puller(&name)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                kind: "Puller",
                name: name.clone(),
            })?;
        if has_finalizer(&latest) {
            return Ok(latest);
        }
        latest.finalizers_mut().push(FINALIZER_KEY.to_string());
        let updated = store.replace_puller(&latest).await?;
        info!(puller = %name, "Added finalizer");
        Ok(updated)
    })
    .await
}

/// Drop the finalizer so the store can finish deleting the object
pub async fn release_finalizer(
    store: &dyn ClusterStore,
    policy: RetryPolicy,
    name: &str,
) -> Result<(), StoreError> {
    retry_on_conflict(policy, || async {
        let Some(mut latest) = store.get_puller(name).await? else {
            return Ok(());
        };
        if !has_finalizer(&latest) {
            return Ok(());
        }
        latest.finalizers_mut().retain(|f| f != FINALIZER_KEY);
        match store.replace_puller(&latest).await {
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
            Ok(_) => {
                info!(puller = %name, "Released finalizer");
                Ok(())
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PullerSpec;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 5,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_ensure_finalizer_is_idempotent() {
        let store = InMemoryStore::new();
        let created = store.create_puller(Puller::new("p", PullerSpec::default()));

        let updated = ensure_finalizer(&store, policy(), &created).await.unwrap();
        assert!(has_finalizer(&updated));
        ensure_finalizer(&store, policy(), &updated).await.unwrap();

        assert_eq!(store.write_count(), 1);
        assert_eq!(store.puller("p").unwrap().finalizers(), [FINALIZER_KEY.to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_finalizer_survives_stale_copy() {
        let store = InMemoryStore::new();
        let created = store.create_puller(Puller::new("p", PullerSpec::default()));
        store.update_puller_spec("p", PullerSpec::default());

        let updated = ensure_finalizer(&store, policy(), &created).await.unwrap();
        assert!(has_finalizer(&updated));
    }

    #[tokio::test]
    async fn test_release_keeps_foreign_finalizers() {
        let store = InMemoryStore::new();
        let mut puller = Puller::new("p", PullerSpec::default());
        puller.metadata.finalizers = Some(vec!["other/finalizer".into(), FINALIZER_KEY.into()]);
        store.create_puller(puller);
        store.request_puller_deletion("p").unwrap();

        release_finalizer(&store, policy(), "p").await.unwrap();

        let remaining = store.puller("p").unwrap();
        assert_eq!(remaining.finalizers(), ["other/finalizer".to_string()]);
    }

    #[tokio::test]
    async fn test_release_removes_terminating_object() {
        let store = InMemoryStore::new();
        let mut puller = Puller::new("p", PullerSpec::default());
        puller.metadata.finalizers = Some(vec![FINALIZER_KEY.into()]);
        store.create_puller(puller);
        store.request_puller_deletion("p").unwrap();

        release_finalizer(&store, policy(), "p").await.unwrap();
        assert!(store.puller("p").is_none());
        release_finalizer(&store, policy(), "p").await.unwrap();
    }
}
