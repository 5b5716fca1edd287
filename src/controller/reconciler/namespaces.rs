//! # Namespace Resolution
//!
//! Chooses the namespaces a `Puller` targets.

use crate::store::{ClusterStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::ResourceExt;

/// Names of the namespaces selected by `selector`
///
/// No selector targets every namespace. A selector matching nothing yields an
/// empty list, which is not an error.
pub async fn resolve_target_namespaces(
    store: &dyn ClusterStore,
    selector: Option<&LabelSelector>,
) -> Result<Vec<String>, StoreError> {
    let mut names: Vec<String> = store
        .list_namespaces(selector)
        .await?
        .iter()
        .map(ResourceExt::name_any)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;
    use std::collections::BTreeMap;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.add_namespace("default", &[]);
        store.add_namespace("payments", &[("team", "payments")]);
        store.add_namespace("search", &[("team", "search")]);
        store
    }

    #[tokio::test]
    async fn test_no_selector_targets_all_namespaces() {
        let names = resolve_target_namespaces(&store(), None).await.unwrap();
        assert_eq!(names, ["default", "payments", "search"]);
    }

    #[tokio::test]
    async fn test_selector_narrows_targets() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("team".into(), "payments".into())])),
            ..Default::default()
        };
        let names = resolve_target_namespaces(&store(), Some(&selector))
            .await
            .unwrap();
        assert_eq!(names, ["payments"]);
    }

    #[tokio::test]
    async fn test_selector_matching_nothing_is_empty() {
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("team".into(), "nobody".into())])),
            ..Default::default()
        };
        let names = resolve_target_namespaces(&store(), Some(&selector))
            .await
            .unwrap();
        assert!(names.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_selector_is_an_error() {
        let selector = LabelSelector {
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: "team".into(),
                operator: "In".into(),
                values: None,
            }]),
            ..Default::default()
        };
        let err = resolve_target_namespaces(&store(), Some(&selector))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Selector(_)));
    }
}
