//! # In-Memory Store
//!
//! Deterministic [`ClusterStore`] used by the test suites.
//!
//! Behaves like the API server where the controller depends on it:
//!
//! - every write bumps a cluster-wide `resourceVersion`, and a write carrying a
//!   stale version is rejected as a conflict
//! - deleting a `Puller` that still has finalizers only stamps
//!   `deletionTimestamp`; dropping the last finalizer removes it
//! - `replace_puller` never touches status and `replace_puller_status` never
//!   touches anything else
//!
//! Owner references are stored but never garbage collected.
//!
//! Faults can be injected per namespace (every write fails), for every list,
//! or as a number of one-shot conflicts consumed by the next writes.

use super::{ClusterStore, StoreError};
use crate::crd::Puller;
use crate::selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (String, String);

#[derive(Debug, Default)]
struct State {
    version: u64,
    next_uid: u64,
    writes: usize,
    pending_conflicts: usize,
    failing_lists: bool,
    failing_namespaces: BTreeSet<String>,
    pullers: BTreeMap<String, Puller>,
    namespaces: BTreeMap<String, Namespace>,
    secrets: BTreeMap<Key, Secret>,
    service_accounts: BTreeMap<Key, ServiceAccount>,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.next_uid += 1;
        format!("00000000-0000-0000-0000-{:012}", self.next_uid)
    }

    /// Gate applied to every write issued through the trait
    /// Gate applied to every list issued through the trait
    fn admit_list(&self, kind: &'static str) -> Result<(), StoreError> {
        if self.failing_lists {
            return Err(StoreError::Api {
                code: 503,
                message: format!("injected list failure for {kind}"),
            });
        }
        Ok(())
    }

    fn admit_write(
        &mut self,
        kind: &'static str,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), StoreError> {
        if let Some(ns) = namespace {
            if self.failing_namespaces.contains(ns) {
                return Err(StoreError::Api {
                    code: 500,
                    message: format!("injected write failure for {kind} {ns}/{name}"),
                });
            }
        }
        if self.pending_conflicts > 0 {
            self.pending_conflicts -= 1;
            return Err(StoreError::Conflict {
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

fn check_version(
    kind: &'static str,
    name: &str,
    stored: &ObjectMeta,
    incoming: &ObjectMeta,
) -> Result<(), StoreError> {
    match &incoming.resource_version {
        Some(version) if stored.resource_version.as_ref() != Some(version) => {
            Err(StoreError::Conflict {
                kind,
                name: name.to_string(),
            })
        }
        _ => Ok(()),
    }
}

fn not_found(kind: &'static str, name: impl Into<String>) -> StoreError {
    StoreError::NotFound {
        kind,
        name: name.into(),
    }
}

fn namespaced_key<K: ResourceExt>(kind: &'static str, obj: &K) -> Result<Key, StoreError> {
    let namespace = obj.namespace().ok_or_else(|| StoreError::Api {
        code: 422,
        message: format!("{kind} {} has no namespace", obj.name_any()),
    })?;
    Ok((namespace, obj.name_any()))
}

fn now() -> Result<Time, StoreError> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    Ok(serde_json::from_value(serde_json::Value::String(stamp))?)
}

/// In-memory cluster
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a namespace with the given labels
    pub fn add_namespace(&self, name: &str, labels: &[(&str, &str)]) {
        let mut state = self.lock();
        let version = state.next_version();
        let uid = state.next_uid();
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: (!labels.is_empty()).then_some(labels),
                resource_version: Some(version),
                uid: Some(uid),
                ..Default::default()
            },
            ..Default::default()
        };
        state.namespaces.insert(name.to_string(), namespace);
    }

    /// Create a service account with no image pull secrets
    pub fn add_service_account(&self, namespace: &str, name: &str) {
        let mut state = self.lock();
        let version = state.next_version();
        let uid = state.next_uid();
        let service_account = ServiceAccount {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                resource_version: Some(version),
                uid: Some(uid),
                ..Default::default()
            },
            ..Default::default()
        };
        state
            .service_accounts
            .insert((namespace.to_string(), name.to_string()), service_account);
    }

    /// Create a `Puller`, assigning uid and resourceVersion
    pub fn create_puller(&self, mut puller: Puller) -> Puller {
        let mut state = self.lock();
        puller.metadata.resource_version = Some(state.next_version());
        puller.metadata.uid = Some(state.next_uid());
        puller.metadata.generation = Some(1);
        state.pullers.insert(puller.name_any(), puller.clone());
        puller
    }

    /// Replace the spec of a stored `Puller` as an operator edit would
    pub fn update_puller_spec(&self, name: &str, spec: crate::crd::PullerSpec) {
        let mut state = self.lock();
        let version = state.next_version();
        if let Some(puller) = state.pullers.get_mut(name) {
            puller.spec = spec;
            puller.metadata.resource_version = Some(version);
            puller.metadata.generation = Some(puller.metadata.generation.unwrap_or(0) + 1);
        }
    }

    /// Request deletion of a `Puller`
    ///
    /// Removes it outright when no finalizers remain, otherwise marks it
    /// terminating.
    pub fn request_puller_deletion(&self, name: &str) -> Result<(), StoreError> {
        let timestamp = now()?;
        let mut state = self.lock();
        let version = state.next_version();
        let Some(puller) = state.pullers.get_mut(name) else {
            return Err(not_found("Puller", name));
        };
        if puller.finalizers().is_empty() {
            state.pullers.remove(name);
            return Ok(());
        }
        if puller.metadata.deletion_timestamp.is_none() {
            puller.metadata.deletion_timestamp = Some(timestamp);
        }
        puller.metadata.resource_version = Some(version);
        Ok(())
    }

    /// Delete a secret as an external actor would
    pub fn delete_secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub fn puller(&self, name: &str) -> Option<Puller> {
        self.lock().pullers.get(name).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock()
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn service_account(&self, namespace: &str, name: &str) -> Option<ServiceAccount> {
        self.lock()
            .service_accounts
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of successful writes issued through [`ClusterStore`]
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// Make every write to objects in `namespace` fail
    pub fn fail_writes_in(&self, namespace: &str) {
        self.lock().failing_namespaces.insert(namespace.to_string());
    }

    pub fn heal_namespace(&self, namespace: &str) {
        self.lock().failing_namespaces.remove(namespace);
    }

    /// Make every list fail until [`Self::heal_lists`]
    pub fn fail_lists(&self) {
        self.lock().failing_lists = true;
    }

    pub fn heal_lists(&self) {
        self.lock().failing_lists = false;
    }

    /// Reject the next `count` writes with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.lock().pending_conflicts = count;
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn get_puller(&self, name: &str) -> Result<Option<Puller>, StoreError> {
        Ok(self.puller(name))
    }

    async fn replace_puller(&self, puller: &Puller) -> Result<Puller, StoreError> {
        let name = puller.name_any();
        let mut state = self.lock();
        state.admit_write("Puller", None, &name)?;
        let version = state.next_version();
        let stored = state
            .pullers
            .get(&name)
            .ok_or_else(|| not_found("Puller", name.as_str()))?;
        check_version("Puller", &name, &stored.metadata, &puller.metadata)?;

        let mut updated = puller.clone();
        updated.status.clone_from(&stored.status);
        updated.metadata.uid.clone_from(&stored.metadata.uid);
        updated
            .metadata
            .deletion_timestamp
            .clone_from(&stored.metadata.deletion_timestamp);
        updated.metadata.generation = stored.metadata.generation;
        updated.metadata.resource_version = Some(version);
        state.writes += 1;

        if updated.metadata.deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.pullers.remove(&name);
        } else {
            state.pullers.insert(name, updated.clone());
        }
        Ok(updated)
    }

    async fn replace_puller_status(&self, puller: &Puller) -> Result<Puller, StoreError> {
        let name = puller.name_any();
        let mut state = self.lock();
        state.admit_write("Puller", None, &name)?;
        let version = state.next_version();
        let stored = state
            .pullers
            .get_mut(&name)
            .ok_or_else(|| not_found("Puller", name.as_str()))?;
        check_version("Puller", &name, &stored.metadata, &puller.metadata)?;

        stored.status.clone_from(&puller.status);
        stored.metadata.resource_version = Some(version);
        let updated = stored.clone();
        state.writes += 1;
        Ok(updated)
    }

    async fn list_namespaces(
        &self,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Namespace>, StoreError> {
        let state = self.lock();
        state.admit_list("Namespace")?;
        let mut selected = Vec::new();
        for namespace in state.namespaces.values() {
            let included = match selector {
                Some(selector) => selector::matches(selector, namespace.metadata.labels.as_ref())?,
                None => true,
            };
            if included {
                selected.push(namespace.clone());
            }
        }
        Ok(selected)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.secret(namespace, name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = namespaced_key("Secret", secret)?;
        let mut state = self.lock();
        state.admit_write("Secret", Some(&key.0), &key.1)?;
        if !state.namespaces.contains_key(&key.0) {
            return Err(not_found("Namespace", key.0));
        }
        if state.secrets.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: "Secret",
                name: format!("{}/{}", key.0, key.1),
            });
        }

        let mut created = secret.clone();
        created.metadata.resource_version = Some(state.next_version());
        created.metadata.uid = Some(state.next_uid());
        state.secrets.insert(key, created.clone());
        state.writes += 1;
        Ok(created)
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let key = namespaced_key("Secret", secret)?;
        let display = format!("{}/{}", key.0, key.1);
        let mut state = self.lock();
        state.admit_write("Secret", Some(&key.0), &key.1)?;
        let version = state.next_version();
        let stored = state
            .secrets
            .get(&key)
            .ok_or_else(|| not_found("Secret", display.as_str()))?;
        check_version("Secret", &display, &stored.metadata, &secret.metadata)?;

        let mut updated = secret.clone();
        updated.metadata.uid.clone_from(&stored.metadata.uid);
        updated.metadata.resource_version = Some(version);
        state.secrets.insert(key, updated.clone());
        state.writes += 1;
        Ok(updated)
    }

    async fn list_service_accounts(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ServiceAccount>, StoreError> {
        let state = self.lock();
        state.admit_list("ServiceAccount")?;
        Ok(state
            .service_accounts
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, sa)| sa.clone())
            .collect())
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, StoreError> {
        Ok(self.service_account(namespace, name))
    }

    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        let key = namespaced_key("ServiceAccount", service_account)?;
        let display = format!("{}/{}", key.0, key.1);
        let mut state = self.lock();
        state.admit_write("ServiceAccount", Some(&key.0), &key.1)?;
        let version = state.next_version();
        let stored = state
            .service_accounts
            .get(&key)
            .ok_or_else(|| not_found("ServiceAccount", display.as_str()))?;
        check_version(
            "ServiceAccount",
            &display,
            &stored.metadata,
            &service_account.metadata,
        )?;

        let mut updated = service_account.clone();
        updated.metadata.uid.clone_from(&stored.metadata.uid);
        updated.metadata.resource_version = Some(version);
        state.service_accounts.insert(key, updated.clone());
        state.writes += 1;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PullerSpec;

    fn puller(name: &str, finalizers: &[&str]) -> Puller {
        let mut puller = Puller::new(name, PullerSpec::default());
        if !finalizers.is_empty() {
            puller.metadata.finalizers = Some(finalizers.iter().map(|f| (*f).to_string()).collect());
        }
        puller
    }

    #[tokio::test]
    async fn test_stale_resource_version_is_a_conflict() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_service_account("a", "default");

        let first = store.get_service_account("a", "default").await.unwrap().unwrap();
        let stale = first.clone();
        store.replace_service_account(&first).await.unwrap();

        let err = store.replace_service_account(&stale).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_deletion_waits_for_finalizers() {
        let store = InMemoryStore::new();
        store.create_puller(puller("p", &["puller.io/finalizer"]));

        store.request_puller_deletion("p").unwrap();
        let mut terminating = store.puller("p").unwrap();
        assert!(terminating.metadata.deletion_timestamp.is_some());

        terminating.metadata.finalizers = None;
        store.replace_puller(&terminating).await.unwrap();
        assert!(store.puller("p").is_none());
    }

    #[tokio::test]
    async fn test_deletion_without_finalizers_is_immediate() {
        let store = InMemoryStore::new();
        store.create_puller(puller("p", &[]));
        store.request_puller_deletion("p").unwrap();
        assert!(store.puller("p").is_none());
    }

    #[tokio::test]
    async fn test_status_and_metadata_writes_are_separate() {
        let store = InMemoryStore::new();
        let created = store.create_puller(puller("p", &[]));

        let mut with_status = created.clone();
        with_status.status = Some(crate::crd::PullerStatus::default());
        let after_status = store.replace_puller_status(&with_status).await.unwrap();

        let mut relabelled = after_status.clone();
        relabelled.status = None;
        relabelled.metadata.finalizers = Some(vec!["x".into()]);
        let stored = store.replace_puller(&relabelled).await.unwrap();

        assert!(stored.status.is_some());
        assert_eq!(stored.finalizers(), ["x".to_string()]);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_service_account("a", "default");
        let sa = store.get_service_account("a", "default").await.unwrap().unwrap();

        store.inject_conflicts(1);
        assert!(store.replace_service_account(&sa).await.unwrap_err().is_conflict());
        store.replace_service_account(&sa).await.unwrap();

        store.fail_writes_in("a");
        let sa = store.get_service_account("a", "default").await.unwrap().unwrap();
        let err = store.replace_service_account(&sa).await.unwrap_err();
        assert!(matches!(err, StoreError::Api { code: 500, .. }));

        store.heal_namespace("a");
        store.replace_service_account(&sa).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_failures_until_healed() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[]);
        store.add_service_account("a", "default");

        store.fail_lists();
        let err = store.list_namespaces(None).await.unwrap_err();
        assert!(matches!(err, StoreError::Api { code: 503, .. }));
        assert!(store.list_service_accounts(None).await.is_err());
        // Point reads are unaffected
        assert!(store.get_service_account("a", "default").await.unwrap().is_some());

        store.heal_lists();
        assert_eq!(store.list_namespaces(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_namespaces_by_selector() {
        let store = InMemoryStore::new();
        store.add_namespace("a", &[("team", "x")]);
        store.add_namespace("b", &[]);

        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("team".to_string(), "x".to_string())])),
            ..Default::default()
        };
        let names: Vec<String> = store
            .list_namespaces(Some(&selector))
            .await
            .unwrap()
            .iter()
            .map(ResourceExt::name_any)
            .collect();
        assert_eq!(names, ["a"]);
        assert_eq!(store.list_namespaces(None).await.unwrap().len(), 2);
    }
}
