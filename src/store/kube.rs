//! # Kubernetes Store
//!
//! [`ClusterStore`] backed by the Kubernetes API server.

use super::{ClusterStore, StoreError};
use crate::constants::CONTROLLER_NAME;
use crate::crd::Puller;
use crate::selector;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Live object store
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pullers(&self) -> Api<Puller> {
        Api::all(self.client.clone())
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn service_accounts(&self, namespace: &str) -> Api<ServiceAccount> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a kube error onto the store taxonomy
fn map_error(kind: &'static str, name: &str, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(response) => match response.code {
            404 => StoreError::NotFound {
                kind,
                name: name.to_string(),
            },
            409 if response.reason == "AlreadyExists" => StoreError::AlreadyExists {
                kind,
                name: name.to_string(),
            },
            409 => StoreError::Conflict {
                kind,
                name: name.to_string(),
            },
            code => StoreError::Api {
                code,
                message: response.message.clone(),
            },
        },
        other => StoreError::Transport(other.to_string()),
    }
}

fn require_namespace<K: ResourceExt>(kind: &'static str, obj: &K) -> Result<String, StoreError> {
    obj.namespace().ok_or_else(|| StoreError::Api {
        code: 422,
        message: format!("{kind} {} has no namespace", obj.name_any()),
    })
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_puller(&self, name: &str) -> Result<Option<Puller>, StoreError> {
        self.pullers()
            .get_opt(name)
            .await
            .map_err(|e| map_error("Puller", name, e))
    }

    async fn replace_puller(&self, puller: &Puller) -> Result<Puller, StoreError> {
        let name = puller.name_any();
        self.pullers()
            .replace(&name, &PostParams::default(), puller)
            .await
            .map_err(|e| map_error("Puller", &name, e))
    }

    async fn replace_puller_status(&self, puller: &Puller) -> Result<Puller, StoreError> {
        let name = puller.name_any();
        // resourceVersion in a merge patch acts as a precondition,
        // so a stale status write comes back as 409
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": puller.resource_version() },
            "status": puller.status,
        });
        self.pullers()
            .patch_status(
                &name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| map_error("Puller", &name, e))
    }

    async fn list_namespaces(
        &self,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Namespace>, StoreError> {
        let mut params = ListParams::default();
        if let Some(selector) = selector {
            let query = selector::to_query(selector)?;
            debug!(selector = %query, "Listing namespaces with label selector");
            if !query.is_empty() {
                params = params.labels(&query);
            }
        }
        Api::<Namespace>::all(self.client.clone())
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| map_error("Namespace", "*", e))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.secrets(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_error("Secret", &format!("{namespace}/{name}"), e))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = require_namespace("Secret", secret)?;
        let name = format!("{namespace}/{}", secret.name_any());
        self.secrets(&namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| map_error("Secret", &name, e))
    }

    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let namespace = require_namespace("Secret", secret)?;
        let name = secret.name_any();
        self.secrets(&namespace)
            .replace(&name, &PostParams::default(), secret)
            .await
            .map_err(|e| map_error("Secret", &format!("{namespace}/{name}"), e))
    }

    async fn list_service_accounts(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ServiceAccount>, StoreError> {
        let api: Api<ServiceAccount> = match namespace {
            Some(ns) => self.service_accounts(ns),
            None => Api::all(self.client.clone()),
        };
        api.list(&ListParams::default())
            .await
            .map(|list| list.items)
            .map_err(|e| map_error("ServiceAccount", namespace.unwrap_or("*"), e))
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, StoreError> {
        self.service_accounts(namespace)
            .get_opt(name)
            .await
            .map_err(|e| map_error("ServiceAccount", &format!("{namespace}/{name}"), e))
    }

    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        let namespace = require_namespace("ServiceAccount", service_account)?;
        let name = service_account.name_any();
        self.service_accounts(&namespace)
            .replace(&name, &PostParams::default(), service_account)
            .await
            .map_err(|e| map_error("ServiceAccount", &format!("{namespace}/{name}"), e))
    }
}
