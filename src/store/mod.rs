//! # Object Store
//!
//! The controller's view of the cluster: typed get/list/create/replace for the
//! handful of kinds it touches. Writes carry the object's `resourceVersion`,
//! so a stale copy is rejected with [`StoreError::Conflict`] instead of
//! silently overwriting a concurrent change.
//!
//! - `kube` - live implementation over the Kubernetes API
//! - `memory` - in-memory implementation used by tests, behind the
//!   `test-util` feature

pub mod kube;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use self::kube::KubeStore;
#[cfg(any(test, feature = "test-util"))]
pub use self::memory::InMemoryStore;

use crate::crd::Puller;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Secret, ServiceAccount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use thiserror::Error;

/// Errors returned by a [`ClusterStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },
    #[error("conflict writing {kind} {name}: the object has been modified")]
    Conflict { kind: &'static str, name: String },
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: &'static str, name: String },
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid label selector: {0}")]
    Selector(#[from] crate::selector::SelectorError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether a fetch-modify-write cycle should be retried
    ///
    /// A create that lost the race to a concurrent writer behaves like a
    /// stale update: refetch and try again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Object store capability consumed by the reconciler
#[async_trait]
pub trait ClusterStore: Send + Sync + std::fmt::Debug {
    async fn get_puller(&self, name: &str) -> Result<Option<Puller>, StoreError>;
    /// Replace metadata and spec; status is left untouched
    async fn replace_puller(&self, puller: &Puller) -> Result<Puller, StoreError>;
    /// Replace the status subresource only
    async fn replace_puller_status(&self, puller: &Puller) -> Result<Puller, StoreError>;

    /// List namespaces, optionally filtered by a label selector
    async fn list_namespaces(
        &self,
        selector: Option<&LabelSelector>,
    ) -> Result<Vec<Namespace>, StoreError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;
    async fn create_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;
    async fn replace_secret(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// List service accounts in one namespace, or cluster-wide when `None`
    async fn list_service_accounts(
        &self,
        namespace: Option<&str>,
    ) -> Result<Vec<ServiceAccount>, StoreError>;
    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ServiceAccount>, StoreError>;
    async fn replace_service_account(
        &self,
        service_account: &ServiceAccount,
    ) -> Result<ServiceAccount, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let conflict = StoreError::Conflict {
            kind: "Secret",
            name: "ns/a".into(),
        };
        let exists = StoreError::AlreadyExists {
            kind: "Secret",
            name: "ns/a".into(),
        };
        let api = StoreError::Api {
            code: 500,
            message: "boom".into(),
        };
        assert!(conflict.is_conflict());
        assert!(exists.is_conflict());
        assert!(!api.is_conflict());
        assert!(!api.is_not_found());
    }
}
