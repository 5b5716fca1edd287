//! # Custom Resource Definitions
//!
//! CRD types for the Puller controller.
//!
//! `Puller` is a cluster-scoped declaration of registry credentials plus an
//! optional namespace selector. The controller materializes the credentials as
//! an image pull secret in each selected namespace and binds it to every
//! service account there.

mod status;

pub use status::{Condition, ConditionStatus, PullerStatus};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use schemars::{Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

/// Puller Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: puller.io/v1alpha1
/// kind: Puller
/// metadata:
///   name: creds1
/// spec:
///   registries:
///     - server: reg.example.com
///       username: u
///       password: p
///   namespaceSelector:
///     matchLabels:
///       team: payments
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Puller",
    group = "puller.io",
    version = "v1alpha1",
    status = "PullerStatus",
    shortname = "pl",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PullerSpec {
    /// Registry credentials to propagate
    /// Entries are keyed by server; a repeated server keeps the last entry
    #[serde(default)]
    pub registries: Vec<Registry>,
    /// Label selector choosing target namespaces
    /// When omitted, every namespace in the cluster is targeted
    #[serde(
        default,
        alias = "namespaceAffinity",
        skip_serializing_if = "Option::is_none"
    )]
    #[schemars(schema_with = "label_selector_schema")]
    pub namespace_selector: Option<LabelSelector>,
}

/// Credentials for a single registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    /// Registry host, e.g. `reg.example.com`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    /// Pre-encoded `username:password` auth token
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth: String,
}

fn label_selector_schema(_gen: &mut SchemaGenerator) -> Schema {
    // Structural schema for a standard Kubernetes LabelSelector
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "description": "Label selector choosing target namespaces. When omitted, every namespace is targeted.",
        "properties": {
            "matchLabels": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            },
            "matchExpressions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["key", "operator"],
                    "properties": {
                        "key": { "type": "string" },
                        "operator": { "type": "string" },
                        "values": {
                            "type": "array",
                            "items": { "type": "string" }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_is_cluster_scoped() {
        let crd = Puller::crd();
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.group, "puller.io");
        assert_eq!(crd.spec.names.kind, "Puller");
        assert_eq!(crd.spec.names.plural, "pullers");
    }

    #[test]
    fn test_spec_accepts_legacy_namespace_affinity() {
        let spec: PullerSpec = serde_json::from_value(serde_json::json!({
            "registries": [{"server": "reg.example.com", "username": "u"}],
            "namespaceAffinity": {"matchLabels": {"team": "a"}}
        }))
        .unwrap();

        let selector = spec.namespace_selector.unwrap();
        assert_eq!(
            selector.match_labels.unwrap().get("team").map(String::as_str),
            Some("a")
        );
    }

    #[test]
    fn test_registry_omits_empty_fields() {
        let registry = Registry {
            server: "reg.example.com".into(),
            username: "u".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&registry).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"server": "reg.example.com", "username": "u"})
        );
    }

    #[test]
    fn test_spec_defaults_to_no_registries() {
        let spec: PullerSpec = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(spec.registries.is_empty());
        assert!(spec.namespace_selector.is_none());
    }
}
