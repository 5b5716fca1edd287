//! # Watch Triggers
//!
//! Maps events on namespaces and image pull secrets to `Puller` reconciles.
//!
//! - a namespace created after startup may fall inside any `Puller`'s
//!   selector, so every known `Puller` is enqueued
//! - a deleted `puller-config` secret enqueues the `Puller` named by its
//!   `puller.io/name` label, which recreates it
//!
//! The mapping is pure; the runtime feeds it watcher events and the names of
//! the `Puller` objects currently in the reflector.

use crate::constants::SECRET_LABEL_KEY;
use crate::crd::Puller;
use k8s_openapi::api::core::v1::{Namespace, Secret};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::BTreeSet;

/// Event that can require a `Puller` reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    NamespaceCreated { name: String },
    SecretDeleted { namespace: String, owner: Option<String> },
}

/// `Puller` reconciles required by `event`
///
/// An owner label naming a `Puller` that is not known is ignored.
///
/// A namespace creation usually arrives before kube-controller-manager has
/// created the namespace's `default` service account. The secret is written
/// right away, but that account is only bound on the next resync
/// (`DEFAULT_RESYNC_PERIOD_SECS`) or any other trigger for the `Puller`.
pub fn requests_for(event: &TriggerEvent, known_pullers: &[String]) -> Vec<ObjectRef<Puller>> {
    match event {
        TriggerEvent::NamespaceCreated { .. } => known_pullers
            .iter()
            .map(|name| ObjectRef::new(name.as_str()))
            .collect(),
        TriggerEvent::SecretDeleted {
            owner: Some(owner), ..
        } if known_pullers.contains(owner) => vec![ObjectRef::new(owner)],
        TriggerEvent::SecretDeleted { .. } => Vec::new(),
    }
}

/// Turns namespace watcher events into creations
///
/// Namespaces present in the initial listing, or replayed after a watch
/// restart, are not new. Only an `Apply` of a name not seen before counts.
#[derive(Debug, Default)]
pub struct NamespaceTracker {
    listed: bool,
    seen: BTreeSet<String>,
    pending: BTreeSet<String>,
}

impl NamespaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: watcher::Event<Namespace>) -> Option<TriggerEvent> {
        match event {
            watcher::Event::Init => {
                self.pending.clear();
                None
            }
            watcher::Event::InitApply(namespace) => {
                self.pending.insert(namespace.name_any());
                None
            }
            watcher::Event::InitDone => {
                // A relist can surface namespaces created while the watch was down.
                // One creation already enqueues every Puller.
                let created = if self.listed {
                    self.pending.difference(&self.seen).next().cloned()
                } else {
                    None
                };
                self.listed = true;
                self.seen = std::mem::take(&mut self.pending);
                created.map(|name| TriggerEvent::NamespaceCreated { name })
            }
            watcher::Event::Apply(namespace) => {
                let name = namespace.name_any();
                self.seen
                    .insert(name.clone())
                    .then_some(TriggerEvent::NamespaceCreated { name })
            }
            watcher::Event::Delete(namespace) => {
                self.seen.remove(&namespace.name_any());
                None
            }
        }
    }
}

/// Deleted secrets become triggers; everything else is ignored
pub fn secret_event(event: watcher::Event<Secret>) -> Option<TriggerEvent> {
    match event {
        watcher::Event::Delete(secret) => Some(TriggerEvent::SecretDeleted {
            namespace: secret.namespace().unwrap_or_default(),
            owner: secret.labels().get(SECRET_LABEL_KEY).cloned(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn namespace(name: &str) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn secret(owner: Option<&str>) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some("puller-config".into()),
                namespace: Some("team-a".into()),
                labels: owner.map(|o| BTreeMap::from([(SECRET_LABEL_KEY.to_string(), o.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(refs: &[ObjectRef<Puller>]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_namespace_creation_enqueues_every_puller() {
        let known = vec!["creds1".to_string(), "creds2".to_string()];
        let event = TriggerEvent::NamespaceCreated { name: "new".into() };
        assert_eq!(names(&requests_for(&event, &known)), ["creds1", "creds2"]);
    }

    #[test]
    fn test_secret_deletion_enqueues_owner() {
        let known = vec!["creds1".to_string(), "creds2".to_string()];
        let event = TriggerEvent::SecretDeleted {
            namespace: "team-a".into(),
            owner: Some("creds2".into()),
        };
        assert_eq!(names(&requests_for(&event, &known)), ["creds2"]);
    }

    #[test]
    fn test_secret_deletion_for_unknown_owner_is_ignored() {
        let known = vec!["creds1".to_string()];
        let unknown = TriggerEvent::SecretDeleted {
            namespace: "team-a".into(),
            owner: Some("gone".into()),
        };
        let unlabelled = TriggerEvent::SecretDeleted {
            namespace: "team-a".into(),
            owner: None,
        };
        assert!(requests_for(&unknown, &known).is_empty());
        assert!(requests_for(&unlabelled, &known).is_empty());
    }

    #[test]
    fn test_initial_listing_is_not_creation() {
        let mut tracker = NamespaceTracker::new();
        assert_eq!(tracker.observe(watcher::Event::Init), None);
        assert_eq!(tracker.observe(watcher::Event::InitApply(namespace("default"))), None);
        assert_eq!(tracker.observe(watcher::Event::InitDone), None);

        // Relabelling an existing namespace is an Apply but not a creation
        assert_eq!(tracker.observe(watcher::Event::Apply(namespace("default"))), None);
        assert_eq!(
            tracker.observe(watcher::Event::Apply(namespace("team-a"))),
            Some(TriggerEvent::NamespaceCreated {
                name: "team-a".into()
            })
        );
    }

    #[test]
    fn test_deleted_then_recreated_namespace_is_new() {
        let mut tracker = NamespaceTracker::new();
        tracker.observe(watcher::Event::Apply(namespace("team-a")));
        tracker.observe(watcher::Event::Delete(namespace("team-a")));
        assert!(tracker
            .observe(watcher::Event::Apply(namespace("team-a")))
            .is_some());
    }

    #[test]
    fn test_relist_reports_namespaces_created_while_disconnected() {
        let mut tracker = NamespaceTracker::new();
        tracker.observe(watcher::Event::Init);
        tracker.observe(watcher::Event::InitApply(namespace("default")));
        tracker.observe(watcher::Event::InitDone);

        tracker.observe(watcher::Event::Init);
        tracker.observe(watcher::Event::InitApply(namespace("default")));
        tracker.observe(watcher::Event::InitApply(namespace("late")));
        assert_eq!(
            tracker.observe(watcher::Event::InitDone),
            Some(TriggerEvent::NamespaceCreated {
                name: "late".into()
            })
        );
    }

    #[test]
    fn test_only_secret_deletions_trigger() {
        assert_eq!(secret_event(watcher::Event::Apply(secret(Some("creds1")))), None);
        assert_eq!(
            secret_event(watcher::Event::Delete(secret(Some("creds1")))),
            Some(TriggerEvent::SecretDeleted {
                namespace: "team-a".into(),
                owner: Some("creds1".into())
            })
        );
    }
}
