//! # Registry Auth Document
//!
//! Builds the `.dockerconfigjson` payload from a `Puller`'s registries.
//!
//! The document maps each server to its credentials:
//!
//! ```json
//! {"reg.example.com": {"username": "u", "password": "p"}}
//! ```
//!
//! Empty fields are omitted and a repeated server keeps its last entry.

use crate::crd::Registry;
use std::collections::BTreeMap;

/// Serialize registries into the auth document
pub fn build_docker_config_json(registries: &[Registry]) -> Result<Vec<u8>, serde_json::Error> {
    let document: BTreeMap<&str, Registry> = registries
        .iter()
        .map(|registry| {
            (
                registry.server.as_str(),
                Registry {
                    server: String::new(),
                    ..registry.clone()
                },
            )
        })
        .collect();
    serde_json::to_vec(&document)
}

/// Whether two auth documents carry the same content
///
/// Compared structurally so key order never forces a rewrite.
pub fn same_document(left: &[u8], right: &[u8]) -> bool {
    if left == right {
        return true;
    }
    match (
        serde_json::from_slice::<serde_json::Value>(left),
        serde_json::from_slice::<serde_json::Value>(right),
    ) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn registry(server: &str, username: &str, password: &str) -> Registry {
        Registry {
            server: server.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    fn parse(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn test_document_is_keyed_by_server() {
        let bytes = build_docker_config_json(&[registry("reg.example.com", "u", "p")]).unwrap();
        assert_eq!(
            parse(&bytes),
            json!({"reg.example.com": {"username": "u", "password": "p"}})
        );
    }

    #[test]
    fn test_duplicate_server_keeps_last_entry() {
        let bytes = build_docker_config_json(&[
            registry("reg.example.com", "old", "1"),
            registry("other.example.com", "o", "2"),
            registry("reg.example.com", "new", "3"),
        ])
        .unwrap();
        assert_eq!(
            parse(&bytes),
            json!({
                "reg.example.com": {"username": "new", "password": "3"},
                "other.example.com": {"username": "o", "password": "2"}
            })
        );
    }

    #[test]
    fn test_email_and_auth_are_carried() {
        let bytes = build_docker_config_json(&[Registry {
            server: "reg.example.com".into(),
            email: "ops@example.com".into(),
            auth: "dTpw".into(),
            ..Default::default()
        }])
        .unwrap();
        assert_eq!(
            parse(&bytes),
            json!({"reg.example.com": {"email": "ops@example.com", "auth": "dTpw"}})
        );
    }

    #[test]
    fn test_no_registries_is_an_empty_document() {
        let bytes = build_docker_config_json(&[]).unwrap();
        assert_eq!(parse(&bytes), json!({}));
    }

    #[test]
    fn test_same_document_ignores_key_order() {
        let a = br#"{"a":{"username":"u"},"b":{"username":"v"}}"#;
        let b = br#"{"b":{"username":"v"},"a":{"username":"u"}}"#;
        assert!(same_document(a, b));
        assert!(!same_document(a, br#"{"a":{"username":"x"}}"#));
        assert!(!same_document(a, b"not json"));
    }
}
