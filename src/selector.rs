//! # Label Selectors
//!
//! Evaluates and renders Kubernetes label selectors.
//!
//! The live store hands the rendered query string to the API server; the
//! in-memory store evaluates selectors locally. Both go through [`validate`]
//! first so a malformed selector fails the same way against either.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("unsupported operator {operator:?} for key {key:?}")]
    UnknownOperator { key: String, operator: String },
    #[error("operator {operator} for key {key:?} requires at least one value")]
    MissingValues { key: String, operator: String },
    #[error("operator {operator} for key {key:?} does not take values")]
    UnexpectedValues { key: String, operator: String },
}

/// Check that every expression uses a known operator with the right arity
pub fn validate(selector: &LabelSelector) -> Result<(), SelectorError> {
    for requirement in selector.match_expressions.iter().flatten() {
        let has_values = requirement
            .values
            .as_ref()
            .is_some_and(|values| !values.is_empty());
        match requirement.operator.as_str() {
            "In" | "NotIn" if !has_values => {
                return Err(SelectorError::MissingValues {
                    key: requirement.key.clone(),
                    operator: requirement.operator.clone(),
                });
            }
            "Exists" | "DoesNotExist" if has_values => {
                return Err(SelectorError::UnexpectedValues {
                    key: requirement.key.clone(),
                    operator: requirement.operator.clone(),
                });
            }
            "In" | "NotIn" | "Exists" | "DoesNotExist" => {}
            other => {
                return Err(SelectorError::UnknownOperator {
                    key: requirement.key.clone(),
                    operator: other.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Render a selector in the API server query form
///
/// An empty selector renders as an empty string, which selects everything.
pub fn to_query(selector: &LabelSelector) -> Result<String, SelectorError> {
    validate(selector)?;

    let mut terms = Vec::new();
    for (key, value) in selector.match_labels.iter().flatten() {
        terms.push(format!("{key}={value}"));
    }
    for requirement in selector.match_expressions.iter().flatten() {
        let values = requirement.values.clone().unwrap_or_default().join(",");
        let term = match requirement.operator.as_str() {
            "In" => format!("{} in ({values})", requirement.key),
            "NotIn" => format!("{} notin ({values})", requirement.key),
            "Exists" => requirement.key.clone(),
            _ => format!("!{}", requirement.key),
        };
        terms.push(term);
    }
    Ok(terms.join(","))
}

/// Evaluate a selector against an object's labels
pub fn matches(
    selector: &LabelSelector,
    labels: Option<&BTreeMap<String, String>>,
) -> Result<bool, SelectorError> {
    validate(selector)?;

    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);

    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value));

    Ok(labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|requirement| requirement_matches(requirement, labels)))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let listed = |v: &String| {
        requirement
            .values
            .as_ref()
            .is_some_and(|values| values.contains(v))
    };
    match requirement.operator.as_str() {
        "In" => value.is_some_and(listed),
        "NotIn" => !value.is_some_and(listed),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}
