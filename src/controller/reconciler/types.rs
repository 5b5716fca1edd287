//! # Reconciler Types
//!
//! Shared state and error types for the `Puller` reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::retry::RetryPolicy;
use crate::store::{ClusterStore, StoreError};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Backoff state for a single resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }
}

/// Reconciler context shared by every reconcile and the error policy
#[derive(Debug)]
pub struct Reconciler {
    pub store: Arc<dyn ClusterStore>,
    pub config: ControllerConfig,
    /// Per-resource error backoff, keyed by `Puller` name
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ClusterStore>, config: ControllerConfig) -> Self {
        Self {
            store,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.retry_policy()
    }

    /// Forget the error history of a resource after it reconciles cleanly
    pub fn reset_backoff(&self, name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(name);
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to build registry auth document: {0}")]
    Synthesis(#[source] serde_json::Error),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Several independent failures collected without stopping at the first
///
/// Renders a single error as itself and several as `[a, b, ...]`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregateError {
    errors: Vec<String>,
}

impl AggregateError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, prefixed with the object it concerns
    pub fn push(&mut self, subject: impl fmt::Display, error: impl fmt::Display) {
        self.errors.push(format!("{subject}: {error}"));
    }

    /// Fold another aggregate into this one, flattening its entries
    pub fn extend(&mut self, subject: impl fmt::Display, other: AggregateError) {
        for error in other.errors {
            self.errors.push(format!("{subject}: {error}"));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `Ok` when nothing was recorded
    pub fn into_result(self) -> Result<(), AggregateError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => Ok(()),
            [only] => f.write_str(only),
            many => write!(f, "[{}]", many.join(", ")),
        }
    }
}

impl std::error::Error for AggregateError {}
