//! # Reconciler
//!
//! Reconciles `Puller` resources against the cluster.
//!
//! - `types` - reconciler context, backoff state and error types
//! - `dockerconfig` - builds the registry auth document
//! - `namespaces` - resolves target namespaces from the selector
//! - `ensure` - converges the secret and service accounts of one namespace
//! - `cleanup` - strips service account bindings cluster-wide
//! - `finalizer` - adds and releases the deletion guard
//! - `status` - condition bookkeeping
//! - `reconcile` - the reconcile entry point

pub mod cleanup;
pub mod dockerconfig;
pub mod ensure;
pub mod finalizer;
pub mod namespaces;
pub mod reconcile;
pub mod status;
pub mod types;

pub use reconcile::{reconcile, SyncSummary};
pub use types::{AggregateError, BackoffState, Reconciler, ReconcilerError};
