//! # Puller Controller
//!
//! A Kubernetes controller that propagates container registry credentials.
//!
//! A cluster-scoped `Puller` lists registry credentials and an optional
//! namespace selector. For every selected namespace the controller keeps an
//! image pull secret named `puller-config` in sync with the credentials and
//! adds it to `imagePullSecrets` of every service account there. Deleting a
//! `Puller` removes those references again before its finalizer is released.
//!
//! ## Modules
//!
//! - `crd` - the `Puller` resource and its status
//! - `store` - typed cluster access, live and in-memory
//! - `controller` - reconcile logic, retries, backoff, triggers and the probe server
//! - `runtime` - process startup, the watch loop and error policy
//! - `observability` - tracing and Prometheus metrics
//! - `config` - environment and flag driven configuration

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod selector;
pub mod store;
