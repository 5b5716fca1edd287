//! # Controller
//!
//! Reconcile logic and the pieces the runtime wires around it.
//!
//! - `reconciler` - the `Puller` reconcile engine
//! - `retry` - conflict-retry combinator for fetch-modify-write cycles
//! - `backoff` - Fibonacci backoff for failing reconciles
//! - `triggers` - maps namespace and secret events to reconcile requests
//! - `server` - health probe and metrics HTTP server

pub mod backoff;
pub mod reconciler;
pub mod retry;
pub mod server;
pub mod triggers;
