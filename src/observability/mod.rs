//! # Observability
//!
//! Prometheus metrics and tracing setup.

pub mod metrics;

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides `default_filter`. Calling this twice is harmless.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    if let Err(e) = tracing_subscriber::fmt().with_env_filter(filter).try_init() {
        tracing::debug!("Tracing subscriber already initialized: {}", e);
    }
}
