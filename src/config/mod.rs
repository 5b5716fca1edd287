//! # Configuration
//!
//! Controller and server configuration loaded from environment variables.
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
//! Command-line flags on the controller binary take precedence over both.

mod controller;
mod controllers;
mod server;

pub use controller::ControllerConfig;
pub use controllers::{ControllerSelectionError, EnabledControllers, ALL_CONTROLLERS};
pub use server::ServerConfig;

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_default_falls_back_on_garbage() {
        // Unique names so parallel tests never race on the same variable
        std::env::set_var("PULLER_TEST_GARBAGE_PORT", "not-a-number");
        assert_eq!(env_var_or_default("PULLER_TEST_GARBAGE_PORT", 42u16), 42);
        std::env::set_var("PULLER_TEST_VALID_PORT", "9090");
        assert_eq!(env_var_or_default("PULLER_TEST_VALID_PORT", 42u16), 9090);
        assert_eq!(env_var_or_default("PULLER_TEST_UNSET_PORT", 7u16), 7);
    }
}
