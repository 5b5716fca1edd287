//! # Constants
//!
//! Names, labels and defaults shared across the controller.

/// Controller name, also used as the field manager for writes
pub const CONTROLLER_NAME: &str = "puller-controller";

/// Name of the sub-controller that reconciles `Puller` resources
pub const PULLER_CONTROLLER: &str = "puller";

/// Name of the image pull secret created in every target namespace
pub const SECRET_NAME: &str = "puller-config";

/// Label linking a synthesized secret back to the owning `Puller`
pub const SECRET_LABEL_KEY: &str = "puller.io/name";

/// Finalizer that holds a `Puller` until service accounts are cleaned up
pub const FINALIZER_KEY: &str = "puller.io/finalizer";

/// Annotation stamped by `pullerctl reconcile` to force a fresh reconcile
pub const RECONCILE_ANNOTATION: &str = "puller.io/reconcile";

/// Secret type understood by the kubelet for image pulls
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the registry auth document
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

// Condition types and reasons
pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_ERROR: &str = "Error";
pub const REASON_READY: &str = "Ready";
pub const MESSAGE_READY: &str = "puller reconcile ready";
pub const REASON_ERROR: &str = "Error";
pub const MESSAGE_ERROR: &str = "puller reconcile error";
pub const REASON_ERROR_SEEN: &str = "ErrorSeen";
pub const REASON_NO_ERROR: &str = "NoError";
pub const MESSAGE_NO_ERROR: &str = "No error seen";

// Controller defaults
pub const DEFAULT_CONCURRENCY: u16 = 5;
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_CONFLICT_RETRY_BACKOFF_MS: u64 = 10;
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 600;
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

// Server defaults
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

