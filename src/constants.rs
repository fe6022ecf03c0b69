//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! Most of these are defaults that can be overridden through environment
//! variables (see [`crate::config`]).

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "vault-config-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default delay before re-checking a resource that reconciled successfully (seconds)
///
/// Drift made directly in Vault is only detected on this schedule.
pub const DEFAULT_RECHECK_INTERVAL_SECS: u64 = 300;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default margin subtracted from a Vault token lease before it is renewed (seconds)
pub const DEFAULT_SESSION_RENEW_MARGIN_SECS: u64 = 30;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default upper bound on reconciliations running at the same time, per kind
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: usize = 10;

/// Default lifetime requested for service account tokens (seconds)
///
/// The TokenRequest API rejects anything below ten minutes.
pub const DEFAULT_IDENTITY_TOKEN_EXPIRATION_SECS: i64 = 600;

/// Upper bound on cached HTTP clients, one per distinct TLS setting
///
/// The cache starts over once it is full.
pub const MAX_CACHED_HTTP_CLIENTS: usize = 16;
