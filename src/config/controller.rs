//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_opt, env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::*;
use crate::controller::reconciler::ReconcileSettings;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have defaults and can be overridden via environment variables,
/// typically populated from a ConfigMap with `envFrom` in the deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Delay before re-checking a converged resource (seconds)
    pub recheck_interval_secs: u64,
    /// Exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Renew Vault tokens this long before their lease ends (seconds)
    pub session_renew_margin_secs: u64,
    /// Limits how many resources of one kind are reconciled simultaneously
    pub max_concurrent_reconciliations: usize,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Namespace to watch; all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Audience requested for service account tokens when a resource names none
    pub identity_token_audience: Option<String>,
    /// Lifetime requested for service account tokens (seconds)
    pub identity_token_expiration_secs: i64,
    /// Read the identity token from this file instead of using TokenRequest
    pub identity_token_file: Option<String>,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE), used when `RUST_LOG` is unset
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable color in text format logs
    pub log_enable_color: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            recheck_interval_secs: DEFAULT_RECHECK_INTERVAL_SECS,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            session_renew_margin_secs: DEFAULT_SESSION_RENEW_MARGIN_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            watch_namespace: None,
            identity_token_audience: None,
            identity_token_expiration_secs: DEFAULT_IDENTITY_TOKEN_EXPIRATION_SECS,
            identity_token_file: None,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            log_enable_color: false,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            recheck_interval_secs: env_var_or_default(
                "RECHECK_INTERVAL_SECS",
                DEFAULT_RECHECK_INTERVAL_SECS,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            session_renew_margin_secs: env_var_or_default(
                "SESSION_RENEW_MARGIN_SECS",
                DEFAULT_SESSION_RENEW_MARGIN_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
            identity_token_audience: env_var_opt("IDENTITY_TOKEN_AUDIENCE"),
            identity_token_expiration_secs: env_var_or_default(
                "IDENTITY_TOKEN_EXPIRATION_SECS",
                DEFAULT_IDENTITY_TOKEN_EXPIRATION_SECS,
            ),
            identity_token_file: env_var_opt("IDENTITY_TOKEN_FILE"),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            log_enable_color: env_var_or_default_bool("LOG_ENABLE_COLOR", false),
        }
    }

    /// Engine timings derived from this configuration
    ///
    /// A zero re-check interval would requeue converged resources in a hot
    /// loop, so it falls back to the default.
    #[must_use]
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        let recheck_interval_secs = if self.recheck_interval_secs == 0 {
            DEFAULT_RECHECK_INTERVAL_SECS
        } else {
            self.recheck_interval_secs
        };
        ReconcileSettings {
            recheck_interval: Duration::from_secs(recheck_interval_secs),
            backoff_start: self.backoff_start_duration(),
            backoff_max: self.backoff_max_duration(),
        }
    }

    /// Get backoff start duration
    #[must_use]
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms.max(1))
    }

    /// Get backoff max duration
    #[must_use]
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    #[must_use]
    pub fn session_renew_margin(&self) -> Duration {
        Duration::from_secs(self.session_renew_margin_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}
