//! # Vault Errors
//!
//! Classification of failures talking to Vault. The reconciler decides on
//! retry, re-authentication and condition reasons from the variant alone.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum VaultError {
    /// The token was rejected (HTTP 401, or 403 "invalid token")
    #[error("Vault rejected the token (HTTP {status}): {message}")]
    AuthRejected { status: u16, message: String },

    /// The token is valid but lacks a capability on the path
    #[error("permission denied on '{path}': {message}")]
    PermissionDenied { path: String, message: String },

    /// The path does not exist (only surfaced for writes and deletes)
    #[error("'{path}' not found")]
    NotFound { path: String },

    /// Server busy, sealed, rate limited, or the network failed
    #[error("transient failure on '{path}'{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transient {
        path: String,
        status: Option<u16>,
        message: String,
    },

    /// Vault refused the request, e.g. a malformed payload
    #[error("request to '{path}' failed (HTTP {status}): {message}")]
    Request {
        path: String,
        status: u16,
        message: String,
    },

    /// The response did not have the expected shape
    #[error("invalid response from '{path}': {message}")]
    InvalidResponse { path: String, message: String },

    /// The connection settings could not be turned into a client
    #[error("invalid Vault connection: {0}")]
    InvalidConnection(String),
}

impl VaultError {
    /// Whether a fresh login might make the same request succeed
    ///
    /// Vault answers 403 both for expired tokens and for missing policies, so
    /// permission errors also get one retry with a new session.
    #[must_use]
    pub fn should_reauthenticate(&self) -> bool {
        matches!(
            self,
            VaultError::AuthRejected { .. } | VaultError::PermissionDenied { .. }
        )
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, VaultError::Transient { .. })
    }

    /// Short machine readable reason used in conditions and metrics
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            VaultError::AuthRejected { .. } => "AuthRejected",
            VaultError::PermissionDenied { .. } => "PermissionDenied",
            VaultError::NotFound { .. } => "NotFound",
            VaultError::Transient { .. } => "Transient",
            VaultError::Request { .. } => "RequestRejected",
            VaultError::InvalidResponse { .. } => "InvalidResponse",
            VaultError::InvalidConnection(_) => "InvalidConnection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reauth_classification() {
        let rejected = VaultError::AuthRejected {
            status: 401,
            message: "missing client token".to_string(),
        };
        let denied = VaultError::PermissionDenied {
            path: "auth/github/config".to_string(),
            message: "permission denied".to_string(),
        };
        let busy = VaultError::Transient {
            path: "auth/github/config".to_string(),
            status: Some(503),
            message: "Vault is sealed".to_string(),
        };

        assert!(rejected.should_reauthenticate());
        assert!(denied.should_reauthenticate());
        assert!(!busy.should_reauthenticate());
        assert!(busy.is_transient());
        assert!(busy.to_string().contains("HTTP 503"));
    }
}
