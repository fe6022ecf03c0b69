//! # Connection Resolution
//!
//! Merges a resource's optional `connection` block with the controller-wide
//! `VAULT_*` defaults into the settings a client is built from.

use crate::controller::reconciler::validation::parse_duration;
use crate::crd::VaultConnection;
use crate::vault::VaultError;
use std::time::Duration;
use tracing::warn;

const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";
const DEFAULT_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Controller-wide connection defaults read once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDefaults {
    pub address: String,
    pub ca_cert_pem: Option<String>,
    pub skip_verify: bool,
    pub namespace: Option<String>,
    pub timeout: Duration,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            address: DEFAULT_VAULT_ADDR.to_string(),
            ca_cert_pem: None,
            skip_verify: false,
            namespace: None,
            timeout: DEFAULT_CLIENT_TIMEOUT,
        }
    }
}

impl ConnectionDefaults {
    /// Load defaults from `VAULT_ADDR`, `VAULT_CACERT`, `VAULT_SKIP_VERIFY`,
    /// `VAULT_NAMESPACE` and `VAULT_CLIENT_TIMEOUT`
    ///
    /// `VAULT_CACERT` is a file path; an unreadable file is logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let ca_cert_pem = std::env::var("VAULT_CACERT")
            .ok()
            .filter(|path| !path.is_empty())
            .and_then(|path| match std::fs::read_to_string(&path) {
                Ok(pem) => Some(pem),
                Err(e) => {
                    warn!("Failed to read VAULT_CACERT '{}': {}", path, e);
                    None
                }
            });

        let timeout = match std::env::var("VAULT_CLIENT_TIMEOUT") {
            Ok(raw) if !raw.is_empty() => parse_duration(&raw).unwrap_or_else(|e| {
                warn!("Ignoring VAULT_CLIENT_TIMEOUT '{}': {}", raw, e);
                DEFAULT_CLIENT_TIMEOUT
            }),
            _ => DEFAULT_CLIENT_TIMEOUT,
        };

        Self {
            address: std::env::var("VAULT_ADDR")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_VAULT_ADDR.to_string()),
            ca_cert_pem,
            skip_verify: std::env::var("VAULT_SKIP_VERIFY")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(false),
            namespace: std::env::var("VAULT_NAMESPACE").ok().filter(|v| !v.is_empty()),
            timeout,
        }
    }

    /// Combine the defaults with a resource's connection override
    ///
    /// `ca_from_secret` is the CA bundle already read from the referenced
    /// TLS secret, if any. It wins over an inline `caCert`, which wins over
    /// `VAULT_CACERT`.
    pub fn resolve(
        &self,
        connection: Option<&VaultConnection>,
        ca_from_secret: Option<String>,
    ) -> Result<ResolvedConnection, VaultError> {
        let address = connection
            .and_then(|c| c.address.as_deref())
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.address)
            .trim()
            .trim_end_matches('/')
            .to_string();
        if !(address.starts_with("http://") || address.starts_with("https://")) {
            return Err(VaultError::InvalidConnection(format!(
                "address '{address}' must start with http:// or https://"
            )));
        }

        let tls = connection.and_then(|c| c.tls_config.as_ref());
        let ca_cert_pem = ca_from_secret
            .or_else(|| tls.and_then(|t| t.ca_cert.clone()))
            .filter(|pem| !pem.trim().is_empty())
            .or_else(|| self.ca_cert_pem.clone());
        let skip_verify = tls.map_or(self.skip_verify, |t| t.skip_verify || self.skip_verify);

        let namespace = connection
            .and_then(|c| c.namespace.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| self.namespace.clone());

        let timeout = match connection.and_then(|c| c.time_out.as_deref()) {
            Some(raw) if !raw.trim().is_empty() => parse_duration(raw)
                .map_err(|e| VaultError::InvalidConnection(format!("timeOut: {e}")))?,
            _ => self.timeout,
        };
        let timeout = if timeout.is_zero() { self.timeout } else { timeout };

        Ok(ResolvedConnection {
            address,
            namespace,
            ca_cert_pem,
            skip_verify,
            timeout,
        })
    }
}

/// Fully resolved connection settings for one request
///
/// Doubles as part of the session cache key: two resources share a session
/// only when they talk to the same server with the same trust settings.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ResolvedConnection {
    pub address: String,
    pub namespace: Option<String>,
    pub ca_cert_pem: Option<String>,
    pub skip_verify: bool,
    pub timeout: Duration,
}

impl std::fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("custom_ca", &self.ca_cert_pem.is_some())
            .field("skip_verify", &self.skip_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ResolvedConnection {
    /// Full URL of an API path, e.g. `auth/github/config`
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }
}
