//! # Shared Spec and Status Types
//!
//! Types embedded in every Vault configuration resource: how to reach Vault,
//! how to log in to it, and the observed status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection settings for a Vault server
///
/// Every field is optional. Missing fields fall back to the controller's
/// environment (`VAULT_ADDR`, `VAULT_CACERT`, `VAULT_SKIP_VERIFY`,
/// `VAULT_NAMESPACE`, `VAULT_CLIENT_TIMEOUT`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultConnection {
    /// Vault address, e.g. `https://vault.vault.svc:8200`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// TLS trust configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_config: Option<TlsConfig>,
    /// Vault Enterprise namespace sent as `X-Vault-Namespace`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Per-request timeout, e.g. `10s` or `1m`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_out: Option<String>,
}

/// TLS trust material for the Vault connection
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    /// PEM encoded CA bundle used to verify the Vault server certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    /// Secret in the resource namespace holding the CA bundle under `ca.crt`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret: Option<SecretReference>,
    /// Disable server certificate verification (development only)
    #[serde(default)]
    pub skip_verify: bool,
}

/// Reference to a Secret in the same namespace as the resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
}

/// Kubernetes auth method login settings
///
/// The controller requests a token for `serviceAccount` in the resource's
/// namespace and presents it, together with `role`, at
/// `auth/{path}/login`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubeAuthConfiguration {
    /// Mount path of the Kubernetes auth method
    #[serde(default = "default_auth_path")]
    pub path: String,
    /// Vault role to log in with
    pub role: String,
    /// Service account whose token is exchanged for a Vault token
    #[serde(default = "default_service_account")]
    pub service_account: ServiceAccountRef,
    /// Vault namespace to log in to, when it differs from the connection namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Audiences requested for the service account token
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,
}

/// Reference to a service account in the resource namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountRef {
    pub name: String,
}

#[must_use]
pub fn default_auth_path() -> String {
    "kubernetes".to_string()
}

#[must_use]
pub fn default_service_account() -> ServiceAccountRef {
    ServiceAccountRef {
        name: "default".to_string(),
    }
}

/// Observed state shared by every kind
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultObjectStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (Ready, Error)
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last time the status changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine readable reason for the last transition
    #[serde(default)]
    pub reason: Option<String>,
    /// Human readable detail
    #[serde(default)]
    pub message: Option<String>,
    /// Generation of the spec this condition was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
