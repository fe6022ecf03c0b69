//! # Identity Tokens
//!
//! Source of the service account JWT presented at the Vault Kubernetes auth
//! login. Production uses the TokenRequest API so each resource logs in as a
//! service account of its own namespace.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenRequest, TokenRequestSpec};
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::{Api, PostParams};
use kube::Client;
use tracing::debug;

/// Which service account to mint a token for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequest<'a> {
    pub namespace: &'a str,
    pub service_account: &'a str,
    /// Requested audiences; empty means the source's default
    pub audiences: &'a [String],
}

#[async_trait]
pub trait IdentityTokenSource: Send + Sync {
    /// Return a JWT for the requested service account
    async fn identity_token(&self, request: &IdentityRequest<'_>) -> Result<String>;
}

/// Mints short-lived tokens with the `serviceaccounts/token` sub-resource
pub struct KubeTokenRequestSource {
    client: Client,
    default_audience: Option<String>,
    expiration_seconds: i64,
}

impl std::fmt::Debug for KubeTokenRequestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTokenRequestSource")
            .field("default_audience", &self.default_audience)
            .field("expiration_seconds", &self.expiration_seconds)
            .finish_non_exhaustive()
    }
}

impl KubeTokenRequestSource {
    #[must_use]
    pub fn new(client: Client, default_audience: Option<String>, expiration_seconds: i64) -> Self {
        Self {
            client,
            default_audience,
            expiration_seconds,
        }
    }

    fn audiences(&self, requested: &[String]) -> Vec<String> {
        if requested.is_empty() {
            self.default_audience.iter().cloned().collect()
        } else {
            requested.to_vec()
        }
    }
}

#[async_trait]
impl IdentityTokenSource for KubeTokenRequestSource {
    async fn identity_token(&self, request: &IdentityRequest<'_>) -> Result<String> {
        let api: Api<ServiceAccount> = Api::namespaced(self.client.clone(), request.namespace);
        let token_request = TokenRequest {
            spec: TokenRequestSpec {
                audiences: self.audiences(request.audiences),
                expiration_seconds: Some(self.expiration_seconds),
                ..TokenRequestSpec::default()
            },
            ..TokenRequest::default()
        };

        let response = api
            .create_token_request(request.service_account, &PostParams::default(), &token_request)
            .await
            .with_context(|| {
                format!(
                    "Failed to request a token for service account {}/{}",
                    request.namespace, request.service_account
                )
            })?;

        let token = response
            .status
            .map(|status| status.token)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "TokenRequest for {}/{} returned no token",
                    request.namespace,
                    request.service_account
                )
            })?;
        debug!(
            "Issued identity token for service account {}/{}",
            request.namespace, request.service_account
        );
        Ok(token)
    }
}

/// Reads a projected token from disk on every call
///
/// Used when the controller runs with a single shared identity
/// (`IDENTITY_TOKEN_FILE`). The requested service account is ignored.
#[derive(Debug, Clone)]
pub struct FileTokenSource {
    path: std::path::PathBuf,
}

impl FileTokenSource {
    #[must_use]
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl IdentityTokenSource for FileTokenSource {
    async fn identity_token(&self, _request: &IdentityRequest<'_>) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read identity token from {}", self.path.display()))?;
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Identity token file {} is empty", self.path.display());
        }
        Ok(token.to_string())
    }
}
