//! # GitHubAuthEngineConfig
//!
//! Configuration of a GitHub auth method mount, stored at
//! `auth/{path}/config`. Vault has no way to "unconfigure" a mount, so this
//! kind is not deletable: removing the resource leaves the config in place.

use crate::controller::reconciler::validation::parse_duration;
use crate::crd::{
    Condition, KubeAuthConfiguration, Payload, PayloadBuilder, RelatedObjects, VaultConnection,
    VaultObject, cleanse_path,
};
use anyhow::Context;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GitHubAuthEngineConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: vault-config.octopilot.io/v1alpha1
/// kind: GitHubAuthEngineConfig
/// metadata:
///   name: github
///   namespace: vault-admin
/// spec:
///   authentication:
///     path: kubernetes
///     role: vault-admin
///   path: github
///   organization: octopilot
///   tokenTTL: 1h
///   tokenPolicies: ["developers"]
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "GitHubAuthEngineConfig",
    group = "vault-config.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::VaultObjectStatus",
    shortname = "ghconfig",
    printcolumn = r#"{"name":"Path", "type":"string", "jsonPath":".spec.path"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GitHubAuthEngineConfigSpec {
    /// Vault connection override; controller defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<VaultConnection>,
    /// Kubernetes auth login used to execute this request
    pub authentication: KubeAuthConfiguration,
    /// Mount path of the GitHub auth method.
    /// The final Vault path is `auth/{path}/config`.
    pub path: String,
    /// Organization users must be part of to authenticate. Always sent.
    pub organization: String,
    /// Organization ID; Vault looks it up when not provided
    #[serde(default, rename = "organizationID")]
    pub organization_id: i64,
    /// API endpoint, for GitHub Enterprise
    #[serde(default, rename = "baseURL")]
    pub base_url: String,
    /// Incremental lifetime for generated tokens, e.g. `1h`
    #[serde(default, rename = "tokenTTL")]
    pub token_ttl: String,
    /// Maximum lifetime for generated tokens
    #[serde(default, rename = "tokenMaxTTL")]
    pub token_max_ttl: String,
    /// Policies encoded onto generated tokens
    #[serde(default)]
    pub token_policies: Vec<String>,
    /// CIDR blocks allowed to authenticate
    #[serde(default, rename = "tokenBoundCIDRs")]
    pub token_bound_cidrs: Vec<String>,
    /// Hard cap on token lifetime
    #[serde(default, rename = "tokenExplicitMaxTTL")]
    pub token_explicit_max_ttl: String,
    /// Do not attach the `default` policy to generated tokens
    #[serde(default)]
    pub token_no_default_policy: bool,
    /// Maximum uses per token; 0 means unlimited
    #[serde(default)]
    pub token_num_uses: i64,
    /// Period for periodic tokens
    #[serde(default)]
    pub token_period: String,
    /// Type of token to generate
    #[serde(default)]
    pub token_type: TokenType,
}

/// Token type generated by the auth method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum TokenType {
    /// Use the mount's tuned default
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "batch")]
    Batch,
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "default-service")]
    DefaultService,
    #[serde(rename = "default-batch")]
    DefaultBatch,
}

impl TokenType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Unset => "",
            TokenType::Service => "service",
            TokenType::Batch => "batch",
            TokenType::Default => "default",
            TokenType::DefaultService => "default-service",
            TokenType::DefaultBatch => "default-batch",
        }
    }
}

const DURATION_FIELDS: &[&str] = &[
    "token_ttl",
    "token_max_ttl",
    "token_explicit_max_ttl",
    "token_period",
];

/// Add a duration field as whole seconds, leaving it out when unset or zero
fn with_duration(builder: PayloadBuilder, key: &str, raw: &str) -> PayloadBuilder {
    if raw.trim().is_empty() {
        return builder;
    }
    match parse_duration(raw) {
        Ok(d) if d.as_secs() > 0 => builder.optional(key, format!("{}s", d.as_secs())),
        Ok(_) => builder,
        // Rejected earlier by prepare_internal_values; pass through unchanged
        Err(_) => builder.optional(key, raw),
    }
}

#[async_trait]
impl VaultObject for GitHubAuthEngineConfig {
    fn connection(&self) -> Option<&VaultConnection> {
        self.spec.connection.as_ref()
    }

    fn authentication(&self) -> &KubeAuthConfiguration {
        &self.spec.authentication
    }

    fn resolve_path(&self) -> String {
        cleanse_path(&format!("auth/{}/config", self.spec.path))
    }

    fn build_payload(&self) -> Payload {
        let spec = &self.spec;
        let builder = PayloadBuilder::new()
            .required("organization", spec.organization.clone())
            .optional("organization_id", spec.organization_id)
            .optional("base_url", spec.base_url.clone())
            .optional("token_policies", spec.token_policies.clone())
            .optional("token_bound_cidrs", spec.token_bound_cidrs.clone())
            .optional("token_no_default_policy", spec.token_no_default_policy)
            .optional("token_num_uses", spec.token_num_uses)
            .optional("token_type", spec.token_type.as_str());
        let builder = with_duration(builder, "token_ttl", &spec.token_ttl);
        let builder = with_duration(builder, "token_max_ttl", &spec.token_max_ttl);
        let builder = with_duration(
            builder,
            "token_explicit_max_ttl",
            &spec.token_explicit_max_ttl,
        );
        with_duration(builder, "token_period", &spec.token_period).build()
    }

    fn is_deletable(&self) -> bool {
        false
    }

    fn duration_fields(&self) -> &'static [&'static str] {
        DURATION_FIELDS
    }

    async fn prepare_internal_values(&mut self, _related: &dyn RelatedObjects) -> anyhow::Result<()> {
        let spec = &self.spec;
        for (field, raw) in [
            ("tokenTTL", &spec.token_ttl),
            ("tokenMaxTTL", &spec.token_max_ttl),
            ("tokenExplicitMaxTTL", &spec.token_explicit_max_ttl),
            ("tokenPeriod", &spec.token_period),
        ] {
            if raw.trim().is_empty() {
                continue;
            }
            let duration = parse_duration(raw).with_context(|| format!("invalid {field} '{raw}'"))?;
            // Vault stores these in whole seconds
            if duration.subsec_nanos() != 0 {
                anyhow::bail!("{field} must be a whole number of seconds, got '{raw}'");
            }
        }
        if spec.token_num_uses < 0 {
            anyhow::bail!("tokenNumUses must not be negative, got {}", spec.token_num_uses);
        }
        if spec.organization_id < 0 {
            anyhow::bail!("organizationID must not be negative, got {}", spec.organization_id);
        }
        Ok(())
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.conditions.as_slice())
    }
}
