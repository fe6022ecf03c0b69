//! # GitHubTeam
//!
//! Mapping of a GitHub team to Vault policies, stored at
//! `auth/{path}/map/teams/{teamName}`.

use crate::crd::{
    Condition, KubeAuthConfiguration, Payload, PayloadBuilder, VaultConnection, VaultObject,
    cleanse_path,
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// GitHubTeam Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: vault-config.octopilot.io/v1alpha1
/// kind: GitHubTeam
/// metadata:
///   name: platform
///   namespace: vault-admin
/// spec:
///   authentication:
///     role: vault-admin
///   path: github
///   teamName: platform-team
///   policies: ["platform", "readonly"]
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "GitHubTeam",
    group = "vault-config.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::VaultObjectStatus",
    shortname = "ghteam",
    printcolumn = r#"{"name":"Team", "type":"string", "jsonPath":".spec.teamName"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GitHubTeamSpec {
    /// Vault connection override; controller defaults apply when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<VaultConnection>,
    /// Kubernetes auth login used to execute this request
    pub authentication: KubeAuthConfiguration,
    /// Mount path of the GitHub auth method
    pub path: String,
    /// GitHub team name in slugified form
    pub team_name: String,
    /// Policies assigned to members of the team
    #[serde(default)]
    pub policies: Vec<String>,
}

#[async_trait]
impl VaultObject for GitHubTeam {
    fn connection(&self) -> Option<&VaultConnection> {
        self.spec.connection.as_ref()
    }

    fn authentication(&self) -> &KubeAuthConfiguration {
        &self.spec.authentication
    }

    fn resolve_path(&self) -> String {
        cleanse_path(&format!(
            "auth/{}/map/teams/{}",
            self.spec.path, self.spec.team_name
        ))
    }

    fn build_payload(&self) -> Payload {
        // Vault stores the mapping as a single comma separated string
        PayloadBuilder::new()
            .required("value", self.spec.policies.join(","))
            .build()
    }

    fn is_deletable(&self) -> bool {
        true
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map_or(&[], |status| status.conditions.as_slice())
    }
}
