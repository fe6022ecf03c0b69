//! # Custom Resource Definitions
//!
//! CRD types for the Vault Config Controller.
//!
//! ## Module Structure
//!
//! - `common.rs` - Connection, authentication and status types embedded in every kind
//! - `path.rs` - Vault path normalization
//! - `vault_object.rs` - The capability contract every kind implements
//! - `github_auth_engine_config.rs` - GitHub auth method mount configuration
//! - `github_team.rs` - GitHub team to policy mapping

mod common;
mod github_auth_engine_config;
mod github_team;
mod path;
mod vault_object;

pub use common::{
    Condition, KubeAuthConfiguration, SecretReference, ServiceAccountRef, TlsConfig,
    VaultConnection, VaultObjectStatus, default_auth_path, default_service_account,
};
pub use github_auth_engine_config::{
    GitHubAuthEngineConfig, GitHubAuthEngineConfigSpec, TokenType,
};
pub use github_team::{GitHubTeam, GitHubTeamSpec};
pub use path::{cleanse_path, validate_path};
pub use vault_object::{PayloadBuilder, RelatedObjects, VaultObject, is_zero_value};

/// Request body sent to Vault for one configuration path
///
/// `serde_json::Map` keeps keys sorted, so repeated builds of the same spec
/// serialize identically.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// API group shared by every kind this controller manages
pub const API_GROUP: &str = "vault-config.octopilot.io";
