//! # CRD Generator
//!
//! Prints the CustomResourceDefinition YAML of every kind the controller
//! manages, separated by `---`.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/vault-config.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use kube::core::CustomResourceExt;
use vault_config_controller::crd::{GitHubAuthEngineConfig, GitHubTeam};

fn main() -> Result<()> {
    let crds = [GitHubAuthEngineConfig::crd(), GitHubTeam::crd()];
    let documents = crds
        .iter()
        .map(|crd| serde_yaml::to_string(crd).context("Failed to serialize CRD"))
        .collect::<Result<Vec<_>>>()?;
    print!("{}", documents.join("---\n"));
    Ok(())
}
