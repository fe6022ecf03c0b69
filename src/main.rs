//! # Vault Config Controller
//!
//! A Kubernetes controller that keeps Vault configuration in line with
//! declarative custom resources.
//!
//! ## Overview
//!
//! 1. **Watching resources** - One controller per kind (`GitHubAuthEngineConfig`, `GitHubTeam`)
//! 2. **Logging in** - Exchanges a service account token at a Vault Kubernetes auth mount
//! 3. **Converging** - Reads the Vault path and writes only when it differs from the spec
//! 4. **Cleaning up** - Removes deletable configuration before releasing the finalizer
//!
//! Settings come from environment variables (see `config`); the flags below
//! override the most common ones.

use anyhow::Result;
use clap::Parser;
use vault_config_controller::config::{ControllerConfig, ServerConfig};
use vault_config_controller::runtime;

#[derive(Debug, Parser)]
#[command(name = "vault-config-controller", version, about)]
struct Args {
    /// Only watch resources in this namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Port for /metrics, /healthz and /readyz
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Log format (json or text)
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut controller_config = ControllerConfig::from_env();
    let mut server_config = ServerConfig::from_env();
    if let Some(namespace) = args.namespace {
        controller_config.watch_namespace = Some(namespace);
    }
    if let Some(port) = args.metrics_port {
        server_config.metrics_port = port;
    }
    if let Some(format) = args.log_format {
        controller_config.log_format = format;
    }

    runtime::run(controller_config, server_config).await
}
