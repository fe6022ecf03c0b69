//! # Runtime
//!
//! Process startup and the per-kind watch loops.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, engine contexts
//! - `watch_loop`: kube-runtime controller for one kind, restarted on stream end
//! - `error_policy`: requeue delays for failed reconciliations and watch errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

use crate::config::{ControllerConfig, ServerConfig};
use crate::crd::VaultObject;
use anyhow::Result;
use kube::api::Api;
use kube::Client;
use std::sync::Arc;
use tracing::info;

/// Run the controller until a shutdown signal arrives
///
/// One watch loop per kind runs concurrently. The first loop to fail stops
/// the process.
pub async fn run(controller_config: ControllerConfig, server_config: ServerConfig) -> Result<()> {
    let init = initialization::initialize(&controller_config, &server_config).await?;
    let config = Arc::new(controller_config);

    match &config.watch_namespace {
        Some(namespace) => info!("Watching namespace {}", namespace),
        None => info!("Watching all namespaces"),
    }

    let shutdown_state = Arc::clone(&init.server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_state.set_ready(false);
            info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
        }
    });

    tokio::try_join!(
        watch_loop::run_watch_loop(
            api(&init.client, config.watch_namespace.as_deref()),
            Arc::clone(&init.engine_configs),
            Arc::clone(&init.server_state),
            Arc::clone(&config),
        ),
        watch_loop::run_watch_loop(
            api(&init.client, config.watch_namespace.as_deref()),
            Arc::clone(&init.teams),
            Arc::clone(&init.server_state),
            Arc::clone(&config),
        ),
    )?;

    info!("Vault Config Controller stopped");
    Ok(())
}

fn api<K: VaultObject>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}
