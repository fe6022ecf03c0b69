//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server startup,
//! Kubernetes client, and the engine context for every kind.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::{KubeRelatedObjects, KubeResourceStore, Reconciler};
use crate::crd::{GitHubAuthEngineConfig, GitHubTeam, RelatedObjects, VaultObject};
use crate::observability;
use crate::server::{ServerState, start_server};
use crate::vault::{
    ConnectionDefaults, FileTokenSource, HttpVaultClient, IdentityTokenSource,
    KubeTokenRequestSource, SessionProvider, VaultApi,
};
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    pub engine_configs: Arc<Reconciler<GitHubAuthEngineConfig>>,
    pub teams: Arc<Reconciler<GitHubTeam>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - One engine context per kind, sharing a single session cache
pub async fn initialize(
    controller_config: &ControllerConfig,
    server_config: &ServerConfig,
) -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection. Fails only if a
    // provider is already installed, which is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    init_tracing(controller_config);

    info!("Starting Vault Config Controller");
    info!(
        "Build info: datetime={}, git_hash={}",
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_port = server_config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let identity: Arc<dyn IdentityTokenSource> = match &controller_config.identity_token_file {
        Some(path) => {
            info!("Reading Vault login identity from {}", path);
            Arc::new(FileTokenSource::new(path))
        }
        None => Arc::new(KubeTokenRequestSource::new(
            client.clone(),
            controller_config.identity_token_audience.clone(),
            controller_config.identity_token_expiration_secs,
        )),
    };

    let vault: Arc<dyn VaultApi> = Arc::new(HttpVaultClient::new());
    let sessions = Arc::new(SessionProvider::new(
        Arc::clone(&vault),
        identity,
        controller_config.session_renew_margin(),
    ));
    let related: Arc<dyn RelatedObjects> = Arc::new(KubeRelatedObjects::new(client.clone()));
    let connection_defaults = ConnectionDefaults::from_env();
    info!("Default Vault address: {}", connection_defaults.address);

    let context = EngineParts {
        client: &client,
        related: &related,
        vault: &vault,
        sessions: &sessions,
        connection_defaults: &connection_defaults,
        config: controller_config,
    };
    let engine_configs = Arc::new(context.reconciler::<GitHubAuthEngineConfig>());
    let teams = Arc::new(context.reconciler::<GitHubTeam>());

    info!("Controller initialized, starting watch loops...");
    Ok(InitializationResult {
        client,
        engine_configs,
        teams,
        server_state,
    })
}

/// Collaborators shared by the engine of every kind
struct EngineParts<'a> {
    client: &'a Client,
    related: &'a Arc<dyn RelatedObjects>,
    vault: &'a Arc<dyn VaultApi>,
    sessions: &'a Arc<SessionProvider>,
    connection_defaults: &'a ConnectionDefaults,
    config: &'a ControllerConfig,
}

impl EngineParts<'_> {
    fn reconciler<K: VaultObject>(&self) -> Reconciler<K> {
        Reconciler::new(
            Arc::new(KubeResourceStore::<K>::new(self.client.clone())),
            Arc::clone(self.related),
            Arc::clone(self.vault),
            Arc::clone(self.sessions),
            self.connection_defaults.clone(),
            self.config.reconcile_settings(),
        )
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `LOG_LEVEL`.
fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "vault_config_controller={}",
            config.log_level.to_lowercase()
        ))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.with_ansi(config.log_enable_color).try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
