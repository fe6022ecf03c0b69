//! # Watch Loop
//!
//! Controller watch loop for one resource kind. Every kind runs the same
//! loop with its own [`Reconciler`] context.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{Reconciler, reconcile};
use crate::crd::VaultObject;
use crate::runtime::error_policy::{handle_controller_stream_error, handle_reconciliation_error};
use crate::server::ServerState;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{Controller, controller, watcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{Instrument, debug, info, warn};

/// Run the controller watch loop for kind `K`
///
/// The kube-runtime controller serializes reconciliations per object and runs
/// up to `max_concurrent_reconciliations` objects in parallel. The loop
/// restarts the watch when its stream ends and exits once shutdown has
/// marked the server as not ready.
pub async fn run_watch_loop<K: VaultObject>(
    api: Api<K>,
    reconciler: Arc<Reconciler<K>>,
    server_state: Arc<ServerState>,
    config: Arc<ControllerConfig>,
) -> Result<(), anyhow::Error> {
    let kind = K::kind(&()).to_string();
    let backoff_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));
    let concurrency = u16::try_from(config.max_concurrent_reconciliations).unwrap_or(u16::MAX);

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop",
            resource.kind = kind.as_str()
        );

        info!("Starting {} controller watch loop...", kind);
        let filter_backoff = Arc::clone(&backoff_ms);
        let filter_config = Arc::clone(&config);
        let filter_kind = kind.clone();
        Controller::new(api.clone(), watcher::Config::default().any_semantic())
            .with_config(controller::Config::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(
                reconcile::<K>,
                handle_reconciliation_error::<K>,
                Arc::clone(&reconciler),
            )
            .filter_map(move |event| {
                let backoff = Arc::clone(&filter_backoff);
                let config = Arc::clone(&filter_config);
                let kind = filter_kind.clone();
                async move {
                    match &event {
                        Ok((object, action)) => {
                            backoff.store(config.backoff_start_ms, Ordering::Relaxed);
                            debug!(object = %object, action = ?action, "watch.event.reconciled");
                            Some(event)
                        }
                        Err(e) => {
                            let outcome = handle_controller_stream_error(
                                &kind,
                                e,
                                &backoff,
                                config.backoff_max_ms,
                                config.watch_restart_delay_duration(),
                            )
                            .await;
                            outcome.map(|()| event)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting {} watch loop", kind);
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "{} watch stream ended, restarting in {} seconds...",
            kind,
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("{} controller stopped gracefully", kind);
    Ok(())
}
