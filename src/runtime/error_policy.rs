//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{ObjectKey, Reconciler, ReconcilerError};
use crate::crd::VaultObject;
use crate::observability::metrics;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Handle reconciliation errors with exponential backoff
///
/// Backoff state is tracked per resource, so one failing resource never
/// delays another. The delay grows with each consecutive failure up to the
/// configured maximum and is reset by the next success.
pub fn handle_reconciliation_error<K: VaultObject>(
    obj: Arc<K>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<K>>,
) -> Action {
    let key = ObjectKey::from_resource(obj.as_ref());
    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %K::kind(&()),
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    let (delay, error_count) = ctx.next_backoff(&key);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

    info!(
        "🔄 Retrying {} in {}s (error count: {}, reason: {})",
        key,
        delay.as_secs_f64(),
        error_count,
        error.reason()
    );
    info!(
        "📅 Next retry scheduled: {} (trigger source: error-backoff)",
        next_trigger_time.to_rfc3339()
    );

    metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Handle an error yielded by the controller stream
///
/// Failed reconciliations and objects missing from the local store return
/// at once: their retry is already scheduled per object by
/// [`handle_reconciliation_error`], and delaying here would stop the stream
/// from driving every other object. Only watcher and runner failures are
/// classified and backed off.
pub async fn handle_controller_stream_error<E: std::fmt::Display>(
    kind: &str,
    error: &controller::Error<E, watcher::Error>,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    match error {
        controller::Error::ReconcilerFailed(source, object) => {
            debug!(object = %object, error = %source, "watch.event.reconcile_failed");
            Some(())
        }
        controller::Error::ObjectNotFound(object) => {
            debug!(object = %object, "watch.event.object_gone");
            Some(())
        }
        controller::Error::QueueError(watch_error) => {
            handle_watch_stream_error(
                kind,
                &format!("{watch_error:?}"),
                backoff_ms,
                max_backoff_ms,
                watch_restart_delay,
            )
            .await
        }
        controller::Error::RunnerError(runner_error) => {
            handle_watch_stream_error(
                kind,
                &format!("{runner_error:?}"),
                backoff_ms,
                max_backoff_ms,
                watch_restart_delay,
            )
            .await
        }
    }
}

/// How a watch stream error is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// RBAC revoked or the controller's own token expired
    Unauthorized,
    /// Resource version too old; the watcher relists
    Expired,
    /// API server throttling or storage reinitializing
    Throttled,
    /// CRD or object missing
    NotFound,
    Other,
}

impl WatchErrorKind {
    /// Classify an error by its rendered message
    ///
    /// 404 is checked before 401 because a plain-text 404 body surfaces as a
    /// deserialization error that also mentions `WatchFailed`.
    #[must_use]
    pub fn classify(error: &str) -> Self {
        let is_not_found =
            error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
        if (error.contains("401") || error.contains("Unauthorized")) && !is_not_found {
            WatchErrorKind::Unauthorized
        } else if error.contains("410")
            || error.contains("too old resource version")
            || error.contains("Expired")
            || error.contains("Gone")
        {
            WatchErrorKind::Expired
        } else if error.contains("429")
            || error.contains("storage is (re)initializing")
            || error.contains("TooManyRequests")
        {
            WatchErrorKind::Throttled
        } else if is_not_found {
            WatchErrorKind::NotFound
        } else {
            WatchErrorKind::Other
        }
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    kind: &str,
    error_string: &str,
    backoff_ms: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        resource.kind = kind,
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match WatchErrorKind::classify(error_string) {
        WatchErrorKind::Unauthorized => {
            error!(
                "❌ Watch of {} failed with 401 Unauthorized - RBAC may have been revoked or the controller token expired",
                kind
            );
            error!("   Verify the controller ClusterRole still grants list/watch on {}", kind);
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff_ms.load(Ordering::Relaxed);
            warn!(
                "API server throttling (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff_ms.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "{} not found (404) - normal if the resource was deleted, otherwise check that the CRD is installed. Error: {}",
                kind, error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}
