//! # Reconcile
//!
//! Entry point called by the controller for every resource event and requeue.

mod apply;
mod cleanup;

use crate::controller::reconciler::status::ConditionSet;
use crate::controller::reconciler::store::ObjectKey;
use crate::controller::reconciler::types::{Lifecycle, Reconciler, ReconcilerError};
use crate::crd::{VaultObject, validate_path};
use crate::observability::metrics;
use crate::vault::{ResolvedConnection, SessionCallError};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

/// Finalizer holding resources until their Vault configuration is cleaned up
pub const FINALIZER: &str = "vault-config.octopilot.io/finalizer";

/// Reconcile one resource delivered by the controller
pub async fn reconcile<K: VaultObject>(
    obj: Arc<K>,
    ctx: Arc<Reconciler<K>>,
) -> Result<Action, ReconcilerError> {
    let key = ObjectKey::from_resource(obj.as_ref());
    let kind = K::kind(&()).to_string();
    let span = info_span!(
        "controller.reconcile",
        resource.kind = kind.as_str(),
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        resource.generation = obj.meta().generation.unwrap_or(0)
    );

    metrics::increment_reconciliations(&kind);
    let start = Instant::now();
    let result = reconcile_object(&key, ctx.as_ref()).instrument(span).await;
    metrics::observe_reconciliation_duration(&kind, start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        metrics::increment_reconciliation_errors(&kind, e.reason());
    }
    result
}

/// One reconciliation attempt for the resource at `key`
///
/// The object delivered by the watch may be stale, so the resource is always
/// re-read first.
pub async fn reconcile_object<K: VaultObject>(
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<Action, ReconcilerError> {
    let Some(obj) = ctx.store.get(key).await.map_err(ReconcilerError::Store)? else {
        debug!("{} {} no longer exists, nothing to do", K::kind(&()), key);
        ctx.forget_backoff(key);
        return Ok(Action::await_change());
    };

    match Lifecycle::of(&obj) {
        Lifecycle::PendingDeletion => cleanup::finalize(obj, key, ctx).await,
        Lifecycle::Active => apply::apply(obj, key, ctx).await,
    }
}

fn has_finalizer<K: VaultObject>(obj: &K) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|finalizers| finalizers.iter().any(|f| f == FINALIZER))
}

/// Resolved Vault path of `obj`, rejected if it would address the wrong place
fn checked_path<K: VaultObject>(obj: &K) -> Result<String, ReconcilerError> {
    let path = obj.resolve_path();
    validate_path(&path).map_err(|reason| ReconcilerError::InvalidPath {
        path: path.clone(),
        reason,
    })?;
    Ok(path)
}

/// Connection settings for `obj`, reading the CA bundle from its TLS secret when set
async fn resolve_connection<K: VaultObject>(
    obj: &K,
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<ResolvedConnection, ReconcilerError> {
    let connection = obj.connection();
    let tls_secret = connection
        .and_then(|c| c.tls_config.as_ref())
        .and_then(|tls| tls.tls_secret.as_ref());

    let ca_from_secret = match tls_secret {
        Some(secret) => {
            let pem = ctx
                .related
                .secret_value(&key.namespace, &secret.name, "ca.crt")
                .await
                .map_err(ReconcilerError::Preparation)?
                .ok_or_else(|| {
                    ReconcilerError::Preparation(anyhow::anyhow!(
                        "secret {}/{} has no ca.crt key",
                        key.namespace,
                        secret.name
                    ))
                })?;
            Some(pem)
        }
        None => None,
    };

    ctx.connection_defaults
        .resolve(connection, ca_from_secret)
        .map_err(ReconcilerError::Connection)
}

fn remote_error(operation: &'static str, path: &str, error: SessionCallError) -> ReconcilerError {
    match error {
        SessionCallError::Session(e) => ReconcilerError::Session(e),
        SessionCallError::Vault(source) => ReconcilerError::Remote {
            operation,
            path: path.to_string(),
            source,
        },
    }
}

/// Write `conditions` unless the resource already records exactly them
async fn write_conditions<K: VaultObject>(
    ctx: &Reconciler<K>,
    obj: &K,
    conditions: &ConditionSet,
) -> Result<(), ReconcilerError> {
    if !conditions.differs_from(obj.conditions()) {
        debug!("Skipping status update - conditions unchanged");
        return Ok(());
    }
    ctx.store
        .write_conditions(obj, conditions.get_conditions())
        .await
        .map_err(ReconcilerError::Store)
}

/// Record `error` on the resource, keeping the original error if the write fails
async fn report_error<K: VaultObject>(ctx: &Reconciler<K>, obj: &K, error: &ReconcilerError) {
    let mut conditions = ConditionSet::from_existing(obj.conditions());
    conditions.mark_error(error.reason(), &error.to_string(), obj.meta().generation);
    if let Err(status_error) = write_conditions(ctx, obj, &conditions).await {
        warn!("Failed to record error condition: {}", status_error);
    }
}

#[cfg(test)]
mod tests;
