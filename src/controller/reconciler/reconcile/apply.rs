//! Convergence of an active resource: make Vault hold the desired payload.

use super::{
    FINALIZER, checked_path, has_finalizer, remote_error, report_error, resolve_connection,
    write_conditions,
};
use crate::controller::reconciler::status::ConditionSet;
use crate::controller::reconciler::store::ObjectKey;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::VaultObject;
use crate::observability::metrics;
use crate::vault::{ReadOutcome, SessionKey};
use kube::Resource;
use kube_runtime::controller::Action;
use tracing::{debug, error, info};

/// What a successful pass did in Vault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncOutcome {
    Created,
    Updated,
    Unchanged,
}

impl SyncOutcome {
    fn as_str(self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
        }
    }
}

pub(super) async fn apply<K: VaultObject>(
    obj: K,
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<Action, ReconcilerError> {
    let obj = if has_finalizer(&obj) {
        obj
    } else {
        debug!("Adding finalizer {}", FINALIZER);
        ctx.store
            .add_finalizer(&obj, FINALIZER)
            .await
            .map_err(ReconcilerError::Store)?
    };

    match sync(obj.clone(), key, ctx).await {
        Ok((path, outcome)) => {
            let mut conditions = ConditionSet::from_existing(obj.conditions());
            conditions.mark_ready(
                &format!("Vault configuration at '{path}' is in sync"),
                obj.meta().generation,
            );
            write_conditions(ctx, &obj, &conditions).await?;

            metrics::increment_remote_changes(&K::kind(&()), outcome.as_str());
            if ctx.reset_backoff(key) {
                info!("🔄 Backoff reset for {}: returning to normal schedule", key);
            }
            info!(
                "✅ Reconciled {} {} ({} '{}')",
                K::kind(&()),
                key,
                outcome.as_str(),
                path
            );
            metrics::increment_requeues_total("recheck");
            Ok(Action::requeue(ctx.settings.recheck_interval))
        }
        Err(e) => {
            error!("Reconciliation of {} failed: {}", key, e);
            report_error(ctx, &obj, &e).await;
            Err(e)
        }
    }
}

/// Bring the Vault path in line with the resource, writing only on drift
async fn sync<K: VaultObject>(
    mut obj: K,
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<(String, SyncOutcome), ReconcilerError> {
    obj.prepare_internal_values(ctx.related.as_ref())
        .await
        .map_err(ReconcilerError::Preparation)?;

    let path = checked_path(&obj)?;
    let connection = resolve_connection(&obj, key, ctx).await?;
    let session_key = SessionKey::new(connection.clone(), obj.authentication(), &key.namespace);

    let vault = ctx.vault.as_ref();
    let connection = &connection;
    let vault_path = path.as_str();

    let remote = ctx
        .sessions
        .with_session(&session_key, |token| async move {
            vault.read(connection, &token, vault_path).await
        })
        .await
        .map_err(|e| remote_error("read", &path, e))?;

    let payload = obj.build_payload();
    let payload = &payload;
    let outcome = match remote {
        ReadOutcome::NotFound => {
            info!("Creating Vault configuration at '{}'", path);
            ctx.sessions
                .with_session(&session_key, |token| async move {
                    vault.create(connection, &token, vault_path, payload).await
                })
                .await
                .map_err(|e| remote_error("create", &path, e))?;
            SyncOutcome::Created
        }
        ReadOutcome::Found(existing) if obj.is_equivalent_to_desired_state(&existing) => {
            debug!("Vault configuration at '{}' already matches", path);
            SyncOutcome::Unchanged
        }
        ReadOutcome::Found(_) => {
            info!("Vault configuration at '{}' drifted, updating", path);
            ctx.sessions
                .with_session(&session_key, |token| async move {
                    vault.update(connection, &token, vault_path, payload).await
                })
                .await
                .map_err(|e| remote_error("update", &path, e))?;
            SyncOutcome::Updated
        }
    };

    Ok((path, outcome))
}
