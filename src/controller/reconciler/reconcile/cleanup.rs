//! Finalization of a resource marked for deletion.

use super::{
    FINALIZER, checked_path, has_finalizer, remote_error, report_error, resolve_connection,
};
use crate::controller::reconciler::store::ObjectKey;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::VaultObject;
use crate::observability::metrics;
use crate::vault::{SessionCallError, SessionKey, VaultError};
use kube_runtime::controller::Action;
use tracing::{error, info};

/// Remove the Vault configuration (when the kind allows it), then the finalizer
///
/// The finalizer stays in place until the remote delete has succeeded, so a
/// resource is never released while its cleanup is outstanding.
pub(super) async fn finalize<K: VaultObject>(
    obj: K,
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<Action, ReconcilerError> {
    if !has_finalizer(&obj) {
        return Ok(Action::await_change());
    }

    if obj.is_deletable() {
        if let Err(e) = delete_remote(&obj, key, ctx).await {
            error!("Cleanup of {} failed, keeping finalizer: {}", key, e);
            report_error(ctx, &obj, &e).await;
            return Err(e);
        }
        metrics::increment_remote_changes(&K::kind(&()), "deleted");
    } else {
        info!(
            "{} is not deletable, leaving Vault configuration at '{}' in place",
            K::kind(&()),
            obj.resolve_path()
        );
    }

    ctx.store
        .remove_finalizer(&obj, FINALIZER)
        .await
        .map_err(ReconcilerError::Store)?;
    ctx.forget_backoff(key);
    info!("Finalized {} {}", K::kind(&()), key);
    Ok(Action::await_change())
}

async fn delete_remote<K: VaultObject>(
    obj: &K,
    key: &ObjectKey,
    ctx: &Reconciler<K>,
) -> Result<(), ReconcilerError> {
    let path = checked_path(obj)?;
    let connection = resolve_connection(obj, key, ctx).await?;
    let session_key = SessionKey::new(connection.clone(), obj.authentication(), &key.namespace);

    let vault = ctx.vault.as_ref();
    let connection = &connection;
    let vault_path = path.as_str();

    let result = ctx
        .sessions
        .with_session(&session_key, |token| async move {
            vault.delete(connection, &token, vault_path).await
        })
        .await;

    match result {
        Ok(()) => {
            info!("Deleted Vault configuration at '{}'", path);
            Ok(())
        }
        Err(SessionCallError::Vault(VaultError::NotFound { .. })) => {
            info!("Vault configuration at '{}' was already gone", path);
            Ok(())
        }
        Err(SessionCallError::Vault(source)) => Err(ReconcilerError::Cleanup { path, source }),
        Err(e) => Err(remote_error("delete", &path, e)),
    }
}
