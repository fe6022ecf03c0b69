//! # Sessions
//!
//! Cache of Vault tokens obtained through Kubernetes auth logins.
//!
//! Each distinct [`SessionKey`] owns a slot guarded by its own async mutex.
//! A slot moves through `Unauthenticated -> (login) -> Valid -> Expired ->
//! (login) -> Valid`; the login step runs while the slot's mutex is held, so
//! concurrent reconciliations sharing a key wait for one login instead of
//! each performing their own. Different keys never wait on each other.

use crate::crd::KubeAuthConfiguration;
use crate::observability::metrics;
use crate::vault::{
    IdentityRequest, IdentityTokenSource, LoginRequest, ResolvedConnection, VaultApi, VaultError,
};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Everything that determines which token a login produces
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub connection: ResolvedConnection,
    pub mount: String,
    pub role: String,
    pub service_account: String,
    /// Namespace of the resource, and so of the service account
    pub namespace: String,
    /// Vault namespace for the login call, when it differs from the connection
    pub login_namespace: Option<String>,
    pub audiences: Vec<String>,
}

impl SessionKey {
    #[must_use]
    pub fn new(
        connection: ResolvedConnection,
        auth: &KubeAuthConfiguration,
        resource_namespace: &str,
    ) -> Self {
        let mut audiences = auth.audiences.clone();
        audiences.sort();
        audiences.dedup();
        Self {
            connection,
            mount: auth.path.trim_matches('/').to_string(),
            role: auth.role.clone(),
            service_account: auth.service_account.name.clone(),
            namespace: resource_namespace.to_string(),
            login_namespace: auth.namespace.clone().filter(|n| !n.is_empty()),
            audiences,
        }
    }
}

/// A Vault token with its local expiry
#[derive(Clone)]
pub struct Session {
    token: String,
    /// `None` for tokens without a lease
    expires_at: Option<Instant>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    fn is_usable(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

enum SessionState {
    Unauthenticated,
    Valid(Session),
    Expired,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to obtain an identity token for service account {namespace}/{service_account}: {source:#}")]
    Identity {
        namespace: String,
        service_account: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("login at auth/{mount}/login failed: {source}")]
    Login {
        mount: String,
        #[source]
        source: VaultError,
    },
}

/// Failure of a call made through [`SessionProvider::with_session`]
#[derive(Debug, Error)]
pub enum SessionCallError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Vault(VaultError),
}

/// Shared session cache, one per controller process
pub struct SessionProvider {
    api: Arc<dyn VaultApi>,
    identity: Arc<dyn IdentityTokenSource>,
    /// Subtracted from every lease so a token is replaced before Vault expires it
    renew_margin: Duration,
    slots: Mutex<HashMap<SessionKey, Arc<AsyncMutex<SessionState>>>>,
}

impl std::fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("renew_margin", &self.renew_margin)
            .field("slots", &self.cached_sessions())
            .finish_non_exhaustive()
    }
}

impl SessionProvider {
    #[must_use]
    pub fn new(
        api: Arc<dyn VaultApi>,
        identity: Arc<dyn IdentityTokenSource>,
        renew_margin: Duration,
    ) -> Self {
        Self {
            api,
            identity,
            renew_margin,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Number of session slots currently held in the cache
    #[must_use]
    pub fn cached_sessions(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Get the slot for `key`, dropping idle slots of other keys
    ///
    /// A slot is idle when no task holds it and it has no usable session, so
    /// keys of deleted resources leave the cache once their token expires.
    fn slot(&self, key: &SessionKey) -> Arc<AsyncMutex<SessionState>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        slots.retain(|k, slot| k == key || !is_idle(slot, now));
        Arc::clone(
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(SessionState::Unauthenticated))),
        )
    }

    /// Return a usable session for `key`, logging in when there is none
    pub async fn acquire(&self, key: &SessionKey) -> Result<Session, SessionError> {
        let slot = self.slot(key);
        let mut state = slot.lock().await;

        if let SessionState::Valid(session) = &*state {
            if session.is_usable(Instant::now()) {
                metrics::increment_session_cache_hits();
                return Ok(session.clone());
            }
            debug!(
                "Session for role {} at auth/{} expired",
                key.role, key.mount
            );
            *state = SessionState::Expired;
        }

        match self.login(key).await {
            Ok(session) => {
                *state = SessionState::Valid(session.clone());
                Ok(session)
            }
            Err(e) => {
                *state = SessionState::Unauthenticated;
                Err(e)
            }
        }
    }

    /// Drop the cached session for `key` if it still holds `token`
    ///
    /// A session replaced by another task in the meantime is left alone.
    pub async fn invalidate(&self, key: &SessionKey, token: &str) {
        let slot = self.slot(key);
        let mut state = slot.lock().await;
        if matches!(&*state, SessionState::Valid(session) if session.token == token) {
            *state = SessionState::Unauthenticated;
        }
    }

    /// Run `op` with a session token, re-authenticating at most once
    ///
    /// When `op` fails with an error Vault also returns for stale tokens, the
    /// session is invalidated, a new one acquired, and `op` retried exactly
    /// once. The second result is returned as is.
    pub async fn with_session<T, F, Fut>(
        &self,
        key: &SessionKey,
        op: F,
    ) -> Result<T, SessionCallError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, VaultError>>,
    {
        let session = self.acquire(key).await?;
        match op(session.token.clone()).await {
            Err(e) if e.should_reauthenticate() => {
                warn!(
                    "Vault rejected session for role {} at auth/{} ({}), logging in again",
                    key.role,
                    key.mount,
                    e.reason()
                );
                self.invalidate(key, &session.token).await;
                let session = self.acquire(key).await?;
                op(session.token).await.map_err(SessionCallError::Vault)
            }
            result => result.map_err(SessionCallError::Vault),
        }
    }

    async fn login(&self, key: &SessionKey) -> Result<Session, SessionError> {
        let jwt = self
            .identity
            .identity_token(&IdentityRequest {
                namespace: &key.namespace,
                service_account: &key.service_account,
                audiences: &key.audiences,
            })
            .await
            .map_err(|source| {
                metrics::increment_vault_logins("identity_error");
                SessionError::Identity {
                    namespace: key.namespace.clone(),
                    service_account: key.service_account.clone(),
                    source,
                }
            })?;

        let response = self
            .api
            .login(
                &key.connection,
                &LoginRequest {
                    mount: &key.mount,
                    role: &key.role,
                    jwt: &jwt,
                    namespace: key.login_namespace.as_deref(),
                },
            )
            .await
            .map_err(|source| {
                metrics::increment_vault_logins("error");
                SessionError::Login {
                    mount: key.mount.clone(),
                    source,
                }
            })?;

        metrics::increment_vault_logins("success");
        info!(
            "Logged in to {} as role {} (service account {}/{}, lease {}s)",
            key.connection.address,
            key.role,
            key.namespace,
            key.service_account,
            response.lease_duration
        );

        let expires_at = (response.lease_duration > 0).then(|| {
            Instant::now()
                + Duration::from_secs(response.lease_duration).saturating_sub(self.renew_margin)
        });
        Ok(Session {
            token: response.client_token,
            expires_at,
        })
    }
}

/// Clones of a slot only exist while a task uses it, and are only made under
/// the cache lock, so a single owner means nobody is using it
fn is_idle(slot: &Arc<AsyncMutex<SessionState>>, now: Instant) -> bool {
    if Arc::strong_count(slot) > 1 {
        return false;
    }
    slot.try_lock().is_ok_and(
        |state| !matches!(&*state, SessionState::Valid(session) if session.is_usable(now)),
    )
}
