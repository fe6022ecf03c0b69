//! # Types
//!
//! Core types for the reconciler.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::store::{ObjectKey, ResourceStore};
use crate::crd::{RelatedObjects, VaultObject};
use crate::vault::{ConnectionDefaults, SessionError, SessionProvider, VaultApi, VaultError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("failed to access the resource: {0:#}")]
    Store(#[source] anyhow::Error),

    #[error("invalid Vault path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("failed to prepare desired state: {0:#}")]
    Preparation(#[source] anyhow::Error),

    #[error(transparent)]
    Connection(VaultError),

    #[error(transparent)]
    Session(SessionError),

    #[error("{operation} of '{path}' failed: {source}")]
    Remote {
        operation: &'static str,
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("failed to remove '{path}' from Vault: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: VaultError,
    },
}

impl ReconcilerError {
    /// Reason recorded on the Error condition
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Store(_) => "ResourceAccessFailed",
            ReconcilerError::InvalidPath { .. } => "InvalidPath",
            ReconcilerError::Preparation(_) => "PreparationFailed",
            ReconcilerError::Connection(_) => "InvalidConnection",
            ReconcilerError::Session(_) => "AuthenticationFailed",
            ReconcilerError::Remote { source, .. } if source.is_transient() => "VaultUnavailable",
            ReconcilerError::Remote { source, .. } if source.should_reauthenticate() => {
                "PermissionDenied"
            }
            ReconcilerError::Remote { .. } => "VaultRequestFailed",
            ReconcilerError::Cleanup { .. } => "CleanupFailed",
        }
    }
}

/// Where a resource is in its finalizer lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    /// Deletion requested; the finalizer holds the object until cleanup is done
    PendingDeletion,
}

impl Lifecycle {
    #[must_use]
    pub fn of<K: VaultObject>(obj: &K) -> Self {
        if obj.meta().deletion_timestamp.is_some() {
            Lifecycle::PendingDeletion
        } else {
            Lifecycle::Active
        }
    }
}

/// Timing settings for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Delay before re-checking a resource that reconciled successfully
    pub recheck_interval: Duration,
    pub backoff_start: Duration,
    pub backoff_max: Duration,
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(settings: &ReconcileSettings) -> Self {
        Self {
            backoff: ExponentialBackoff::new(settings.backoff_start, settings.backoff_max),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context handed to every reconciliation of kind `K`
pub struct Reconciler<K: VaultObject> {
    pub store: Arc<dyn ResourceStore<K>>,
    pub related: Arc<dyn RelatedObjects>,
    pub vault: Arc<dyn VaultApi>,
    /// Shared by all kinds so resources with the same login reuse one token
    pub sessions: Arc<SessionProvider>,
    pub connection_defaults: ConnectionDefaults,
    pub settings: ReconcileSettings,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl<K: VaultObject> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("kind", &K::kind(&()))
            .field("sessions", &self.sessions)
            .field("connection_defaults", &self.connection_defaults)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<K: VaultObject> Reconciler<K> {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        related: Arc<dyn RelatedObjects>,
        vault: Arc<dyn VaultApi>,
        sessions: Arc<SessionProvider>,
        connection_defaults: ConnectionDefaults,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            related,
            vault,
            sessions,
            connection_defaults,
            settings,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure for `key` and return the delay before the next attempt
    ///
    /// Returns the delay together with the number of consecutive failures.
    pub fn next_backoff(&self, key: &ObjectKey) -> (Duration, u32) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(key.to_string())
            .or_insert_with(|| BackoffState::new(&self.settings));
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Reset the backoff for `key` after a success. Returns true if it was backing off.
    pub fn reset_backoff(&self, key: &ObjectKey) -> bool {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states.get_mut(&key.to_string()).is_some_and(|state| {
            let had_errors = state.error_count > 0;
            state.reset();
            had_errors
        })
    }

    /// Drop all backoff state for a resource that no longer exists
    pub fn forget_backoff(&self, key: &ObjectKey) {
        self.backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.to_string());
    }
}
