//! # Reconciler
//!
//! A single reconciliation engine shared by every Vault configuration kind.
//!
//! The engine only knows the [`VaultObject`](crate::crd::VaultObject)
//! capability set; the kinds know nothing about scheduling, sessions or
//! status.
//!
//! ## Reconciliation Flow
//!
//! 1. Re-read the resource; stop if it is gone
//! 2. Deletion pending: remove the Vault config if the kind allows it, then drop the finalizer
//! 3. Ensure the finalizer
//! 4. Prepare internal values and resolve the connection
//! 5. Acquire a Vault session
//! 6. Read the path; create, update or leave it as is
//! 7. Write conditions once and requeue (re-check interval, or backoff on error)

pub mod equivalence;
pub mod reconcile;
pub mod status;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;
pub mod validation;

pub use reconcile::{FINALIZER, reconcile, reconcile_object};
pub use status::{CONDITION_ERROR, CONDITION_READY, ConditionSet};
pub use store::{KubeRelatedObjects, KubeResourceStore, ObjectKey, ResourceStore};
pub use types::{BackoffState, Lifecycle, ReconcileSettings, Reconciler, ReconcilerError};
