//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use vault_config_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types and the `VaultObject` contract
//! - Reconciler types (Reconciler, ReconcilerError, etc.)
//! - Vault client and session types
//! - Config types (ControllerConfig, ServerConfig)

pub use crate::crd::*;

pub use crate::controller::reconciler::{
    BackoffState, Reconciler, ReconcileSettings, ReconcilerError, reconcile,
};

pub use crate::vault::{
    ConnectionDefaults, HttpVaultClient, ReadOutcome, SessionProvider, VaultApi, VaultError,
};

pub use crate::config::{ControllerConfig, ServerConfig};
