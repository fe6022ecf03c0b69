//! # Controller
//!
//! Core controller modules for the Vault Config Controller.
//!
//! - `backoff`: Exponential backoff for failed reconciliations
//! - `reconciler`: The generic reconciliation engine and its collaborators

pub mod backoff;
pub mod reconciler;
