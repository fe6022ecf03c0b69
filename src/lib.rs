//! Vault Config Controller Library
//!
//! Reconciles declarative Vault configuration resources against a live
//! Vault server. Tests are included in the module files.
//!
//! ## Quick Start
//!
//! ```rust
//! use vault_config_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific
//! imports, use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod server;
pub mod vault;
