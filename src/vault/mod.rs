//! # Vault
//!
//! Everything that talks to Vault: connection settings, the HTTP client,
//! identity tokens for Kubernetes auth, and the shared session cache.

mod client;
mod connection;
mod error;
mod identity;
mod session;

pub use client::{HttpVaultClient, LoginRequest, LoginResponse, ReadOutcome, VaultApi};
pub use connection::{ConnectionDefaults, ResolvedConnection};
pub use error::VaultError;
pub use identity::{FileTokenSource, IdentityRequest, IdentityTokenSource, KubeTokenRequestSource};
pub use session::{Session, SessionCallError, SessionError, SessionKey, SessionProvider};
