//! Common test utilities for integration tests
//!
//! Provides shared initialization code, including rustls crypto provider
//! setup and a Vault connection pointing at a Pact mock server.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Once;
use vault_config_controller::vault::{ConnectionDefaults, ResolvedConnection};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it runs a single time per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // Another test may already have installed it
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Connection to a mock server, as the controller would resolve it
pub fn connection_to(base_url: &str) -> ResolvedConnection {
    ConnectionDefaults {
        address: base_url.trim_end_matches('/').to_string(),
        ..ConnectionDefaults::default()
    }
    .resolve(None, None)
    .expect("mock server URL is a valid Vault address")
}
