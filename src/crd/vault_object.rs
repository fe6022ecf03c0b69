//! # Vault Object Contract
//!
//! The capability set the reconciliation engine depends on. The engine never
//! names a concrete kind; it only calls these methods.

use crate::controller::reconciler::equivalence;
use crate::crd::{Condition, KubeAuthConfiguration, Payload, VaultConnection};
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Lookup of other cluster objects a kind may depend on
///
/// Injected so kinds can resolve cross references without holding a
/// Kubernetes client, and so tests can substitute an in-memory fake.
#[async_trait]
pub trait RelatedObjects: Send + Sync {
    /// Read one key of a Secret. `Ok(None)` when the Secret or key does not exist.
    async fn secret_value(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> anyhow::Result<Option<String>>;
}

/// A declarative resource that maps onto one Vault configuration path
#[async_trait]
pub trait VaultObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Connection override; `None` means use the controller defaults
    fn connection(&self) -> Option<&VaultConnection>;

    /// Kubernetes auth login settings
    fn authentication(&self) -> &KubeAuthConfiguration;

    /// Location of the configuration in Vault, normalized with `cleanse_path`
    fn resolve_path(&self) -> String;

    /// Request body derived from the spec
    ///
    /// Must be a pure function of the spec. Zero-valued fields are left out so
    /// Vault applies its own defaults, except fields the kind always requires.
    fn build_payload(&self) -> Payload;

    /// Whether the Vault configuration may be removed when the resource is deleted
    fn is_deletable(&self) -> bool;

    /// Payload fields Vault echoes back as whole seconds
    fn duration_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Compare the desired payload against what Vault returned on read
    fn is_equivalent_to_desired_state(&self, remote: &Payload) -> bool {
        equivalence::is_equivalent(&self.build_payload(), remote, self.duration_fields())
    }

    /// Resolve or validate values needed before `build_payload`
    ///
    /// An error here fails the current attempt and is retried with backoff.
    async fn prepare_internal_values(&mut self, _related: &dyn RelatedObjects) -> anyhow::Result<()> {
        Ok(())
    }

    /// Conditions currently recorded in the resource status
    fn conditions(&self) -> &[Condition];
}

/// Returns true for values that mean "not set": null, empty string, zero,
/// false, empty list and empty map.
#[must_use]
pub fn is_zero_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Builder applying the omission rule while a kind assembles its payload
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    payload: Payload,
}

impl PayloadBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field the kind always sends, even when it is empty
    #[must_use]
    pub fn required(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.payload.insert(key.to_string(), value.into());
        self
    }

    /// Insert a field only when it is not the zero value of its type
    #[must_use]
    pub fn optional(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !is_zero_value(&value) {
            self.payload.insert(key.to_string(), value);
        }
        self
    }

    #[must_use]
    pub fn build(self) -> Payload {
        self.payload
    }
}
