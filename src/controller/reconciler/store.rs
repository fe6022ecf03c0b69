//! # Resource Store
//!
//! The engine's only channel to the Kubernetes API for its own resources:
//! read the current object, edit the finalizer list, and write conditions
//! through the status sub-resource. Kept behind a trait so the engine can be
//! exercised against an in-memory store.

use crate::constants::FIELD_MANAGER;
use crate::crd::{Condition, RelatedObjects, VaultObject};
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use std::marker::PhantomData;
use tracing::debug;

/// Namespace and name of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn from_resource<K: VaultObject>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace().unwrap_or_else(|| "default".to_string()),
            name: obj.name_any(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Current state of the resource, `None` once it is gone
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>>;

    /// Add `finalizer` and return the updated object
    async fn add_finalizer(&self, obj: &K, finalizer: &str) -> Result<K>;

    /// Remove `finalizer`. Succeeds if the object is already gone.
    async fn remove_finalizer(&self, obj: &K, finalizer: &str) -> Result<()>;

    /// Replace the status conditions
    async fn write_conditions(&self, obj: &K, conditions: Vec<Condition>) -> Result<()>;
}

/// `ResourceStore` backed by the Kubernetes API
pub struct KubeResourceStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> std::fmt::Debug for KubeResourceStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeResourceStore").finish_non_exhaustive()
    }
}

impl<K: VaultObject> KubeResourceStore<K> {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn api_for(&self, obj: &K) -> Api<K> {
        self.api(&obj.namespace().unwrap_or_else(|| "default".to_string()))
    }
}

#[async_trait]
impl<K: VaultObject> ResourceStore<K> for KubeResourceStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        self.api(&key.namespace)
            .get_opt(&key.name)
            .await
            .with_context(|| format!("Failed to get {} {}", K::kind(&()), key))
    }

    async fn add_finalizer(&self, obj: &K, finalizer: &str) -> Result<K> {
        let mut finalizers = obj.finalizers().to_vec();
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        // resourceVersion makes the patch fail instead of clobbering a concurrent edit
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": obj.resource_version(),
            }
        });
        self.api_for(obj)
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to add finalizer to {}", obj.name_any()))
    }

    async fn remove_finalizer(&self, obj: &K, finalizer: &str) -> Result<()> {
        let api = self.api_for(obj);
        let name = obj.name_any();
        let Some(current) = api
            .get_opt(&name)
            .await
            .with_context(|| format!("Failed to get {name} before removing finalizer"))?
        else {
            debug!("{} already gone, nothing to finalize", name);
            return Ok(());
        };

        let finalizers: Vec<&String> = current
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .collect();
        let patch = serde_json::json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": current.resource_version(),
            }
        });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to remove finalizer from {name}"))?;
        Ok(())
    }

    async fn write_conditions(&self, obj: &K, conditions: Vec<Condition>) -> Result<()> {
        let patch = serde_json::json!({
            "status": {
                "conditions": conditions
            }
        });
        self.api_for(obj)
            .patch_status(
                &obj.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(&patch),
            )
            .await
            .with_context(|| format!("Failed to update status of {}", obj.name_any()))?;
        Ok(())
    }
}

/// `RelatedObjects` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeRelatedObjects {
    client: Client,
}

impl std::fmt::Debug for KubeRelatedObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRelatedObjects").finish_non_exhaustive()
    }
}

impl KubeRelatedObjects {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RelatedObjects for KubeRelatedObjects {
    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<Option<String>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let Some(secret) = api
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to get secret {namespace}/{name}"))?
        else {
            return Ok(None);
        };

        if let Some(value) = secret.data.as_ref().and_then(|data| data.get(key)) {
            let text = String::from_utf8(value.0.clone())
                .with_context(|| format!("Key {key} of secret {namespace}/{name} is not UTF-8"))?;
            return Ok(Some(text));
        }
        Ok(secret
            .string_data
            .as_ref()
            .and_then(|data| data.get(key))
            .cloned())
    }
}
