//! In-memory fakes for exercising the engine without a cluster or Vault.

use crate::controller::reconciler::store::{ObjectKey, ResourceStore};
use crate::controller::reconciler::types::{ReconcileSettings, Reconciler};
use crate::crd::{Condition, Payload, RelatedObjects, VaultObject};
use crate::vault::{
    ConnectionDefaults, IdentityRequest, IdentityTokenSource, LoginRequest, LoginResponse,
    ReadOutcome, ResolvedConnection, SessionProvider, VaultApi, VaultError,
};
use anyhow::Result;
use async_trait::async_trait;
use kube::ResourceExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Resource store holding objects in a map
pub(crate) struct FakeStore<K> {
    objects: Mutex<HashMap<ObjectKey, K>>,
    status_writes: Mutex<usize>,
    fail_status_writes: Mutex<bool>,
}

impl<K: VaultObject> FakeStore<K> {
    pub(crate) fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            status_writes: Mutex::new(0),
            fail_status_writes: Mutex::new(false),
        }
    }

    pub(crate) fn insert(&self, mut obj: K) -> ObjectKey {
        if obj.namespace().is_none() {
            obj.meta_mut().namespace = Some("default".to_string());
        }
        let key = ObjectKey::from_resource(&obj);
        self.objects.lock().unwrap().insert(key.clone(), obj);
        key
    }

    pub(crate) fn object(&self, key: &ObjectKey) -> Option<K> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    /// Set a deletion timestamp, as the API server does on delete
    pub(crate) fn mark_deleted(&self, key: &ObjectKey) {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects.get_mut(key).expect("object to delete");
        obj.meta_mut().deletion_timestamp = Some(
            serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z"))
                .expect("timestamp"),
        );
    }

    pub(crate) fn status_writes(&self) -> usize {
        *self.status_writes.lock().unwrap()
    }

    pub(crate) fn fail_status_writes(&self) {
        *self.fail_status_writes.lock().unwrap() = true;
    }

    pub(crate) fn conditions(&self, key: &ObjectKey) -> Vec<Condition> {
        self.object(key)
            .map(|obj| obj.conditions().to_vec())
            .unwrap_or_default()
    }
}

#[async_trait]
impl<K: VaultObject> ResourceStore<K> for FakeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.object(key))
    }

    async fn add_finalizer(&self, obj: &K, finalizer: &str) -> Result<K> {
        let key = ObjectKey::from_resource(obj);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("{key} not found"))?;
        let finalizers = stored.meta_mut().finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(stored.clone())
    }

    async fn remove_finalizer(&self, obj: &K, finalizer: &str) -> Result<()> {
        let key = ObjectKey::from_resource(obj);
        let mut objects = self.objects.lock().unwrap();
        let Some(stored) = objects.get_mut(&key) else {
            return Ok(());
        };
        if let Some(finalizers) = stored.meta_mut().finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        // The API server drops a deleted object once its last finalizer is gone
        if stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty() {
            objects.remove(&key);
        }
        Ok(())
    }

    async fn write_conditions(&self, obj: &K, conditions: Vec<Condition>) -> Result<()> {
        if *self.fail_status_writes.lock().unwrap() {
            anyhow::bail!("status sub-resource unavailable");
        }
        let key = ObjectKey::from_resource(obj);
        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| anyhow::anyhow!("{key} not found"))?;

        let mut value = serde_json::to_value(&*stored)?;
        value["status"] = serde_json::json!({ "conditions": conditions });
        *stored = serde_json::from_value(value)?;
        *self.status_writes.lock().unwrap() += 1;
        Ok(())
    }
}

#[derive(Default)]
struct FakeVaultState {
    data: HashMap<String, Payload>,
    calls: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, VecDeque<VaultError>>,
    login_failures: usize,
    issued: usize,
    valid_tokens: HashSet<String>,
    lease: u64,
    login_delay: Duration,
    last_payload: Option<Payload>,
}

/// In-memory Vault that counts calls and can inject failures
pub(crate) struct FakeVault {
    state: Mutex<FakeVaultState>,
}

impl FakeVault {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeVaultState {
                lease: 3600,
                ..FakeVaultState::default()
            }),
        }
    }

    pub(crate) fn with_lease(self, lease: u64) -> Self {
        self.state.lock().unwrap().lease = lease;
        self
    }

    pub(crate) fn with_login_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().login_delay = delay;
        self
    }

    pub(crate) fn fail_next_logins(&self, count: usize) {
        self.state.lock().unwrap().login_failures = count;
    }

    /// Fail the next call of `operation` ("read", "create", "update", "delete")
    pub(crate) fn fail_next(&self, operation: &'static str, error: VaultError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Invalidate every token issued so far, as a token revocation would
    pub(crate) fn revoke_tokens(&self) {
        self.state.lock().unwrap().valid_tokens.clear();
    }

    pub(crate) fn put(&self, path: &str, payload: Payload) {
        self.state
            .lock()
            .unwrap()
            .data
            .insert(path.to_string(), payload);
    }

    pub(crate) fn stored(&self, path: &str) -> Option<Payload> {
        self.state.lock().unwrap().data.get(path).cloned()
    }

    pub(crate) fn last_payload(&self) -> Option<Payload> {
        self.state.lock().unwrap().last_payload.clone()
    }

    pub(crate) fn calls(&self, operation: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn login_count(&self) -> usize {
        self.calls("login")
    }

    pub(crate) fn write_count(&self) -> usize {
        self.calls("create") + self.calls("update") + self.calls("delete")
    }

    /// Count the call and return the injected failure or token rejection, if any
    fn begin(&self, operation: &'static str, token: &str) -> Result<(), VaultError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(operation).or_default() += 1;
        if !state.valid_tokens.contains(token) {
            return Err(VaultError::AuthRejected {
                status: 403,
                message: "permission denied, invalid token".to_string(),
            });
        }
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VaultApi for FakeVault {
    async fn login(
        &self,
        _connection: &ResolvedConnection,
        request: &LoginRequest<'_>,
    ) -> Result<LoginResponse, VaultError> {
        let delay = self.state.lock().unwrap().login_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        *state.calls.entry("login").or_default() += 1;
        if state.login_failures > 0 {
            state.login_failures -= 1;
            return Err(VaultError::Request {
                path: format!("auth/{}/login", request.mount),
                status: 400,
                message: "invalid role name".to_string(),
            });
        }
        state.issued += 1;
        let token = format!("s.token-{}", state.issued);
        state.valid_tokens.insert(token.clone());
        Ok(LoginResponse {
            client_token: token,
            lease_duration: state.lease,
            renewable: true,
        })
    }

    async fn read(
        &self,
        _connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<ReadOutcome, VaultError> {
        self.begin("read", token)?;
        Ok(match self.stored(path) {
            Some(payload) => ReadOutcome::Found(payload),
            None => ReadOutcome::NotFound,
        })
    }

    async fn create(
        &self,
        _connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError> {
        self.begin("create", token)?;
        let mut state = self.state.lock().unwrap();
        state.data.insert(path.to_string(), payload.clone());
        state.last_payload = Some(payload.clone());
        Ok(())
    }

    async fn update(
        &self,
        _connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError> {
        self.begin("update", token)?;
        let mut state = self.state.lock().unwrap();
        state.data.insert(path.to_string(), payload.clone());
        state.last_payload = Some(payload.clone());
        Ok(())
    }

    async fn delete(
        &self,
        _connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<(), VaultError> {
        self.begin("delete", token)?;
        match self.state.lock().unwrap().data.remove(path) {
            Some(_) => Ok(()),
            None => Err(VaultError::NotFound {
                path: path.to_string(),
            }),
        }
    }
}

/// Identity source returning a fixed token, or failing
pub(crate) struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub(crate) fn new(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl IdentityTokenSource for StaticIdentity {
    async fn identity_token(&self, request: &IdentityRequest<'_>) -> Result<String> {
        self.token.clone().ok_or_else(|| {
            anyhow::anyhow!(
                "serviceaccounts \"{}\" not found in {}",
                request.service_account,
                request.namespace
            )
        })
    }
}

/// Secrets keyed by (namespace, name, key)
#[derive(Default)]
pub(crate) struct FakeRelated {
    secrets: Mutex<HashMap<(String, String, String), String>>,
}

impl FakeRelated {
    pub(crate) fn with_secret(self, namespace: &str, name: &str, key: &str, value: &str) -> Self {
        self.secrets.lock().unwrap().insert(
            (namespace.to_string(), name.to_string(), key.to_string()),
            value.to_string(),
        );
        self
    }
}

#[async_trait]
impl RelatedObjects for FakeRelated {
    async fn secret_value(&self, namespace: &str, name: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string(), key.to_string()))
            .cloned())
    }
}

fn settings() -> ReconcileSettings {
    ReconcileSettings {
        recheck_interval: Duration::from_secs(300),
        backoff_start: Duration::from_secs(1),
        backoff_max: Duration::from_secs(60),
    }
}

/// Engine wired to the given fakes
pub(crate) fn reconciler<K: VaultObject>(
    store: &Arc<FakeStore<K>>,
    vault: &Arc<FakeVault>,
    identity: Arc<dyn IdentityTokenSource>,
    related: FakeRelated,
) -> Reconciler<K> {
    let api: Arc<dyn VaultApi> = Arc::clone(vault) as Arc<dyn VaultApi>;
    let sessions = Arc::new(SessionProvider::new(
        Arc::clone(&api),
        identity,
        Duration::from_secs(30),
    ));
    Reconciler::new(
        Arc::clone(store) as Arc<dyn ResourceStore<K>>,
        Arc::new(related),
        api,
        sessions,
        ConnectionDefaults::default(),
        settings(),
    )
}
