//! # Vault HTTP Client
//!
//! Thin client for the parts of the Vault HTTP API the reconciler needs:
//! Kubernetes auth login plus read, create, update and delete on
//! `/v1/<path>`.
//!
//! Every request carries `X-Vault-Token` (except login) and, when a Vault
//! namespace is configured, `X-Vault-Namespace`. Error responses are
//! classified into [`VaultError`] variants from the status code and the
//! `{"errors": [...]}` body Vault returns.
//!
//! References:
//! - [Vault HTTP API](https://developer.hashicorp.com/vault/api-docs)

use crate::constants::MAX_CACHED_HTTP_CLIENTS;
use crate::crd::Payload;
use crate::observability::metrics;
use crate::vault::{ResolvedConnection, VaultError};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, info_span};

/// Result of reading a configuration path
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Found(Payload),
    NotFound,
}

/// Kubernetes auth login request
#[derive(Clone)]
pub struct LoginRequest<'a> {
    /// Auth method mount, e.g. `kubernetes`
    pub mount: &'a str,
    pub role: &'a str,
    /// Service account token
    pub jwt: &'a str,
    /// Vault namespace to log in to; falls back to the connection namespace
    pub namespace: Option<&'a str>,
}

impl std::fmt::Debug for LoginRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("mount", &self.mount)
            .field("role", &self.role)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Token issued by a successful login
#[derive(Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub client_token: String,
    /// Lease in seconds; 0 means the token does not expire
    pub lease_duration: u64,
    pub renewable: bool,
}

impl std::fmt::Debug for LoginResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginResponse")
            .field("client_token", &"***")
            .field("lease_duration", &self.lease_duration)
            .field("renewable", &self.renewable)
            .finish()
    }
}

/// Operations the reconciler performs against Vault
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Exchange a service account token for a Vault token
    async fn login(
        &self,
        connection: &ResolvedConnection,
        request: &LoginRequest<'_>,
    ) -> Result<LoginResponse, VaultError>;

    /// Read the configuration at `path`. A missing path is `ReadOutcome::NotFound`.
    async fn read(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<ReadOutcome, VaultError>;

    /// Write a new configuration (POST)
    async fn create(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError>;

    /// Overwrite an existing configuration (PUT)
    async fn update(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError>;

    /// Remove the configuration. A missing path is `VaultError::NotFound`.
    async fn delete(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<(), VaultError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TlsSettings {
    ca_cert_pem: Option<String>,
    skip_verify: bool,
    timeout: Duration,
}

/// `VaultApi` over HTTP with `reqwest`
///
/// One `reqwest::Client` is kept per distinct TLS settings so connection
/// pools are reused across reconciliations. At most
/// [`MAX_CACHED_HTTP_CLIENTS`] are kept; settings of deleted resources or
/// rotated CA bundles fall out when the cache starts over.
#[derive(Default)]
pub struct HttpVaultClient {
    clients: Mutex<HashMap<TlsSettings, Client>>,
}

impl std::fmt::Debug for HttpVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cached = self.clients.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("HttpVaultClient")
            .field("cached_clients", &cached)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    auth: Option<AuthBody>,
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

impl HttpVaultClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn http_client(&self, connection: &ResolvedConnection) -> Result<Client, VaultError> {
        let settings = TlsSettings {
            ca_cert_pem: connection.ca_cert_pem.clone(),
            skip_verify: connection.skip_verify,
            timeout: connection.timeout,
        };

        let mut clients = self
            .clients
            .lock()
            .map_err(|e| VaultError::InvalidConnection(format!("client cache poisoned: {e}")))?;
        if let Some(client) = clients.get(&settings) {
            return Ok(client.clone());
        }

        let mut builder = Client::builder()
            .use_rustls_tls()
            .timeout(settings.timeout)
            .danger_accept_invalid_certs(settings.skip_verify);
        if let Some(pem) = &settings.ca_cert_pem {
            let certificates = reqwest::Certificate::from_pem_bundle(pem.as_bytes())
                .map_err(|e| VaultError::InvalidConnection(format!("invalid CA bundle: {e}")))?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
        let client = builder
            .build()
            .map_err(|e| VaultError::InvalidConnection(format!("failed to build HTTP client: {e}")))?;

        if clients.len() >= MAX_CACHED_HTTP_CLIENTS {
            debug!("HTTP client cache full ({} entries), starting over", clients.len());
            clients.clear();
        }
        clients.insert(settings, client.clone());
        Ok(client)
    }

    /// Send one request and return the status with the raw body
    async fn send(
        &self,
        connection: &ResolvedConnection,
        method: Method,
        path: &str,
        token: Option<&str>,
        namespace: Option<&str>,
        body: Option<&Payload>,
    ) -> Result<(StatusCode, String), VaultError> {
        let client = self.http_client(connection)?;
        let mut request = client.request(method, connection.url(path));
        if let Some(token) = token {
            request = request.header("X-Vault-Token", token);
        }
        if let Some(namespace) = namespace.or(connection.namespace.as_deref()) {
            request = request.header("X-Vault-Namespace", namespace);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| VaultError::Transient {
            path: path.to_string(),
            status: None,
            message: if e.is_timeout() {
                format!("request timed out: {e}")
            } else {
                format!("request failed: {e}")
            },
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| VaultError::Transient {
            path: path.to_string(),
            status: Some(status.as_u16()),
            message: format!("failed to read response body: {e}"),
        })?;
        Ok((status, text))
    }

    async fn write(
        &self,
        operation: &'static str,
        method: Method,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError> {
        let start = Instant::now();
        let result = async {
            let (status, body) = self
                .send(connection, method, path, Some(token), None, Some(payload))
                .await?;
            if status.is_success() {
                Ok(())
            } else {
                Err(classify_error(path, status, &body))
            }
        }
        .instrument(info_span!("vault.write", vault.operation = operation, vault.path = path))
        .await;
        record(operation, &result, start);
        result
    }
}

#[async_trait]
impl VaultApi for HttpVaultClient {
    async fn login(
        &self,
        connection: &ResolvedConnection,
        request: &LoginRequest<'_>,
    ) -> Result<LoginResponse, VaultError> {
        let path = format!("auth/{}/login", request.mount.trim_matches('/'));
        let start = Instant::now();
        let result = async {
            let mut body = Payload::new();
            body.insert("jwt".to_string(), Value::String(request.jwt.to_string()));
            body.insert("role".to_string(), Value::String(request.role.to_string()));

            let (status, text) = self
                .send(connection, Method::POST, &path, None, request.namespace, Some(&body))
                .await?;
            if !status.is_success() {
                // A rejected login is never fixed by logging in again with the same identity
                return Err(match classify_error(&path, status, &text) {
                    VaultError::AuthRejected { message, .. }
                    | VaultError::PermissionDenied { message, .. } => VaultError::Request {
                        path: path.clone(),
                        status: status.as_u16(),
                        message,
                    },
                    other => other,
                });
            }

            let parsed: LoginBody =
                serde_json::from_str(&text).map_err(|e| VaultError::InvalidResponse {
                    path: path.clone(),
                    message: format!("malformed login response: {e}"),
                })?;
            let auth = parsed.auth.ok_or_else(|| VaultError::InvalidResponse {
                path: path.clone(),
                message: "login response has no auth block".to_string(),
            })?;
            if auth.client_token.is_empty() {
                return Err(VaultError::InvalidResponse {
                    path: path.clone(),
                    message: "login response has an empty client_token".to_string(),
                });
            }
            debug!(
                "Logged in at {} (lease {}s, renewable {})",
                path, auth.lease_duration, auth.renewable
            );
            Ok(LoginResponse {
                client_token: auth.client_token,
                lease_duration: auth.lease_duration,
                renewable: auth.renewable,
            })
        }
        .instrument(info_span!("vault.login", vault.path = path.as_str(), vault.role = request.role))
        .await;
        record("login", &result, start);
        result
    }

    async fn read(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<ReadOutcome, VaultError> {
        let start = Instant::now();
        let result = async {
            let (status, body) = self
                .send(connection, Method::GET, path, Some(token), None, None)
                .await?;
            match status {
                StatusCode::NO_CONTENT => Ok(ReadOutcome::NotFound),
                StatusCode::NOT_FOUND if error_messages(&body).is_empty() => {
                    Ok(ReadOutcome::NotFound)
                }
                s if s.is_success() => parse_read_body(path, &body).map(ReadOutcome::Found),
                s => Err(classify_error(path, s, &body)),
            }
        }
        .instrument(info_span!("vault.read", vault.path = path))
        .await;
        record("read", &result, start);
        result
    }

    async fn create(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError> {
        self.write("create", Method::POST, connection, token, path, payload)
            .await
    }

    async fn update(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
        payload: &Payload,
    ) -> Result<(), VaultError> {
        self.write("update", Method::PUT, connection, token, path, payload)
            .await
    }

    async fn delete(
        &self,
        connection: &ResolvedConnection,
        token: &str,
        path: &str,
    ) -> Result<(), VaultError> {
        let start = Instant::now();
        let result = async {
            let (status, body) = self
                .send(connection, Method::DELETE, path, Some(token), None, None)
                .await?;
            if status.is_success() {
                Ok(())
            } else {
                Err(classify_error(path, status, &body))
            }
        }
        .instrument(info_span!("vault.delete", vault.path = path))
        .await;
        record("delete", &result, start);
        result
    }
}

fn record<T>(operation: &str, result: &Result<T, VaultError>, start: Instant) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) => e.reason(),
    };
    metrics::increment_vault_operations(operation, outcome);
    metrics::observe_vault_operation_duration(operation, start.elapsed().as_secs_f64());
}

/// Messages from a Vault `{"errors": [...]}` body, empty when there are none
fn error_messages(body: &str) -> Vec<String> {
    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.errors)
        .unwrap_or_default()
}

/// The `data` object of a successful read
fn parse_read_body(path: &str, body: &str) -> Result<Payload, VaultError> {
    let value: Value = serde_json::from_str(body).map_err(|e| VaultError::InvalidResponse {
        path: path.to_string(),
        message: format!("malformed JSON: {e}"),
    })?;
    match value.get("data") {
        Some(Value::Object(data)) => Ok(data.clone()),
        Some(Value::Null) | None => Err(VaultError::InvalidResponse {
            path: path.to_string(),
            message: "response has no data object".to_string(),
        }),
        Some(other) => Err(VaultError::InvalidResponse {
            path: path.to_string(),
            message: format!("expected data to be an object, got {other}"),
        }),
    }
}

/// Map a non-success response onto a `VaultError`
pub(crate) fn classify_error(path: &str, status: StatusCode, body: &str) -> VaultError {
    let errors = error_messages(body);
    let message = if errors.is_empty() {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("no response body").to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        errors.join("; ")
    };
    let path = path.to_string();

    match status {
        StatusCode::UNAUTHORIZED => VaultError::AuthRejected {
            status: status.as_u16(),
            message,
        },
        StatusCode::FORBIDDEN if message.to_lowercase().contains("invalid token") => {
            VaultError::AuthRejected {
                status: status.as_u16(),
                message,
            }
        }
        StatusCode::FORBIDDEN => VaultError::PermissionDenied { path, message },
        StatusCode::NOT_FOUND if errors.is_empty() => VaultError::NotFound { path },
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => VaultError::Transient {
            path,
            status: Some(status.as_u16()),
            message,
        },
        s if s.is_server_error() => VaultError::Transient {
            path,
            status: Some(s.as_u16()),
            message,
        },
        s => VaultError::Request {
            path,
            status: s.as_u16(),
            message,
        },
    }
}
