use super::*;
use crate::controller::reconciler::status::{CONDITION_ERROR, CONDITION_READY};
use crate::controller::reconciler::testing::{
    FakeRelated, FakeStore, FakeVault, StaticIdentity, reconciler,
};
use crate::crd::{
    Condition, GitHubAuthEngineConfig, GitHubAuthEngineConfigSpec, GitHubTeam, GitHubTeamSpec,
    KubeAuthConfiguration, Payload, SecretReference, TlsConfig, TokenType, VaultConnection,
    default_service_account,
};
use crate::vault::{IdentityTokenSource, VaultError};
use serde_json::json;
use std::time::Duration;

const TEAM_PATH: &str = "auth/github/map/teams/platform";
const CONFIG_PATH: &str = "auth/github/config";

fn auth() -> KubeAuthConfiguration {
    KubeAuthConfiguration {
        path: "kubernetes".to_string(),
        role: "vault-admin".to_string(),
        service_account: default_service_account(),
        namespace: None,
        audiences: Vec::new(),
    }
}

fn team(name: &str, team_name: &str, policies: &[&str]) -> GitHubTeam {
    let mut team = GitHubTeam::new(
        name,
        GitHubTeamSpec {
            connection: None,
            authentication: auth(),
            path: "github".to_string(),
            team_name: team_name.to_string(),
            policies: policies.iter().map(ToString::to_string).collect(),
        },
    );
    team.metadata.namespace = Some("vault-admin".to_string());
    team.metadata.generation = Some(1);
    team
}

fn engine_config(token_ttl: &str) -> GitHubAuthEngineConfig {
    let mut config = GitHubAuthEngineConfig::new(
        "github",
        GitHubAuthEngineConfigSpec {
            connection: None,
            authentication: auth(),
            path: "github".to_string(),
            organization: "octopilot".to_string(),
            organization_id: 0,
            base_url: String::new(),
            token_ttl: token_ttl.to_string(),
            token_max_ttl: String::new(),
            token_policies: Vec::new(),
            token_bound_cidrs: Vec::new(),
            token_explicit_max_ttl: String::new(),
            token_no_default_policy: false,
            token_num_uses: 0,
            token_period: String::new(),
            token_type: TokenType::Unset,
        },
    );
    config.metadata.namespace = Some("vault-admin".to_string());
    config.metadata.generation = Some(3);
    config
}

fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn condition<'a>(conditions: &'a [Condition], condition_type: &str) -> &'a Condition {
    conditions
        .iter()
        .find(|c| c.r#type == condition_type)
        .unwrap_or_else(|| panic!("missing {condition_type} condition"))
}

fn identity() -> Arc<dyn IdentityTokenSource> {
    Arc::new(StaticIdentity::new("jwt"))
}

struct Harness<K: VaultObject> {
    store: Arc<FakeStore<K>>,
    vault: Arc<FakeVault>,
    ctx: Reconciler<K>,
}

fn harness<K: VaultObject>() -> Harness<K> {
    harness_with(identity(), FakeRelated::default())
}

fn harness_with<K: VaultObject>(
    identity: Arc<dyn IdentityTokenSource>,
    related: FakeRelated,
) -> Harness<K> {
    let store = Arc::new(FakeStore::new());
    let vault = Arc::new(FakeVault::new());
    let ctx = reconciler(&store, &vault, identity, related);
    Harness { store, vault, ctx }
}

#[tokio::test]
async fn test_first_pass_adds_finalizer_and_creates() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform", "readonly"]));

    let action = reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(300)));
    assert_eq!(h.vault.calls("create"), 1);
    assert_eq!(
        h.vault.stored(TEAM_PATH),
        Some(payload(json!({"value": "platform,readonly"})))
    );

    let stored = h.store.object(&key).unwrap();
    assert!(has_finalizer(&stored));
    let conditions = h.store.conditions(&key);
    let ready = condition(&conditions, CONDITION_READY);
    assert_eq!(ready.status, "True");
    assert_eq!(ready.observed_generation, Some(1));
    assert_eq!(condition(&conditions, CONDITION_ERROR).status, "False");
}

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));

    reconcile_object(&key, &h.ctx).await.unwrap();
    let writes = h.vault.write_count();
    let status_writes = h.store.status_writes();

    let action = reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(300)));
    assert_eq!(h.vault.write_count(), writes);
    assert_eq!(h.store.status_writes(), status_writes);
    assert_eq!(h.vault.calls("read"), 2);
}

#[tokio::test]
async fn test_drift_is_overwritten_with_full_payload() {
    let h = harness::<GitHubTeam>();
    h.vault.put(TEAM_PATH, payload(json!({"value": "someone-else"})));
    let key = h.store.insert(team("platform", "platform", &["platform", "readonly"]));

    reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(h.vault.calls("create"), 0);
    assert_eq!(h.vault.calls("update"), 1);
    assert_eq!(
        h.vault.last_payload(),
        Some(payload(json!({"value": "platform,readonly"})))
    );
}

#[tokio::test]
async fn test_server_normalized_echo_is_not_drift() {
    let h = harness::<GitHubAuthEngineConfig>();
    // Vault answers with seconds and fills in defaults for unset fields
    h.vault.put(
        CONFIG_PATH,
        payload(json!({
            "organization": "octopilot",
            "organization_id": 0,
            "base_url": "",
            "token_ttl": 3600,
            "token_max_ttl": 0,
            "token_policies": [],
            "token_type": "default-service",
        })),
    );
    let key = h.store.insert(engine_config("1h"));

    reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(h.vault.write_count(), 0);
    let conditions = h.store.conditions(&key);
    assert_eq!(condition(&conditions, CONDITION_READY).status, "True");
}

#[tokio::test]
async fn test_gone_object_awaits_change() {
    let h = harness::<GitHubTeam>();
    let key = ObjectKey::new("vault-admin", "missing");

    let action = reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(h.vault.login_count(), 0);
}

#[tokio::test]
async fn test_deletion_removes_remote_then_finalizer() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    reconcile_object(&key, &h.ctx).await.unwrap();

    h.store.mark_deleted(&key);
    let action = reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert_eq!(h.vault.calls("delete"), 1);
    assert!(h.vault.stored(TEAM_PATH).is_none());
    assert!(h.store.object(&key).is_none());
}

#[tokio::test]
async fn test_non_deletable_kind_keeps_remote_config() {
    let h = harness::<GitHubAuthEngineConfig>();
    let key = h.store.insert(engine_config("1h"));
    reconcile_object(&key, &h.ctx).await.unwrap();

    h.store.mark_deleted(&key);
    reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(h.vault.calls("delete"), 0);
    assert!(h.vault.stored(CONFIG_PATH).is_some());
    assert!(h.store.object(&key).is_none());
}

#[tokio::test]
async fn test_delete_of_missing_remote_is_success() {
    let h = harness::<GitHubTeam>();
    let mut obj = team("platform", "platform", &["platform"]);
    obj.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    let key = h.store.insert(obj);
    h.store.mark_deleted(&key);

    reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(h.vault.calls("delete"), 1);
    assert!(h.store.object(&key).is_none());
}

#[tokio::test]
async fn test_failed_delete_keeps_finalizer() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    reconcile_object(&key, &h.ctx).await.unwrap();

    h.store.mark_deleted(&key);
    h.vault.fail_next(
        "delete",
        VaultError::Transient {
            path: TEAM_PATH.to_string(),
            status: Some(503),
            message: "Vault is sealed".to_string(),
        },
    );
    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Cleanup { .. }));
    let stored = h.store.object(&key).expect("finalizer must hold the object");
    assert!(has_finalizer(&stored));
    assert!(h.vault.stored(TEAM_PATH).is_some());

    let conditions = h.store.conditions(&key);
    let error = condition(&conditions, CONDITION_ERROR);
    assert_eq!(error.status, "True");
    assert_eq!(error.reason.as_deref(), Some("CleanupFailed"));
    assert_eq!(condition(&conditions, CONDITION_READY).status, "False");

    // The next attempt finishes the cleanup
    reconcile_object(&key, &h.ctx).await.unwrap();
    assert!(h.store.object(&key).is_none());
}

#[tokio::test]
async fn test_preparation_failure_is_recorded() {
    let h = harness::<GitHubAuthEngineConfig>();
    let key = h.store.insert(engine_config("soon"));

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Preparation(_)));
    assert_eq!(h.vault.login_count(), 0);
    let conditions = h.store.conditions(&key);
    let error = condition(&conditions, CONDITION_ERROR);
    assert_eq!(error.status, "True");
    assert_eq!(error.reason.as_deref(), Some("PreparationFailed"));
    assert_eq!(error.observed_generation, Some(3));
}

#[tokio::test]
async fn test_invalid_path_is_rejected_before_login() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform team", &["platform"]));

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert_eq!(err.reason(), "InvalidPath");
    assert_eq!(h.vault.login_count(), 0);
}

#[tokio::test]
async fn test_identity_failure_is_an_authentication_error() {
    let h = harness_with::<GitHubTeam>(
        Arc::new(StaticIdentity::failing()),
        FakeRelated::default(),
    );
    let key = h.store.insert(team("platform", "platform", &["platform"]));

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Session(_)));
    let conditions = h.store.conditions(&key);
    assert_eq!(
        condition(&conditions, CONDITION_ERROR).reason.as_deref(),
        Some("AuthenticationFailed")
    );
}

#[tokio::test]
async fn test_permission_denied_on_write() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    for _ in 0..2 {
        h.vault.fail_next(
            "create",
            VaultError::PermissionDenied {
                path: TEAM_PATH.to_string(),
                message: "1 error occurred: permission denied".to_string(),
            },
        );
    }

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert_eq!(err.reason(), "PermissionDenied");
    // One fresh login is attempted before giving up
    assert_eq!(h.vault.calls("create"), 2);
    assert_eq!(h.vault.login_count(), 2);
}

#[tokio::test]
async fn test_revoked_token_is_replaced() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    reconcile_object(&key, &h.ctx).await.unwrap();
    assert_eq!(h.vault.login_count(), 1);

    h.vault.revoke_tokens();
    reconcile_object(&key, &h.ctx).await.unwrap();

    assert_eq!(h.vault.login_count(), 2);
}

#[tokio::test]
async fn test_resources_share_one_login() {
    let h = harness::<GitHubTeam>();
    let first = h.store.insert(team("platform", "platform", &["platform"]));
    let second = h.store.insert(team("security", "security", &["audit"]));

    reconcile_object(&first, &h.ctx).await.unwrap();
    reconcile_object(&second, &h.ctx).await.unwrap();

    assert_eq!(h.vault.login_count(), 1);
    assert_eq!(h.vault.calls("create"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_first_reconciles_share_one_login() {
    let store = Arc::new(FakeStore::<GitHubTeam>::new());
    let vault = Arc::new(FakeVault::new().with_login_delay(Duration::from_millis(200)));
    let ctx = reconciler(&store, &vault, identity(), FakeRelated::default());
    let first = store.insert(team("platform", "platform", &["platform"]));
    let second = store.insert(team("security", "security", &["audit"]));

    let (a, b) = tokio::join!(
        reconcile_object(&first, &ctx),
        reconcile_object(&second, &ctx)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(vault.login_count(), 1);
    assert_eq!(vault.calls("create"), 2);
}

#[tokio::test]
async fn test_ca_bundle_is_read_from_tls_secret() {
    let related = FakeRelated::default().with_secret(
        "vault-admin",
        "vault-ca",
        "ca.crt",
        "-----BEGIN CERTIFICATE-----",
    );
    let h = harness_with::<GitHubTeam>(identity(), related);
    let mut obj = team("platform", "platform", &["platform"]);
    obj.spec.connection = Some(VaultConnection {
        address: Some("https://vault.example.com:8200".to_string()),
        tls_config: Some(TlsConfig {
            tls_secret: Some(SecretReference {
                name: "vault-ca".to_string(),
            }),
            ..TlsConfig::default()
        }),
        ..VaultConnection::default()
    });
    let key = h.store.insert(obj.clone());
    reconcile_object(&key, &h.ctx).await.unwrap();

    // Same reference with a secret that does not exist
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(obj);
    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Preparation(_)));
    assert_eq!(h.vault.login_count(), 0);
}

#[tokio::test]
async fn test_recovery_clears_error_and_backoff() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    h.vault.fail_next(
        "read",
        VaultError::Transient {
            path: TEAM_PATH.to_string(),
            status: None,
            message: "connection refused".to_string(),
        },
    );

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();
    assert_eq!(err.reason(), "VaultUnavailable");
    assert_eq!(h.ctx.next_backoff(&key), (Duration::from_secs(1), 1));
    assert_eq!(h.ctx.next_backoff(&key), (Duration::from_secs(2), 2));

    reconcile_object(&key, &h.ctx).await.unwrap();

    let conditions = h.store.conditions(&key);
    assert_eq!(condition(&conditions, CONDITION_READY).status, "True");
    assert_eq!(condition(&conditions, CONDITION_ERROR).status, "False");
    assert_eq!(h.ctx.next_backoff(&key), (Duration::from_secs(1), 1));
}

#[tokio::test]
async fn test_backoff_is_bounded() {
    let h = harness::<GitHubTeam>();
    let key = ObjectKey::new("vault-admin", "platform");

    let mut previous = Duration::ZERO;
    for _ in 0..20 {
        let (delay, _) = h.ctx.next_backoff(&key);
        assert!(delay >= previous);
        assert!(delay <= Duration::from_secs(60));
        previous = delay;
    }
    assert_eq!(previous, Duration::from_secs(60));
}

#[tokio::test]
async fn test_status_write_failure_surfaces_as_error() {
    let h = harness::<GitHubTeam>();
    let key = h.store.insert(team("platform", "platform", &["platform"]));
    h.store.fail_status_writes();

    let err = reconcile_object(&key, &h.ctx).await.unwrap_err();

    assert!(matches!(err, ReconcilerError::Store(_)));
    // The remote write itself went through
    assert_eq!(h.vault.calls("create"), 1);
}

#[tokio::test]
async fn test_reconcile_entry_point() {
    let h = harness::<GitHubTeam>();
    let obj = team("platform", "platform", &["platform"]);
    h.store.insert(obj.clone());

    let action = reconcile(Arc::new(obj), Arc::new(h.ctx)).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(300)));
    assert_eq!(h.vault.calls("create"), 1);
}
