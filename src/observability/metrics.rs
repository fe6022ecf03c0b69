//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `vault_config_reconciliations_total{kind}` - Reconciliation attempts
//! - `vault_config_reconciliation_errors_total{kind,reason}` - Failed attempts by reason
//! - `vault_config_reconciliation_duration_seconds{kind}` - Duration of one attempt
//! - `vault_config_remote_changes_total{kind,action}` - Creates, updates, deletes and no-ops
//! - `vault_config_requeues_total{reason}` - Requeues scheduled by the controller
//! - `vault_config_vault_operations_total{operation,outcome}` - Vault HTTP calls
//! - `vault_config_vault_operation_duration_seconds{operation}` - Duration of Vault HTTP calls
//! - `vault_config_vault_logins_total{outcome}` - Kubernetes auth logins
//! - `vault_config_session_cache_hits_total` - Sessions served from the cache

use anyhow::Result;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_reconciliations_total",
            "Total number of reconciliation attempts",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_reconciliation_errors_total",
            "Total number of failed reconciliation attempts by reason",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vault_config_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REMOTE_CHANGES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_remote_changes_total",
            "Outcome of each successful pass against Vault (created, updated, unchanged, deleted)",
        ),
        &["kind", "action"],
    )
    .expect("Failed to create REMOTE_CHANGES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static VAULT_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_vault_operations_total",
            "Total number of Vault API calls by operation and outcome",
        ),
        &["operation", "outcome"],
    )
    .expect("Failed to create VAULT_OPERATIONS_TOTAL metric - this should never happen")
});

static VAULT_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vault_config_vault_operation_duration_seconds",
            "Duration of Vault API calls in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
        &["operation"],
    )
    .expect("Failed to create VAULT_OPERATION_DURATION metric - this should never happen")
});

static VAULT_LOGINS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vault_config_vault_logins_total",
            "Total number of Kubernetes auth logins by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create VAULT_LOGINS_TOTAL metric - this should never happen")
});

static SESSION_CACHE_HITS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vault_config_session_cache_hits_total",
        "Total number of Vault sessions served from the cache",
    )
    .expect("Failed to create SESSION_CACHE_HITS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REMOTE_CHANGES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VAULT_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VAULT_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(VAULT_LOGINS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SESSION_CACHE_HITS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_remote_changes(kind: &str, action: &str) {
    REMOTE_CHANGES_TOTAL.with_label_values(&[kind, action]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_vault_operations(operation: &str, outcome: &str) {
    VAULT_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn observe_vault_operation_duration(operation: &str, duration: f64) {
    VAULT_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_vault_logins(outcome: &str) {
    VAULT_LOGINS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn increment_session_cache_hits() {
    SESSION_CACHE_HITS_TOTAL.inc();
}
