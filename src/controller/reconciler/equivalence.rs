//! # Equivalence
//!
//! Decides whether the configuration Vault returned already matches the
//! payload a resource would write.
//!
//! Vault echoes more than it was sent (defaults, derived keys) and rewrites
//! some values (TTL strings come back as seconds), so a plain `==` on the two
//! maps would report drift on every pass. The comparison here:
//!
//! - only looks at keys the desired payload manages
//! - treats a zero value and an absent key as the same thing
//! - compares duration fields as whole seconds
//! - compares numbers by value, so `5` and `5.0` match

use crate::controller::reconciler::validation::parse_duration_secs;
use crate::crd::{Payload, is_zero_value};
use serde_json::Value;

/// True when `remote` already holds everything `desired` would write
#[must_use]
pub fn is_equivalent(desired: &Payload, remote: &Payload, duration_fields: &[&str]) -> bool {
    desired.iter().all(|(key, want)| {
        let have = remote.get(key).unwrap_or(&Value::Null);
        if is_zero_value(want) || is_zero_value(have) {
            return is_zero_value(want) == is_zero_value(have)
                || durations_match(key, want, have, duration_fields);
        }
        if duration_fields.contains(&key.as_str()) {
            return durations_match(key, want, have, duration_fields);
        }
        values_match(want, have)
    })
}

fn durations_match(key: &str, want: &Value, have: &Value, duration_fields: &[&str]) -> bool {
    if !duration_fields.contains(&key) {
        return false;
    }
    let want = if is_zero_value(want) { Some(0) } else { parse_duration_secs(want) };
    let have = if is_zero_value(have) { Some(0) } else { parse_duration_secs(have) };
    want.is_some() && want == have
}

fn values_match(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.iter()
                .filter(|(_, v)| !is_zero_value(v))
                .all(|(k, v)| b.get(k).is_some_and(|other| values_match(v, other)))
                && b.iter()
                    .filter(|(_, v)| !is_zero_value(v))
                    .all(|(k, _)| a.get(k).is_some_and(|v| !is_zero_value(v)))
        }
        _ => want == have,
    }
}
