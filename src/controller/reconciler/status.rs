//! # Conditions
//!
//! Builds the condition list written to a resource's status.
//!
//! Conditions live in a map keyed by type and are written back as a whole,
//! once per reconciliation. `lastTransitionTime` only moves when a
//! condition's status flips, so repeated successful passes produce an
//! identical list and the status write can be skipped.

use crate::crd::Condition;
use chrono::SecondsFormat;
use std::collections::BTreeMap;

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_ERROR: &str = "Error";

const REASON_RECONCILED: &str = "Reconciled";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    conditions: BTreeMap<String, Condition>,
}

impl ConditionSet {
    /// Start from the conditions currently recorded on the resource
    #[must_use]
    pub fn from_existing(conditions: &[Condition]) -> Self {
        Self {
            conditions: conditions
                .iter()
                .map(|c| (c.r#type.clone(), c.clone()))
                .collect(),
        }
    }

    /// Replace the condition of `condition_type`
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        observed_generation: Option<i64>,
    ) {
        let status = if status { "True" } else { "False" }.to_string();
        let last_transition_time = match self.conditions.get(condition_type) {
            Some(existing) if existing.status == status => existing.last_transition_time.clone(),
            _ => Some(chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        };

        self.conditions.insert(
            condition_type.to_string(),
            Condition {
                r#type: condition_type.to_string(),
                status,
                last_transition_time,
                reason: Some(reason.to_string()),
                message: Some(message.to_string()),
                observed_generation,
            },
        );
    }

    /// Ready=True, Error=False
    pub fn mark_ready(&mut self, message: &str, observed_generation: Option<i64>) {
        self.set_condition(
            CONDITION_READY,
            true,
            REASON_RECONCILED,
            message,
            observed_generation,
        );
        self.set_condition(
            CONDITION_ERROR,
            false,
            REASON_RECONCILED,
            "",
            observed_generation,
        );
    }

    /// Error=True with the cause, Ready=False
    pub fn mark_error(&mut self, reason: &str, message: &str, observed_generation: Option<i64>) {
        self.set_condition(CONDITION_ERROR, true, reason, message, observed_generation);
        self.set_condition(CONDITION_READY, false, reason, message, observed_generation);
    }

    #[must_use]
    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.get(condition_type)
    }

    /// Conditions ordered by type
    #[must_use]
    pub fn get_conditions(&self) -> Vec<Condition> {
        self.conditions.values().cloned().collect()
    }

    /// Whether writing this set would change what `current` records
    #[must_use]
    pub fn differs_from(&self, current: &[Condition]) -> bool {
        *self != Self::from_existing(current)
    }
}
