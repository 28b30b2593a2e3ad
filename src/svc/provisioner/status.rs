//! # Status module
//!
//! This module provide helpers to compute the conditions of a gateway and to
//! tell whether its status has to be written.

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

use crate::svc::crd::{
    gateway::{GATEWAY_CONDITION_SCHEDULED, GATEWAY_REASON_NOT_RECONCILED, GATEWAY_REASON_SCHEDULED},
    CONDITION_FALSE, CONDITION_TRUE,
};

// -----------------------------------------------------------------------------
// Helpers functions

/// returns the condition which marks the gateway as provisioned
pub fn scheduled(generation: Option<i64>, now: DateTime<Utc>) -> Condition {
    Condition {
        type_: GATEWAY_CONDITION_SCHEDULED.to_string(),
        status: CONDITION_TRUE.to_string(),
        reason: GATEWAY_REASON_SCHEDULED.to_string(),
        message: "Gateway is scheduled".to_string(),
        observed_generation: generation,
        last_transition_time: Time(now),
    }
}

/// returns the condition which marks the gateway as not provisioned yet
pub fn not_reconciled(generation: Option<i64>, message: &str, now: DateTime<Utc>) -> Condition {
    Condition {
        type_: GATEWAY_CONDITION_SCHEDULED.to_string(),
        status: CONDITION_FALSE.to_string(),
        reason: GATEWAY_REASON_NOT_RECONCILED.to_string(),
        message: message.to_string(),
        observed_generation: generation,
        last_transition_time: Time(now),
    }
}

/// returns the conditions with the given one inserted or updated, and whether
/// something changed. A condition of the same type which is already true is
/// never modified.
pub fn upsert_condition(
    conditions: &[Condition],
    mut condition: Condition,
    now: DateTime<Utc>,
) -> (Vec<Condition>, bool) {
    let mut conditions = conditions.to_vec();

    let current = match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        None => {
            condition.last_transition_time = Time(now);
            conditions.push(condition);
            return (conditions, true);
        }
        Some(current) => current,
    };

    if current.status == CONDITION_TRUE {
        return (conditions, false);
    }

    if current.status == condition.status
        && current.reason == condition.reason
        && current.message == condition.message
        && current.observed_generation == condition.observed_generation
    {
        return (conditions, false);
    }

    condition.last_transition_time = if current.status == condition.status {
        current.last_transition_time.to_owned()
    } else {
        Time(now)
    };

    *current = condition;
    (conditions, true)
}
