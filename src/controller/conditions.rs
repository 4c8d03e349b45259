//! Condition management helpers following Kubernetes API conventions
//!
//! The resolved unit status is mirrored onto `Ready` and `Degraded`
//! conditions so cluster tooling can read it without knowing about charms.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::status::{StatusLevel, UnitStatus};

pub const CONDITION_TYPE_READY: &str = "Ready";
pub const CONDITION_TYPE_DEGRADED: &str = "Degraded";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
}

/// Update or add a condition to the conditions list
///
/// The transition time only moves when the condition's status flips.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();

    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let should_update_time = existing.status != status;

        existing.status = status.to_string();
        existing.reason = reason.to_string();
        existing.message = message.to_string();

        if should_update_time {
            existing.last_transition_time = now;
        }
    } else {
        conditions.push(Condition {
            type_: type_.to_string(),
            status: status.to_string(),
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        });
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_)
        .map(|c| c.status == CONDITION_STATUS_TRUE)
        .unwrap_or(false)
}

fn reason_for(level: StatusLevel) -> &'static str {
    match level {
        StatusLevel::Active => "Active",
        StatusLevel::Waiting => "Waiting",
        StatusLevel::Blocked => "Blocked",
    }
}

/// Reflect a resolved unit status onto `Ready` and `Degraded`
pub fn apply_unit_status(conditions: &mut Vec<Condition>, status: &UnitStatus) {
    let reason = reason_for(status.level);
    let ready = if status.level == StatusLevel::Active {
        CONDITION_STATUS_TRUE
    } else {
        CONDITION_STATUS_FALSE
    };
    set_condition(
        conditions,
        CONDITION_TYPE_READY,
        ready,
        reason,
        &status.message,
    );

    let (degraded, message) = if status.level == StatusLevel::Blocked {
        (CONDITION_STATUS_TRUE, status.message.as_str())
    } else {
        (CONDITION_STATUS_FALSE, "No degradation detected")
    };
    set_condition(
        conditions,
        CONDITION_TYPE_DEGRADED,
        degraded,
        reason,
        message,
    );
}
