// Copyright (c) 2025 Helmsman Authors
// SPDX-License-Identifier: MIT

//! Status condition algebra for Helmsman resources.
//!
//! All condition writes in the controller go through [`set_condition`], which
//! merges one condition into a condition list and reports what changed. The
//! merge owns the `lastTransitionTime` rule: the timestamp is preserved when
//! only `reason` or `message` change and advances only when `status` flips.
//! Lists are kept sorted by condition type so diffs are stable.
//!
//! # Example
//!
//! ```rust
//! use helmsman::conditions::{new_condition, set_condition};
//!
//! let mut conditions = Vec::new();
//! let diff = set_condition(
//!     &mut conditions,
//!     new_condition("Strategy", "False", "WaitingForCapacity", "capacity pending in c1"),
//! );
//! assert!(diff.is_some());
//!
//! // Re-writing identical content is a no-op.
//! let diff = set_condition(
//!     &mut conditions,
//!     new_condition("Strategy", "False", "WaitingForCapacity", "capacity pending in c1"),
//! );
//! assert!(diff.is_none());
//! ```

use crate::crd::Condition;
use chrono::Utc;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};

/// When set, newly created conditions carry no `lastTransitionTime`.
///
/// Tests flip this on to compare condition lists structurally without
/// wall-clock noise. Production code never touches it.
static DISCARD_TIMESTAMPS: AtomicBool = AtomicBool::new(false);

/// Enable or disable timestamping of new conditions. Test use only.
pub fn discard_timestamps(discard: bool) {
    DISCARD_TIMESTAMPS.store(discard, Ordering::SeqCst);
}

fn transition_time_now() -> Option<String> {
    if DISCARD_TIMESTAMPS.load(Ordering::SeqCst) {
        None
    } else {
        Some(Utc::now().to_rfc3339())
    }
}

/// Create a new condition stamped with the current time.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g. `Strategy`, `Ready`)
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase`
/// * `message` - A human-readable explanation
#[must_use]
pub fn new_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: transition_time_now(),
    }
}

/// Find a condition by type.
#[must_use]
pub fn get_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Two conditions are equal iff `type`, `status`, `reason` and `message` all
/// match. Transition times never participate in equality.
#[must_use]
pub fn conditions_equal(a: &Condition, b: &Condition) -> bool {
    a.r#type == b.r#type && a.status == b.status && a.reason == b.reason && a.message == b.message
}

/// Merge one condition into a condition list.
///
/// Returns `None` when the list already carries an equal condition (no write
/// happened), otherwise a human-readable `[old] -> [new]` description of the
/// transition. When the existing condition differs only in `reason` or
/// `message`, its `lastTransitionTime` is preserved; a `status` change takes
/// the incoming timestamp.
///
/// The list stays sorted by condition type.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) -> Option<String> {
    match conditions.iter_mut().find(|c| c.r#type == condition.r#type) {
        Some(existing) => {
            if conditions_equal(existing, &condition) {
                return None;
            }
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            let diff = format!("[{}] -> [{}]", describe(existing), describe(&condition));
            *existing = condition;
            Some(diff)
        }
        None => {
            let diff = format!("[] -> [{}]", describe(&condition));
            conditions.push(condition);
            conditions.sort_by(|a, b| a.r#type.cmp(&b.r#type));
            Some(diff)
        }
    }
}

fn describe(condition: &Condition) -> String {
    let mut out = format!("{} {}", condition.r#type, condition.status);
    if let Some(reason) = &condition.reason {
        let _ = write!(out, " {reason}");
    }
    if let Some(message) = &condition.message {
        let _ = write!(out, " \"{message}\"");
    }
    out
}

#[cfg(test)]
#[path = "conditions_tests.rs"]
mod conditions_tests;
