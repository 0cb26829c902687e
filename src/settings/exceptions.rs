// src/settings/exceptions.rs

//! State exceptions: tasks (or whole families) that are forced into a state
//! instead of being submitted.

use tracing::{debug, info};

use crate::config::model::{ExceptionPredicate, SubmissionPolicy};
use crate::task::TaskIdentity;

/// The only state an exception can currently force.
pub const COMPLETE_STATE: &str = "complete";

/// Evaluate every state exception against `task`.
///
/// Returns the reason the task must be forced complete, if any. All rules
/// are evaluated; when several match, the last one wins.
pub fn force_complete_reason(
    policy: &SubmissionPolicy,
    task: &TaskIdentity,
    coldstart: bool,
) -> Option<String> {
    let mut reason = None;

    for (state, rules) in policy.state_exceptions().iter() {
        if state != COMPLETE_STATE {
            debug!(%state, "ignoring exceptions for unsupported state");
            continue;
        }

        for (name, predicate) in rules.task.iter() {
            if name == task.name() && applies(predicate, coldstart) {
                reason = Some(format!("Task {name} complete due to cold start"));
            }
        }

        let families = task.families();
        for (name, predicate) in rules.family.iter() {
            if families.iter().any(|f| f == name) && applies(predicate, coldstart) {
                reason = Some(format!("Family {name} complete due to cold start"));
            }
        }
    }

    if let Some(ref r) = reason {
        info!(task = %task.path(), reason = %r, "task will be forced complete");
    }
    reason
}

fn applies(predicate: &ExceptionPredicate, coldstart: bool) -> bool {
    match predicate {
        ExceptionPredicate::IsColdstart => coldstart,
        ExceptionPredicate::Unknown(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RawSubmissionPolicy;

    fn policy(exceptions: &str) -> SubmissionPolicy {
        let json = format!(
            r#"{{
                "submit_types": [],
                "default_submit_type": "batch",
                "batch": {{ "HOST": "0" }},
                "submit_exceptions": {exceptions}
            }}"#
        );
        let raw: RawSubmissionPolicy = serde_json::from_str(&json).unwrap();
        SubmissionPolicy::try_from(raw).unwrap()
    }

    fn forecast() -> TaskIdentity {
        TaskIdentity::new("/exp/Forecasting/Forecast", 1, "pw", Some("1"), None).unwrap()
    }

    #[test]
    fn task_rule_applies_only_on_coldstart() {
        let policy = policy(r#"{ "complete": { "task": { "Forecast": "is_coldstart" } } }"#);
        assert_eq!(
            force_complete_reason(&policy, &forecast(), true).as_deref(),
            Some("Task Forecast complete due to cold start")
        );
        assert_eq!(force_complete_reason(&policy, &forecast(), false), None);
    }

    #[test]
    fn family_rule_wins_over_task_rule() {
        let policy = policy(
            r#"{ "complete": {
                "task": { "Forecast": "is-coldstart" },
                "family": { "Forecasting": "is_coldstart" }
            } }"#,
        );
        assert_eq!(
            force_complete_reason(&policy, &forecast(), true).as_deref(),
            Some("Family Forecasting complete due to cold start")
        );
    }

    #[test]
    fn unknown_states_and_predicates_never_apply() {
        let policy = policy(
            r#"{
                "aborted": { "task": { "Forecast": "is_coldstart" } },
                "complete": { "task": { "Forecast": "always" } }
            }"#,
        );
        assert_eq!(force_complete_reason(&policy, &forecast(), true), None);
    }
}
