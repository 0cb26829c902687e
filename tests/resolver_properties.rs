// tests/resolver_properties.rs

use proptest::prelude::*;

use jobsub::backend::{JobIdParser, TokenPick, TokenRule};
use jobsub::config::JobOutDirs;
use jobsub::errors::JobsubError;
use jobsub::settings::SettingsResolver;
use jobsub::task::TaskIdentity;
use jobsub_test_utils::PolicyBuilder;

fn task_name() -> impl Strategy<Value = String> {
    "[A-Z][a-zA-Z0-9_]{0,12}"
}

proptest! {
    // A task that no submit type names falls back to the default type.
    #[test]
    fn unlisted_tasks_use_the_default_type(
        name in task_name(),
        listed in proptest::collection::vec(task_name(), 0..6),
    ) {
        prop_assume!(!listed.contains(&name));

        let listed: Vec<&str> = listed.iter().map(String::as_str).collect();
        let policy = PolicyBuilder::new("scalar")
            .submit_type("scalar", &[("HOST", "0"), ("SUBMIT_TYPE", "slurm")])
            .submit_type("background", &[("HOST", "0")])
            .with_tasks("background", &listed)
            .build();
        let dirs = JobOutDirs::single("/tmp/jobout");
        let task = TaskIdentity::new(format!("/exp/{name}"), 1, "pw", Some("1"), None).unwrap();

        let settings = SettingsResolver::new(&policy, &dirs).resolve(&task).unwrap();
        prop_assert_eq!(settings.policy_type, "scalar");
        prop_assert_eq!(settings.submit_type, "slurm");
    }

    // When two types list the same task, the first one listed wins.
    #[test]
    fn first_listing_type_wins(name in task_name(), swap in any::<bool>()) {
        let (first, second) = if swap { ("hpc", "background") } else { ("background", "hpc") };
        let policy = PolicyBuilder::new("background")
            .submit_type(first, &[("HOST", "0")])
            .submit_type(second, &[("HOST", "0")])
            .with_tasks(first, &[name.as_str()])
            .with_tasks(second, &[name.as_str()])
            .build();
        let dirs = JobOutDirs::single("/tmp/jobout");
        let task = TaskIdentity::new(format!("/exp/{name}"), 1, "pw", Some("1"), None).unwrap();

        let settings = SettingsResolver::new(&policy, &dirs).resolve(&task).unwrap();
        prop_assert_eq!(settings.policy_type, first);
    }

    // Resolution is deterministic.
    #[test]
    fn resolving_twice_gives_equal_settings(name in task_name(), coldstart in any::<bool>()) {
        let policy = PolicyBuilder::new("background")
            .submit_type("background", &[("HOST", "0"), ("QUEUE", "#PBS -q ns")])
            .coldstart_task(&name)
            .build();
        let dirs = JobOutDirs::single("/tmp/jobout");
        let task = TaskIdentity::new(format!("/exp/{name}"), 1, "pw", Some("1"), None).unwrap();

        let resolver = SettingsResolver::new(&policy, &dirs).coldstart(coldstart);
        let a = resolver.resolve(&task).unwrap();
        let b = resolver.resolve(&task).unwrap();
        prop_assert_eq!(a.force_complete.is_some(), coldstart);
        prop_assert_eq!(a, b);
    }

    // Only the last line is split; any other token count is rejected.
    #[test]
    fn job_id_rule_checks_token_count(
        tokens in proptest::collection::vec("[a-z0-9.]{1,8}", 1..10),
        expected in 1usize..8,
    ) {
        let rule = TokenRule::new(expected, TokenPick::Last);
        let output = format!("some preamble\n{}\n\n", tokens.join(" "));

        match rule.parse_job_id(&output) {
            Ok(handle) => {
                prop_assert_eq!(tokens.len(), expected);
                prop_assert_eq!(handle.as_str(), tokens[expected - 1].as_str());
            }
            Err(JobsubError::JobIdParse { expected: e, actual, .. }) => {
                prop_assert_eq!(e, expected);
                prop_assert_eq!(actual, tokens.len());
                prop_assert_ne!(actual, expected);
            }
            Err(other) => prop_assert!(false, "unexpected error: {other}"),
        }
    }
}

#[test]
fn missing_host_is_a_configuration_error() {
    let policy = PolicyBuilder::new("background")
        .submit_type("background", &[("SUBMIT_TYPE", "background")])
        .build();
    let dirs = JobOutDirs::single("/tmp/jobout");
    let task = TaskIdentity::new("/exp/InitRun", 1, "pw", Some("1"), None).unwrap();

    let err = SettingsResolver::new(&policy, &dirs)
        .resolve(&task)
        .unwrap_err();
    assert!(matches!(err, JobsubError::MissingHost));
    assert!(err.is_config_error());
}
