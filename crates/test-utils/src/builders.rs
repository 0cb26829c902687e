#![allow(dead_code)]

use std::fs;

use indexmap::IndexMap;
use jobsub::config::{
    ExceptionPredicate, RawSubmissionPolicy, SettingValue, StateExceptionRules, SubmissionPolicy,
    SubmitTypeDef,
};
use jobsub::settings::ResolvedSettings;
use jobsub::task::TaskIdentity;

/// Builder for `SubmissionPolicy` to simplify test setup.
pub struct PolicyBuilder {
    policy: RawSubmissionPolicy,
}

impl PolicyBuilder {
    pub fn new(default_submit_type: &str) -> Self {
        Self {
            policy: RawSubmissionPolicy {
                submit_types: vec![],
                default_submit_type: default_submit_type.to_string(),
                task_exceptions: IndexMap::new(),
                submit_exceptions: IndexMap::new(),
                types: IndexMap::new(),
            },
        }
    }

    /// Add (or extend) a submit type with plain text settings.
    pub fn submit_type(mut self, name: &str, settings: &[(&str, &str)]) -> Self {
        if !self.policy.submit_types.iter().any(|t| t == name) {
            self.policy.submit_types.push(name.to_string());
        }
        let def = self.type_def(name);
        for (key, value) in settings {
            def.settings.insert(key.to_string(), SettingValue::from(*value));
        }
        self
    }

    pub fn with_tasks(mut self, submit_type: &str, tasks: &[&str]) -> Self {
        let def = self.type_def(submit_type);
        def.tasks.extend(tasks.iter().map(|t| t.to_string()));
        self
    }

    pub fn submit_variable(mut self, submit_type: &str, key: &str, value: &str) -> Self {
        let def = self.type_def(submit_type);
        let vars = def
            .settings
            .entry("SUBMIT_VARIABLES".to_string())
            .or_insert_with(|| SettingValue::Table(IndexMap::new()));
        if let SettingValue::Table(table) = vars {
            table.insert(key.to_string(), SettingValue::from(value));
        }
        self
    }

    pub fn task_exception(mut self, task: &str, key: &str, value: &str) -> Self {
        self.policy
            .task_exceptions
            .entry(task.to_string())
            .or_default()
            .insert(key.to_string(), SettingValue::from(value));
        self
    }

    /// Force `task` complete on cold start.
    pub fn coldstart_task(mut self, task: &str) -> Self {
        self.complete_rules()
            .task
            .insert(task.to_string(), ExceptionPredicate::IsColdstart);
        self
    }

    /// Force every task below `family` complete on cold start.
    pub fn coldstart_family(mut self, family: &str) -> Self {
        self.complete_rules()
            .family
            .insert(family.to_string(), ExceptionPredicate::IsColdstart);
        self
    }

    pub fn build(self) -> SubmissionPolicy {
        SubmissionPolicy::try_from(self.policy).expect("Failed to build valid policy from builder")
    }

    fn type_def(&mut self, name: &str) -> &mut SubmitTypeDef {
        self.policy.types.entry(name.to_string()).or_default()
    }

    fn complete_rules(&mut self) -> &mut StateExceptionRules {
        self.policy
            .submit_exceptions
            .entry("complete".to_string())
            .or_default()
    }
}

/// First attempt of `path` with a fixed remote id.
pub fn task(path: &str) -> TaskIdentity {
    TaskIdentity::new(path, 1, "secret", Some("1234"), None).expect("valid task path")
}

/// Create the generated job script the writer expects to find.
pub fn write_job_stub(settings: &ResolvedSettings, body: &str) {
    let job = &settings.paths.job;
    if let Some(parent) = job.parent() {
        fs::create_dir_all(parent).expect("create job directory");
    }
    fs::write(job, body).expect("write job stub");
}
