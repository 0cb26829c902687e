// src/settings/resolver.rs

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::config::model::{JobOutDirs, SettingValue, SubmissionPolicy};
use crate::config::validate::variables_from_table;
use crate::errors::{JobsubError, Result};
use crate::settings::exceptions::force_complete_reason;
use crate::settings::{Directive, ResolvedSettings};
use crate::task::{JobPaths, TaskIdentity};
use crate::types::HostIndex;

pub const DEFAULT_INTERPRETER: &str = "#!/usr/bin/env python3";
pub const DEFAULT_SUBMIT_TYPE: &str = "background";

/// Resolves the settings of one task from a validated policy.
///
/// ```ignore
/// let settings = SettingsResolver::new(&policy, &joboutdirs)
///     .coldstart(true)
///     .resolve(&task)?;
/// ```
pub struct SettingsResolver<'a> {
    policy: &'a SubmissionPolicy,
    joboutdirs: &'a JobOutDirs,
    coldstart: bool,
    interpreter: String,
}

impl<'a> SettingsResolver<'a> {
    pub fn new(policy: &'a SubmissionPolicy, joboutdirs: &'a JobOutDirs) -> Self {
        Self {
            policy,
            joboutdirs,
            coldstart: false,
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }

    pub fn coldstart(mut self, coldstart: bool) -> Self {
        self.coldstart = coldstart;
        self
    }

    /// Interpreter line used when the policy does not set `INTERPRETER`.
    pub fn interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn resolve(&self, task: &TaskIdentity) -> Result<ResolvedSettings> {
        let force_complete = force_complete_reason(self.policy, task, self.coldstart);

        let policy_type = self.select_submit_type(task.name()).to_string();
        debug!(task = %task.path(), %policy_type, "selected submit type");

        let merged = self.merged_settings(&policy_type, task.name());
        let classified = classify(merged, &self.interpreter)?;

        let host = classified.host.ok_or(JobsubError::MissingHost)?;
        let local_dir = self
            .joboutdirs
            .get(HostIndex::Primary)
            .ok_or(JobsubError::MissingJobOutDir(HostIndex::Primary))?;
        let host_dir = self
            .joboutdirs
            .get(host)
            .ok_or(JobsubError::MissingJobOutDir(host))?;

        Ok(ResolvedSettings {
            policy_type,
            submit_type: classified.submit_type,
            host,
            header: classified.header,
            trailer: classified.trailer,
            wrapper: classified.wrapper,
            interpreter: classified.interpreter,
            submit_variables: classified.submit_variables,
            remote_command: classified.remote_command,
            force_complete,
            paths: JobPaths::new(task, local_dir, host_dir),
        })
    }

    /// First listed type that names the task, else the default.
    fn select_submit_type(&self, task_name: &str) -> &str {
        self.policy
            .submit_types()
            .iter()
            .find(|name| {
                self.policy
                    .submit_type(name)
                    .is_some_and(|def| def.tasks.iter().any(|t| t == task_name))
            })
            .map(String::as_str)
            .unwrap_or_else(|| self.policy.default_submit_type())
    }

    fn merged_settings(&self, policy_type: &str, task_name: &str) -> IndexMap<String, SettingValue> {
        let mut merged = self
            .policy
            .submit_type(policy_type)
            .map(|def| def.settings.clone())
            .unwrap_or_default();

        if let Some(overrides) = self.policy.task_exception(task_name) {
            debug!(task = %task_name, keys = overrides.len(), "applying task exceptions");
            for (key, value) in overrides.iter() {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

struct Classified {
    submit_type: String,
    host: Option<HostIndex>,
    header: IndexMap<String, String>,
    trailer: IndexMap<String, String>,
    wrapper: Option<String>,
    interpreter: String,
    submit_variables: Option<IndexMap<String, String>>,
    remote_command: Option<String>,
}

fn classify(merged: IndexMap<String, SettingValue>, interpreter: &str) -> Result<Classified> {
    let mut out = Classified {
        submit_type: DEFAULT_SUBMIT_TYPE.to_string(),
        host: None,
        header: IndexMap::new(),
        trailer: IndexMap::new(),
        wrapper: None,
        interpreter: interpreter.to_string(),
        submit_variables: None,
        remote_command: None,
    };

    for (key, value) in merged {
        let Some(directive) = Directive::classify(&key) else {
            match value.as_text() {
                Some(text) => {
                    out.header.insert(key, text);
                }
                None => warn!(%key, "nested table cannot be written to a job header; skipped"),
            }
            continue;
        };

        match directive {
            Directive::SubmitType => {
                let text = scalar(&key, &value)?;
                if !text.is_empty() {
                    out.submit_type = text;
                }
            }
            Directive::Ssh => out.remote_command = Some(scalar(&key, &value)?),
            Directive::Interpreter => out.interpreter = scalar(&key, &value)?,
            Directive::Wrapper => out.wrapper = Some(scalar(&key, &value)?),
            Directive::Host => {
                let text = scalar(&key, &value)?;
                let host = text.parse::<HostIndex>().map_err(JobsubError::InvalidHost)?;
                out.host = Some(host);
            }
            Directive::SubmitVariables => {
                let table = value.as_table().ok_or_else(|| {
                    JobsubError::ConfigError("SUBMIT_VARIABLES must be a table".to_string())
                })?;
                out.submit_variables = Some(variables_from_table(table));
            }
            Directive::Trailer => match &value {
                SettingValue::Table(table) => {
                    for (k, v) in table.iter() {
                        if let Some(text) = v.as_text() {
                            out.trailer.insert(k.clone(), text);
                        }
                    }
                }
                other => {
                    out.trailer.insert(key.clone(), scalar(&key, other)?);
                }
            },
        }
    }
    Ok(out)
}

fn scalar(key: &str, value: &SettingValue) -> Result<String> {
    value
        .as_text()
        .ok_or_else(|| JobsubError::ConfigError(format!("{key} must be a scalar value")))
}
