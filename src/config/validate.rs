// src/config/validate.rs

use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use tracing::warn;

use crate::config::model::{
    DEFAULT_PORT_OFFSET, ExceptionPredicate, RawSubmissionPolicy, ServerSettings, SettingValue,
    SubmissionPolicy,
};
use crate::errors::{JobsubError, Result};
use crate::settings::Directive;

impl TryFrom<RawSubmissionPolicy> for SubmissionPolicy {
    type Error = crate::errors::JobsubError;

    fn try_from(raw: RawSubmissionPolicy) -> std::result::Result<Self, Self::Error> {
        validate_raw_policy(&raw)?;
        Ok(SubmissionPolicy::new_unchecked(raw))
    }
}

fn validate_raw_policy(policy: &RawSubmissionPolicy) -> Result<()> {
    ensure_default_type(policy)?;
    validate_submit_variables(policy)?;
    warn_unknown_predicates(policy);
    Ok(())
}

fn ensure_default_type(policy: &RawSubmissionPolicy) -> Result<()> {
    if policy.default_submit_type.trim().is_empty() {
        return Err(JobsubError::ConfigError(
            "default_submit_type must not be empty".to_string(),
        ));
    }
    if !policy.types.contains_key(&policy.default_submit_type) {
        // Not fatal: tasks falling back to it will fail on the missing HOST.
        warn!(
            submit_type = %policy.default_submit_type,
            "default submit type has no definition"
        );
    }
    for name in policy.submit_types.iter() {
        if !policy.types.contains_key(name) {
            warn!(submit_type = %name, "listed submit type has no definition");
        }
    }
    Ok(())
}

fn validate_submit_variables(policy: &RawSubmissionPolicy) -> Result<()> {
    let key = Directive::SubmitVariables.key();

    for (name, def) in policy.types.iter() {
        if let Some(value) = def.settings.get(key) {
            check_variables_table(value, &format!("submit type '{name}'"))?;
        }
    }
    for (task, overrides) in policy.task_exceptions.iter() {
        if let Some(value) = overrides.get(key) {
            check_variables_table(value, &format!("task exception '{task}'"))?;
        }
    }
    Ok(())
}

fn check_variables_table(value: &SettingValue, owner: &str) -> Result<()> {
    let table = value.as_table().ok_or_else(|| {
        JobsubError::ConfigError(format!("{owner}: SUBMIT_VARIABLES must be a table"))
    })?;
    for (var, val) in table.iter() {
        if !shell_identifier().is_match(var) {
            return Err(JobsubError::ConfigError(format!(
                "{owner}: '{var}' in SUBMIT_VARIABLES is not a valid variable name"
            )));
        }
        if val.as_text().is_none() {
            return Err(JobsubError::ConfigError(format!(
                "{owner}: SUBMIT_VARIABLES.{var} must be a scalar value"
            )));
        }
    }
    Ok(())
}

fn warn_unknown_predicates(policy: &RawSubmissionPolicy) {
    for (state, rules) in policy.submit_exceptions.iter() {
        for (name, predicate) in rules.task.iter().chain(rules.family.iter()) {
            if let ExceptionPredicate::Unknown(p) = predicate {
                warn!(%state, %name, predicate = %p, "unknown exception predicate; rule never applies");
            }
        }
    }
}

fn shell_identifier() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

/// Turn a validated `SUBMIT_VARIABLES` table into plain strings.
pub(crate) fn variables_from_table(
    table: &IndexMap<String, SettingValue>,
) -> IndexMap<String, String> {
    table
        .iter()
        .filter_map(|(k, v)| v.as_text().map(|v| (k.clone(), v)))
        .collect()
}

impl ServerSettings {
    /// Effective port: base port (default: uid) plus offset (default: 1500).
    pub fn effective_port(&self) -> Result<u16> {
        let base = match &self.port {
            Some(v) => parse_port_part(v, "ECF_PORT")?,
            None => current_uid(),
        };
        let offset = match &self.port_offset {
            Some(v) => parse_port_part(v, "ECF_PORT_OFFSET")?,
            None => DEFAULT_PORT_OFFSET,
        };
        let port = base.checked_add(offset).unwrap_or(u32::MAX);
        u16::try_from(port).map_err(|_| {
            JobsubError::ConfigError(format!(
                "server port {base} + offset {offset} does not fit in a TCP port"
            ))
        })
    }
}

fn parse_port_part(value: &SettingValue, key: &str) -> Result<u32> {
    value
        .as_text()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| JobsubError::ConfigError(format!("{key} must be a non-negative integer")))
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}
