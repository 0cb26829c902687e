// src/settings/mod.rs

//! Per-task submission settings.
//!
//! [`SettingsResolver`] turns a [`SubmissionPolicy`](crate::config::SubmissionPolicy)
//! plus a [`TaskIdentity`](crate::task::TaskIdentity) into a flat, immutable
//! [`ResolvedSettings`]:
//!
//! - [`exceptions`] evaluates the per-state override rules (cold start).
//! - [`resolver`] selects the submit type, merges task exceptions and
//!   classifies directives.

pub mod exceptions;
pub mod resolver;

use indexmap::IndexMap;

use crate::task::JobPaths;
use crate::types::HostIndex;

pub use resolver::{DEFAULT_INTERPRETER, SettingsResolver};

/// Setting keys with a meaning of their own. Every other key is copied
/// into the job script header as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    SubmitType,
    Ssh,
    Interpreter,
    SubmitVariables,
    Wrapper,
    Host,
    Trailer,
}

impl Directive {
    pub const ALL: [Directive; 7] = [
        Directive::SubmitType,
        Directive::Ssh,
        Directive::Interpreter,
        Directive::SubmitVariables,
        Directive::Wrapper,
        Directive::Host,
        Directive::Trailer,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Directive::SubmitType => "SUBMIT_TYPE",
            Directive::Ssh => "SSH",
            Directive::Interpreter => "INTERPRETER",
            Directive::SubmitVariables => "SUBMIT_VARIABLES",
            Directive::Wrapper => "WRAPPER",
            Directive::Host => "HOST",
            Directive::Trailer => "TRAILER",
        }
    }

    /// `None` means "plain header entry".
    pub fn classify(key: &str) -> Option<Directive> {
        Directive::ALL.into_iter().find(|d| d.key() == key)
    }
}

/// Settings for one task attempt, fully resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSettings {
    /// Policy bucket the task fell into (e.g. `"scalar"`).
    pub policy_type: String,
    /// Backend selector from `SUBMIT_TYPE` (default `"background"`).
    pub submit_type: String,
    pub host: HostIndex,
    /// Header entries in insertion order.
    pub header: IndexMap<String, String>,
    pub trailer: IndexMap<String, String>,
    pub wrapper: Option<String>,
    pub interpreter: String,
    pub submit_variables: Option<IndexMap<String, String>>,
    /// Prefix (e.g. `ssh user@host`) wrapped around every job command.
    pub remote_command: Option<String>,
    /// Set when a state exception says the task must not run.
    pub force_complete: Option<String>,
    pub paths: JobPaths,
}

impl ResolvedSettings {
    /// Apply the remote prefix, if any: `<prefix> "<command>"`.
    pub fn remote_wrapped(&self, cmd: &str) -> String {
        match &self.remote_command {
            Some(prefix) => format!("{prefix} \"{cmd}\""),
            None => cmd.to_string(),
        }
    }
}
