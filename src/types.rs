// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Which of the (at most two) hosts a task runs on.
///
/// - `Primary` ("0") is the host the workflow server runs on; its output
///   directory is always required.
/// - `Secondary` ("1") is the compute host in a dual-host setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostIndex {
    Primary,
    Secondary,
}

impl HostIndex {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostIndex::Primary => "0",
            HostIndex::Secondary => "1",
        }
    }
}

impl Default for HostIndex {
    fn default() -> Self {
        HostIndex::Primary
    }
}

impl FromStr for HostIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0" => Ok(HostIndex::Primary),
            "1" => Ok(HostIndex::Secondary),
            other => Err(format!(
                "expected a single or dual-host system, got HOST={other} (expected \"0\" or \"1\")"
            )),
        }
    }
}

impl fmt::Display for HostIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three job operations. Each one owns a log file next to the job script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Submit,
    Status,
    Kill,
}

impl Operation {
    /// Suffix appended to the job file path to name this operation's log.
    pub fn log_suffix(&self) -> &'static str {
        match self {
            Operation::Submit => ".sub",
            Operation::Status => ".stat",
            Operation::Kill => ".kill",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Submit => "submit",
            Operation::Status => "status",
            Operation::Kill => "kill",
        };
        f.write_str(s)
    }
}

/// State the controller is asked to force a task into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForcedState {
    Complete,
    Aborted,
}

impl ForcedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForcedState::Complete => "complete",
            ForcedState::Aborted => "aborted",
        }
    }
}

impl fmt::Display for ForcedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend-assigned identifier of a submitted job (batch job id or pid).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build a handle from optional CLI/env input, treating `""` as absent.
    pub fn from_optional(id: Option<&str>) -> Option<Self> {
        match id.map(str::trim) {
            Some(s) if !s.is_empty() => Some(Self(s.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
