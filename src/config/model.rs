// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::types::HostIndex;

/// Submission policy as read from disk, before validation.
///
/// This is a direct mapping of the policy documents in use:
///
/// ```json
/// {
///   "submit_types": ["background", "scalar"],
///   "default_submit_type": "scalar",
///   "background": { "HOST": "0", "tasks": ["InitRun", "LogProgress"] },
///   "scalar": { "HOST": "1", "SUBMIT_TYPE": "slurm", "WRAPPER": "srun" },
///   "task_exceptions": { "Forecast": { "WRAPPER": "mpirun -np 4" } },
///   "submit_exceptions": { "complete": { "task": { "Forecast": "is_coldstart" } } }
/// }
/// ```
///
/// Every top-level key that is not one of the named fields is a submit type.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSubmissionPolicy {
    /// Submit types in the order they are scanned for task membership.
    pub submit_types: Vec<String>,

    /// Submit type used for tasks that are not a member of any type.
    pub default_submit_type: String,

    /// Per-task setting overrides, keyed by bare task name.
    #[serde(default)]
    pub task_exceptions: IndexMap<String, IndexMap<String, SettingValue>>,

    /// Per-state override rules, keyed by state name (e.g. `"complete"`).
    #[serde(default, alias = "state_exceptions")]
    pub submit_exceptions: IndexMap<String, StateExceptionRules>,

    /// All submit type definitions.
    #[serde(flatten)]
    pub types: IndexMap<String, SubmitTypeDef>,
}

/// One named submit type (`"background"`, `"scalar"`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitTypeDef {
    /// Tasks that use this submit type regardless of the default.
    #[serde(default)]
    pub tasks: Vec<String>,

    /// Directives and pass-through header settings, in declaration order.
    #[serde(flatten)]
    pub settings: IndexMap<String, SettingValue>,
}

/// A single setting value.
///
/// Most settings are strings, but documents in the wild also carry numbers
/// (`"HOST": 1`) and tables (`SUBMIT_VARIABLES`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Table(IndexMap<String, SettingValue>),
}

impl SettingValue {
    /// Render a scalar value as text. Tables have no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            SettingValue::Text(s) => Some(s.clone()),
            SettingValue::Integer(i) => Some(i.to_string()),
            SettingValue::Float(f) => Some(f.to_string()),
            SettingValue::Bool(b) => Some(b.to_string()),
            SettingValue::Table(_) => None,
        }
    }

    pub fn as_table(&self) -> Option<&IndexMap<String, SettingValue>> {
        match self {
            SettingValue::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl From<&str> for SettingValue {
    fn from(s: &str) -> Self {
        SettingValue::Text(s.to_string())
    }
}

/// Override rules for one state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateExceptionRules {
    #[serde(default)]
    pub task: IndexMap<String, ExceptionPredicate>,

    #[serde(default)]
    pub family: IndexMap<String, ExceptionPredicate>,
}

/// Condition attached to a state exception.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ExceptionPredicate {
    /// Applies when the run is a cold start.
    IsColdstart,
    /// Anything else; never matches.
    Unknown(String),
}

impl From<String> for ExceptionPredicate {
    fn from(s: String) -> Self {
        match s.as_str() {
            "is_coldstart" | "is-coldstart" => ExceptionPredicate::IsColdstart,
            _ => ExceptionPredicate::Unknown(s),
        }
    }
}

/// Validated submission policy.
///
/// Only constructed through `TryFrom<RawSubmissionPolicy>` (see
/// [`crate::config::validate`]), so the rest of the crate can rely on its
/// invariants.
#[derive(Debug, Clone)]
pub struct SubmissionPolicy {
    submit_types: Vec<String>,
    default_submit_type: String,
    types: IndexMap<String, SubmitTypeDef>,
    task_exceptions: IndexMap<String, IndexMap<String, SettingValue>>,
    state_exceptions: IndexMap<String, StateExceptionRules>,
}

impl SubmissionPolicy {
    pub(crate) fn new_unchecked(raw: RawSubmissionPolicy) -> Self {
        Self {
            submit_types: raw.submit_types,
            default_submit_type: raw.default_submit_type,
            types: raw.types,
            task_exceptions: raw.task_exceptions,
            state_exceptions: raw.submit_exceptions,
        }
    }

    pub fn submit_types(&self) -> &[String] {
        &self.submit_types
    }

    pub fn default_submit_type(&self) -> &str {
        &self.default_submit_type
    }

    pub fn submit_type(&self, name: &str) -> Option<&SubmitTypeDef> {
        self.types.get(name)
    }

    pub fn task_exception(&self, task_name: &str) -> Option<&IndexMap<String, SettingValue>> {
        self.task_exceptions.get(task_name)
    }

    pub fn state_exceptions(&self) -> &IndexMap<String, StateExceptionRules> {
        &self.state_exceptions
    }
}

/// Job output directories per host. Host "0" is always required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutDirs(BTreeMap<HostIndex, PathBuf>);

impl JobOutDirs {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Single-host setup: everything lives under `dir`.
    pub fn single(dir: impl Into<PathBuf>) -> Self {
        Self::new().with(HostIndex::Primary, dir)
    }

    pub fn with(mut self, host: HostIndex, dir: impl Into<PathBuf>) -> Self {
        self.0.insert(host, dir.into());
        self
    }

    pub fn get(&self, host: HostIndex) -> Option<&Path> {
        self.0.get(&host).map(PathBuf::as_path)
    }
}

/// Connection settings for the workflow server.
///
/// ```json
/// { "ECF_HOST": "localhost", "ECF_PORT": 1000, "ECF_PORT_OFFSET": 1500 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(rename = "ECF_HOST")]
    pub host: String,

    /// Base port; defaults to the user's uid.
    #[serde(rename = "ECF_PORT", default)]
    pub port: Option<SettingValue>,

    /// Added to the base port; defaults to 1500.
    #[serde(rename = "ECF_PORT_OFFSET", default)]
    pub port_offset: Option<SettingValue>,
}

pub const DEFAULT_PORT_OFFSET: u32 = 1500;
