// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::settings::ResolvedSettings;
use crate::task::TaskIdentity;
use crate::types::{HostIndex, Operation};

#[derive(Error, Debug)]
pub enum JobsubError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Configuration error: HOST is mandatory in the submission settings")]
    MissingHost,

    #[error("Configuration error: {0}")]
    InvalidHost(String),

    #[error("Configuration error: no job output directory defined for HOST {0}")]
    MissingJobOutDir(HostIndex),

    #[error("Configuration error: submit type '{0}' is not implemented")]
    UnknownSubmitType(String),

    #[error("Expected {expected} tokens in submit output, got {actual}: {line:?}")]
    JobIdParse {
        expected: usize,
        actual: usize,
        line: String,
    },

    #[error("{operation} command failed with exit code {code}")]
    CommandFailed { operation: Operation, code: i32 },

    #[error("No job ID was provided for {0}")]
    MissingJobHandle(Operation),

    #[error("Job handle for task '{0}' is already set")]
    HandleAlreadySet(String),

    #[error("Submission failed for {}: {source}", task.path())]
    SubmitFailed {
        task: Box<TaskIdentity>,
        settings: Box<ResolvedSettings>,
        source: Box<JobsubError>,
    },

    #[error("Status failed for {}: {source}", task.path())]
    StatusFailed {
        task: Box<TaskIdentity>,
        settings: Box<ResolvedSettings>,
        source: Box<JobsubError>,
    },

    #[error("Kill failed for {}: {source}", task.path())]
    KillFailed {
        task: Box<TaskIdentity>,
        settings: Box<ResolvedSettings>,
        source: Box<JobsubError>,
    },

    #[error("Controller error: {0}")]
    Controller(String),

    #[error("Controller did not answer within {0:?}")]
    ControllerTimeout(Duration),

    #[error("A lifecycle session is already active in this process")]
    SessionActive,

    #[error("Aborted by signal {0}")]
    Signalled(i32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobsubError {
    /// Wrap `source` into the failure variant belonging to `operation`.
    pub fn failure(
        operation: Operation,
        task: &TaskIdentity,
        settings: &ResolvedSettings,
        source: JobsubError,
    ) -> Self {
        let task = Box::new(task.clone());
        let settings = Box::new(settings.clone());
        let source = Box::new(source);
        match operation {
            Operation::Submit => JobsubError::SubmitFailed {
                task,
                settings,
                source,
            },
            Operation::Status => JobsubError::StatusFailed {
                task,
                settings,
                source,
            },
            Operation::Kill => JobsubError::KillFailed {
                task,
                settings,
                source,
            },
        }
    }

    /// The operation a wrapper failure belongs to, if this is one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            JobsubError::SubmitFailed { .. } => Some(Operation::Submit),
            JobsubError::StatusFailed { .. } => Some(Operation::Status),
            JobsubError::KillFailed { .. } => Some(Operation::Kill),
            _ => None,
        }
    }

    /// The innermost error, looking through wrapper failures.
    pub fn root_cause(&self) -> &JobsubError {
        match self {
            JobsubError::SubmitFailed { source, .. }
            | JobsubError::StatusFailed { source, .. }
            | JobsubError::KillFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for the errors that come from a malformed policy or environment.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self.root_cause(),
            JobsubError::ConfigError(_)
                | JobsubError::MissingHost
                | JobsubError::InvalidHost(_)
                | JobsubError::MissingJobOutDir(_)
                | JobsubError::UnknownSubmitType(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobsubError>;
