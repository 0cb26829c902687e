// src/task/identity.rs

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{JobsubError, Result};
use crate::types::{JobHandle, Operation};

/// One attempt of one workflow task.
///
/// `path` is the slash-separated node path as the workflow server knows it,
/// e.g. `/exp/Forecasting/Forecast`: the last segment is the task name and
/// the segments in between are the enclosing families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskIdentity {
    path: String,
    try_number: u32,
    credential: String,
    remote_id: u32,
    submission_handle: Option<JobHandle>,
}

impl TaskIdentity {
    /// Create a task identity.
    ///
    /// `remote_id` falls back to the current process id when absent or empty,
    /// and an empty `submission_handle` is treated as absent.
    pub fn new(
        path: impl Into<String>,
        try_number: u32,
        credential: impl Into<String>,
        remote_id: Option<&str>,
        submission_handle: Option<&str>,
    ) -> Result<Self> {
        let path = path.into();
        if task_name_of(&path).is_none() {
            return Err(JobsubError::ConfigError(format!(
                "task path '{path}' does not name a task"
            )));
        }
        if try_number == 0 {
            return Err(JobsubError::ConfigError(format!(
                "try number for '{path}' must be >= 1 (got 0)"
            )));
        }

        let remote_id = match remote_id.map(str::trim) {
            Some(s) if !s.is_empty() => s.parse::<u32>().map_err(|e| {
                JobsubError::ConfigError(format!("invalid remote id '{s}': {e}"))
            })?,
            _ => std::process::id(),
        };

        Ok(Self {
            path,
            try_number,
            credential: credential.into(),
            remote_id,
            submission_handle: JobHandle::from_optional(submission_handle),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Bare task name (last path segment).
    pub fn name(&self) -> &str {
        task_name_of(&self.path).unwrap_or_default()
    }

    /// Enclosing family chain, outermost first. Empty for top-level tasks.
    pub fn families(&self) -> Vec<&str> {
        let segments: Vec<&str> = self.path.split('/').collect();
        if segments.len() > 2 {
            segments[1..segments.len() - 1]
                .iter()
                .copied()
                .filter(|s| !s.is_empty())
                .collect()
        } else {
            Vec::new()
        }
    }

    pub fn try_number(&self) -> u32 {
        self.try_number
    }

    pub fn credential(&self) -> &str {
        &self.credential
    }

    pub fn remote_id(&self) -> u32 {
        self.remote_id
    }

    pub fn submission_handle(&self) -> Option<&JobHandle> {
        self.submission_handle.as_ref()
    }

    /// Store the handle of a successful submission. Only ever done once.
    pub fn record_submission(&mut self, handle: JobHandle) -> Result<()> {
        if self.submission_handle.is_some() {
            return Err(JobsubError::HandleAlreadySet(self.path.clone()));
        }
        self.submission_handle = Some(handle);
        Ok(())
    }

    /// `<dir>/<path>.job<try>`
    pub fn job_file(&self, dir: &Path) -> PathBuf {
        let fname = dir.join(format!("{}.job{}", self.relative_path(), self.try_number));
        debug!("job file name: {:?}", fname);
        fname
    }

    /// `<dir>/<path>.<try>`
    pub fn jobout_file(&self, dir: &Path) -> PathBuf {
        let fname = dir.join(format!("{}.{}", self.relative_path(), self.try_number));
        debug!("job output file name: {:?}", fname);
        fname
    }

    /// `<dir>/<path>.job<try>.sub|.stat|.kill`
    pub fn log_file(&self, dir: &Path, operation: Operation) -> PathBuf {
        let fname = dir.join(format!(
            "{}.job{}{}",
            self.relative_path(),
            self.try_number,
            operation.log_suffix()
        ));
        debug!(%operation, "log file name: {:?}", fname);
        fname
    }

    fn relative_path(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

fn task_name_of(path: &str) -> Option<&str> {
    path.rsplit('/').next().filter(|s| !s.is_empty())
}

/// Job file locations, both as seen locally (host 0) and on the host the
/// task runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub joboutdir: PathBuf,
    pub joboutdir_at_host: PathBuf,
    pub job: PathBuf,
    pub job_at_host: PathBuf,
    pub jobout: PathBuf,
    pub jobout_at_host: PathBuf,
}

impl JobPaths {
    pub fn new(task: &TaskIdentity, joboutdir: &Path, joboutdir_at_host: &Path) -> Self {
        Self {
            joboutdir: joboutdir.to_path_buf(),
            joboutdir_at_host: joboutdir_at_host.to_path_buf(),
            job: task.job_file(joboutdir),
            job_at_host: task.job_file(joboutdir_at_host),
            jobout: task.jobout_file(joboutdir),
            jobout_at_host: task.jobout_file(joboutdir_at_host),
        }
    }

    /// Log file of `operation`, always kept in the local output directory.
    pub fn log_file(&self, task: &TaskIdentity, operation: Operation) -> PathBuf {
        task.log_file(&self.joboutdir, operation)
    }
}
