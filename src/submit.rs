// src/submit.rs

//! Submit, status and kill for one task attempt.
//!
//! A [`Submission`] ties together the resolved settings, the backend picked
//! from them, a [`Controller`] to report to and a [`CommandRunner`] to run
//! commands with. Every failure is wrapped into the failure variant of its
//! operation and appended to that operation's log file before it is
//! returned.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, error, info};

use crate::backend::{Backend, CommandRunner, LogMode};
use crate::controller::Controller;
use crate::errors::{JobsubError, Result};
use crate::script::JobScriptWriter;
use crate::settings::ResolvedSettings;
use crate::task::TaskIdentity;
use crate::types::{ForcedState, JobHandle, Operation};

pub const OUTPUT_KEY: &str = "OUTPUT";
pub const NAME_KEY: &str = "NAME";
pub const KILL_MARKER: &str = "*** KILLED BY jobsub kill ****";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Environment file copied into every job header.
    pub env_file: Option<PathBuf>,
    /// Monitoring database; each submitted handle is appended as one line.
    pub db_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Submitted(JobHandle),
    /// A state exception applied; the controller was told the task is
    /// complete and nothing was submitted.
    ForcedComplete(String),
}

/// Raw answer of a status command. Its format depends on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub handle: JobHandle,
    pub log: PathBuf,
    pub output: String,
}

pub struct Submission<'a> {
    task: TaskIdentity,
    settings: ResolvedSettings,
    backend: Backend,
    controller: &'a dyn Controller,
    runner: &'a dyn CommandRunner,
    options: SubmitOptions,
}

impl<'a> Submission<'a> {
    /// Pick the backend from `settings.submit_type`.
    pub fn new(
        task: TaskIdentity,
        settings: ResolvedSettings,
        controller: &'a dyn Controller,
        runner: &'a dyn CommandRunner,
    ) -> Result<Self> {
        let backend = Backend::for_settings(&settings)?;
        debug!(task = %task.path(), backend = %backend.kind(), "backend selected");
        Ok(Self {
            task,
            settings,
            backend,
            controller,
            runner,
            options: SubmitOptions::default(),
        })
    }

    /// Replace the backend, e.g. one with overridden batch programs.
    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn options(mut self, options: SubmitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn task(&self) -> &TaskIdentity {
        &self.task
    }

    pub fn settings(&self) -> &ResolvedSettings {
        &self.settings
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn into_task(self) -> TaskIdentity {
        self.task
    }

    /// Submit command as it will be executed.
    pub fn submit_command(&self) -> String {
        self.settings
            .remote_wrapped(&self.backend.submit_command(&self.settings))
    }

    pub fn status_command(&self) -> Result<String> {
        let handle = self.require_handle(Operation::Status)?;
        Ok(self
            .settings
            .remote_wrapped(&self.backend.status_command(handle)))
    }

    pub fn kill_command(&self) -> Result<String> {
        let handle = self.require_handle(Operation::Kill)?;
        Ok(self.settings.remote_wrapped(&self.backend.kill_command(handle)))
    }

    /// Header as written to the job script: `OUTPUT` and `NAME` are filled in
    /// from the backend unless the policy already sets them.
    pub fn prepared_settings(&self) -> ResolvedSettings {
        let mut prepared = self.settings.clone();
        if !prepared.header.contains_key(OUTPUT_KEY) {
            prepared.header.insert(
                OUTPUT_KEY.to_string(),
                self.backend.output_directive(&self.settings),
            );
        }
        if !prepared.header.contains_key(NAME_KEY) {
            prepared.header.insert(
                NAME_KEY.to_string(),
                self.backend.name_directive(self.task.name()),
            );
        }
        prepared
    }

    /// Write the job script and submit it, or force the task complete when
    /// a state exception applies.
    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        match self.try_submit().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => Err(self.fail(Operation::Submit, err)),
        }
    }

    /// Run the status command. Never changes the stored handle.
    pub async fn status(&self) -> Result<StatusReport> {
        match self.try_status().await {
            Ok(report) => Ok(report),
            Err(err) => Err(self.fail(Operation::Status, err)),
        }
    }

    /// Kill the job and tell the controller the task is aborted.
    pub async fn kill(&self) -> Result<()> {
        match self.try_kill().await {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(Operation::Kill, err)),
        }
    }

    async fn try_submit(&mut self) -> Result<SubmitOutcome> {
        if self.task.submission_handle().is_some() {
            return Err(JobsubError::HandleAlreadySet(self.task.path().to_string()));
        }

        let mut writer = JobScriptWriter::new();
        if let Some(env_file) = &self.options.env_file {
            writer = writer.env_file(env_file);
        }
        writer.write(&self.prepared_settings())?;

        if let Some(reason) = &self.settings.force_complete {
            info!(task = %self.task.path(), %reason, "forcing task complete instead of submitting");
            self.controller
                .force_state(self.task.path(), ForcedState::Complete)
                .await?;
            return Ok(SubmitOutcome::ForcedComplete(reason.clone()));
        }

        let cmd = self.submit_command();
        self.controller.append_log(&format!("JOB_CMD: {cmd}"))?;

        let handle = match self.backend.id_parser() {
            None => {
                let pid = self
                    .runner
                    .spawn_detached(&cmd, &self.settings.paths.jobout)
                    .await?;
                JobHandle::new(pid.to_string())
            }
            Some(parser) => {
                let log = self.settings.paths.log_file(&self.task, Operation::Submit);
                let output = self.run_checked(Operation::Submit, &cmd, &log).await?;
                parser.parse_job_id(&output)?
            }
        };
        info!(task = %self.task.path(), %handle, "job submitted");

        self.task.record_submission(handle.clone())?;
        self.append_db(&handle)?;
        self.controller
            .update_handle(self.task.path(), &handle)
            .await?;
        Ok(SubmitOutcome::Submitted(handle))
    }

    async fn try_status(&self) -> Result<StatusReport> {
        let handle = self.require_handle(Operation::Status)?.clone();
        let cmd = self.status_command()?;
        let log = self.settings.paths.log_file(&self.task, Operation::Status);

        let output = self.run_checked(Operation::Status, &cmd, &log).await?;
        info!(task = %self.task.path(), %handle, "status queried");
        Ok(StatusReport {
            handle,
            log,
            output,
        })
    }

    async fn try_kill(&self) -> Result<()> {
        let handle = self.require_handle(Operation::Kill)?;
        let cmd = self.kill_command()?;
        let log = self.settings.paths.log_file(&self.task, Operation::Kill);

        write_new(
            &log,
            &format!(
                "Kill job {} with command:\n{cmd}\n",
                self.settings.paths.job_at_host.display()
            ),
        )?;
        let code = self.runner.run_logged(&cmd, &log, LogMode::Append).await?;
        if code != 0 {
            return Err(JobsubError::CommandFailed {
                operation: Operation::Kill,
                code,
            });
        }

        append_to(
            &self.settings.paths.jobout,
            &format!("\n\n{KILL_MARKER}\n"),
        )?;
        info!(task = %self.task.path(), %handle, "job killed");
        self.controller
            .force_state(self.task.path(), ForcedState::Aborted)
            .await?;
        Ok(())
    }

    /// Run `cmd` with its output in `log`; fail on a non-zero exit code and
    /// return the captured output otherwise.
    async fn run_checked(&self, operation: Operation, cmd: &str, log: &Path) -> Result<String> {
        let code = self.runner.run_logged(cmd, log, LogMode::Truncate).await?;
        if code != 0 {
            return Err(JobsubError::CommandFailed { operation, code });
        }
        let output =
            fs::read_to_string(log).with_context(|| format!("reading {operation} log {log:?}"))?;
        Ok(output)
    }

    fn require_handle(&self, operation: Operation) -> Result<&JobHandle> {
        self.task
            .submission_handle()
            .ok_or(JobsubError::MissingJobHandle(operation))
    }

    fn append_db(&self, handle: &JobHandle) -> Result<()> {
        if let Some(db) = &self.options.db_file {
            append_to(db, &format!("{handle}\n"))?;
        }
        Ok(())
    }

    /// Wrap `source`, record it in the operation's log and hand it back.
    fn fail(&self, operation: Operation, source: JobsubError) -> JobsubError {
        let err = JobsubError::failure(operation, &self.task, &self.settings, source);
        error!(task = %self.task.path(), %operation, error = %err, "operation failed");

        let log = self.settings.paths.log_file(&self.task, operation);
        if let Err(io_err) = append_to(&log, &format!("{err}\n")) {
            error!(log = ?log, error = %io_err, "could not record failure in log");
        }
        err
    }
}

fn write_new(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)?;
    Ok(())
}

fn append_to(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}
