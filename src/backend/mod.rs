// src/backend/mod.rs

//! Submission backends.
//!
//! A [`Backend`] is picked once from the resolved `SUBMIT_TYPE` and turns
//! settings into shell commands:
//!
//! - [`Background`]: detached child process, handle is the pid.
//! - [`BatchSpec`]: PBS, Slurm or Grid Engine, handle parsed from the
//!   submit answer.
//!
//! Executing those commands is the job of a [`CommandRunner`].

pub mod background;
pub mod batch;
pub mod job_id;
pub mod runner;

use std::fmt;

use crate::errors::{JobsubError, Result};
use crate::settings::ResolvedSettings;
use crate::types::JobHandle;

pub use background::Background;
pub use batch::BatchSpec;
pub use job_id::{JobIdParser, TokenPick, TokenRule, last_non_empty_line};
pub use runner::{CommandRunner, LogMode, RunnerFuture, ShellRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Background,
    Pbs,
    Slurm,
    GridEngine,
}

impl BackendKind {
    /// Batch names match case-insensitively; `background` must match exactly.
    pub fn from_submit_type(submit_type: &str) -> Result<Self> {
        if submit_type == "background" {
            return Ok(BackendKind::Background);
        }
        match submit_type.to_lowercase().as_str() {
            "pbs" => Ok(BackendKind::Pbs),
            "slurm" => Ok(BackendKind::Slurm),
            "grid_engine" => Ok(BackendKind::GridEngine),
            _ => Err(JobsubError::UnknownSubmitType(submit_type.to_string())),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Background => "background",
            BackendKind::Pbs => "pbs",
            BackendKind::Slurm => "slurm",
            BackendKind::GridEngine => "grid_engine",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Background(Background),
    Batch(BatchSpec),
}

impl Backend {
    pub fn for_kind(kind: BackendKind) -> Self {
        match kind {
            BackendKind::Background => Backend::Background(Background),
            BackendKind::Pbs => Backend::Batch(BatchSpec::pbs()),
            BackendKind::Slurm => Backend::Batch(BatchSpec::slurm()),
            BackendKind::GridEngine => Backend::Batch(BatchSpec::grid_engine()),
        }
    }

    pub fn for_settings(settings: &ResolvedSettings) -> Result<Self> {
        BackendKind::from_submit_type(&settings.submit_type).map(Self::for_kind)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Background(_) => BackendKind::Background,
            Backend::Batch(spec) => spec.kind,
        }
    }

    /// Background jobs are spawned and not waited for.
    pub fn is_detached(&self) -> bool {
        matches!(self, Backend::Background(_))
    }

    /// Submit command before remote wrapping.
    pub fn submit_command(&self, settings: &ResolvedSettings) -> String {
        match self {
            Backend::Background(b) => b.submit_command(settings),
            Backend::Batch(spec) => spec.submit_command(settings),
        }
    }

    pub fn status_command(&self, handle: &JobHandle) -> String {
        match self {
            Backend::Background(b) => b.status_command(handle),
            Backend::Batch(spec) => spec.status_command(handle),
        }
    }

    pub fn kill_command(&self, handle: &JobHandle) -> String {
        match self {
            Backend::Background(b) => b.kill_command(handle),
            Backend::Batch(spec) => spec.kill_command(handle),
        }
    }

    /// Value of the `OUTPUT` header entry.
    pub fn output_directive(&self, settings: &ResolvedSettings) -> String {
        match self {
            Backend::Background(_) => background::OUTPUT_DIRECTIVE.to_string(),
            Backend::Batch(spec) => spec.output_directive(settings),
        }
    }

    /// Value of the `NAME` header entry.
    pub fn name_directive(&self, task_name: &str) -> String {
        match self {
            Backend::Background(_) => background::NAME_DIRECTIVE.to_string(),
            Backend::Batch(spec) => spec.name_directive(task_name),
        }
    }

    /// Parser for the submit answer. Background jobs have none.
    pub fn id_parser(&self) -> Option<&dyn JobIdParser> {
        match self {
            Backend::Background(_) => None,
            Backend::Batch(spec) => Some(spec as &dyn JobIdParser),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use indexmap::IndexMap;

    use super::*;
    use crate::task::{JobPaths, TaskIdentity};
    use crate::types::HostIndex;

    fn settings(submit_type: &str, vars: &[(&str, &str)]) -> ResolvedSettings {
        let task = TaskIdentity::new("/exp/Forecasting/Forecast", 1, "pw", Some("1"), None)
            .unwrap();
        ResolvedSettings {
            policy_type: "scalar".to_string(),
            submit_type: submit_type.to_string(),
            host: HostIndex::Secondary,
            header: IndexMap::new(),
            trailer: IndexMap::new(),
            wrapper: None,
            interpreter: "#!/bin/sh".to_string(),
            submit_variables: if vars.is_empty() {
                None
            } else {
                Some(
                    vars.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                )
            },
            remote_command: None,
            force_complete: None,
            paths: JobPaths::new(&task, Path::new("/local"), Path::new("/remote")),
        }
    }

    #[test]
    fn selects_kind_from_submit_type() {
        assert_eq!(
            BackendKind::from_submit_type("background").unwrap(),
            BackendKind::Background
        );
        assert_eq!(BackendKind::from_submit_type("SLURM").unwrap(), BackendKind::Slurm);
        assert_eq!(BackendKind::from_submit_type("Pbs").unwrap(), BackendKind::Pbs);
        assert_eq!(
            BackendKind::from_submit_type("grid_engine").unwrap(),
            BackendKind::GridEngine
        );
        assert!(matches!(
            BackendKind::from_submit_type("Background"),
            Err(JobsubError::UnknownSubmitType(_))
        ));
        assert!(BackendKind::from_submit_type("lsf").is_err());
    }

    #[test]
    fn batch_submit_exports_variables_in_order() {
        let s = settings("slurm", &[("A", "1"), ("B", "two")]);
        let backend = Backend::for_settings(&s).unwrap();
        assert_eq!(
            backend.submit_command(&s),
            "sbatch --export A=1 --export B=two /remote/exp/Forecasting/Forecast.job1"
        );

        let s = settings("pbs", &[("A", "1")]);
        let backend = Backend::for_settings(&s).unwrap();
        assert_eq!(
            backend.submit_command(&s),
            "qsub -v A=1 /remote/exp/Forecasting/Forecast.job1"
        );
    }

    #[test]
    fn background_submit_runs_the_local_script() {
        let s = settings("background", &[("A", "1"), ("B", "2")]);
        let backend = Backend::for_settings(&s).unwrap();
        assert!(backend.is_detached());
        assert!(backend.id_parser().is_none());
        assert_eq!(
            backend.submit_command(&s),
            "export A=1; export B=2; /local/exp/Forecasting/Forecast.job1"
        );
    }

    #[test]
    fn output_directives_point_at_the_host_output() {
        let s = settings("pbs", &[]);
        assert_eq!(
            Backend::for_settings(&s).unwrap().output_directive(&s),
            "#PBS -o /remote/exp/Forecasting/Forecast.1\n\
             #PBS -e /remote/exp/Forecasting/Forecast.1\n\
             #PBS -j oe"
        );
        let s = settings("grid_engine", &[]);
        assert_eq!(
            Backend::for_settings(&s).unwrap().output_directive(&s),
            "#$ -o /remote/exp/Forecasting/Forecast.1\n#$ -e /remote/exp/Forecasting/Forecast.1"
        );
        let s = settings("background", &[]);
        assert_eq!(
            Backend::for_settings(&s).unwrap().output_directive(&s),
            background::OUTPUT_DIRECTIVE
        );
    }

    #[test]
    fn remote_prefix_wraps_once() {
        let mut s = settings("slurm", &[]);
        s.remote_command = Some("ssh user@hpc".to_string());
        let backend = Backend::for_settings(&s).unwrap();
        let cmd = s.remote_wrapped(&backend.kill_command(&JobHandle::new("9")));
        assert_eq!(cmd, "ssh user@hpc \"scancel 9\"");
    }
}
